//! Page-based document output
//!
//! Pages are sized exactly to the pixel dimensions of their image, one
//! image per page drawn at the origin at 1:1 scale.

use std::path::Path;

use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::{ConvertError, Result};

/// Handle to a page created by a [`DocumentWriter`]
pub type PageId = usize;

/// Document sink consumed by the page assembler
pub trait DocumentWriter {
    /// Append a new empty page of `width` x `height` units
    fn add_page(&mut self, width: u32, height: u32) -> Result<PageId>;

    /// Place `image` on `page` at (0, 0), 1:1 scale
    fn place_image(&mut self, page: PageId, image: &RgbImage) -> Result<()>;

    fn page_count(&self) -> usize;

    /// Flush the finished document to `path`
    fn save(&mut self, path: &Path) -> Result<()>;
}

struct PendingPage {
    id: ObjectId,
    width: u32,
    height: u32,
    placed: bool,
}

/// PDF writer backed by lopdf
pub struct PdfDocument {
    doc: Document,
    pages_id: ObjectId,
    pages: Vec<PendingPage>,
    compress: bool,
}

impl PdfDocument {
    pub fn new(compress: bool) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            pages: Vec::new(),
            compress,
        }
    }

    fn page_dictionary(
        &self,
        page: &PendingPage,
        resources: Option<ObjectId>,
        contents: Option<ObjectId>,
    ) -> lopdf::Dictionary {
        let mut dict = dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(page.width as i64),
                Object::Integer(page.height as i64),
            ],
        };
        if let Some(resources) = resources {
            dict.set("Resources", resources);
        }
        if let Some(contents) = contents {
            dict.set("Contents", contents);
        }
        dict
    }

    fn finish(&mut self) {
        // Pages that never received an image still need a page object
        let blank: Vec<(ObjectId, lopdf::Dictionary)> = self
            .pages
            .iter()
            .filter(|p| !p.placed)
            .map(|p| (p.id, self.page_dictionary(p, None, None)))
            .collect();
        for (id, dict) in blank {
            self.doc.objects.insert(id, Object::Dictionary(dict));
        }

        let kids: Vec<Object> = self.pages.iter().map(|p| Object::Reference(p.id)).collect();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => self.pages.len() as i64,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let created = chrono::Local::now().format("D:%Y%m%d%H%M%S").to_string();
        let info_id = self.doc.add_object(dictionary! {
            "Producer" => Object::string_literal(concat!("video-pages ", env!("CARGO_PKG_VERSION"))),
            "CreationDate" => Object::string_literal(created),
        });
        self.doc.trailer.set("Info", info_id);

        if self.compress {
            self.doc.compress();
        }
    }
}

impl DocumentWriter for PdfDocument {
    fn add_page(&mut self, width: u32, height: u32) -> Result<PageId> {
        if width == 0 || height == 0 {
            return Err(ConvertError::Write(format!(
                "Cannot create a {}x{} page",
                width, height
            )));
        }
        let id = self.doc.new_object_id();
        self.pages.push(PendingPage {
            id,
            width,
            height,
            placed: false,
        });
        Ok(self.pages.len() - 1)
    }

    fn place_image(&mut self, page: PageId, image: &RgbImage) -> Result<()> {
        let pending = self
            .pages
            .get(page)
            .ok_or_else(|| ConvertError::Write(format!("No such page: {}", page)))?;
        if pending.placed {
            return Err(ConvertError::Write(format!("Page {} already has an image", page)));
        }

        let (width, height) = image.dimensions();
        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
            },
            image.as_raw().clone(),
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Integer(width as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(height as i64),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| ConvertError::Write(format!("Failed to encode page content: {}", e)))?;
        let contents_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));
        let resources_id = self.doc.add_object(dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        });

        let dict = self.page_dictionary(pending, Some(resources_id), Some(contents_id));
        let page_id = pending.id;
        self.doc.objects.insert(page_id, Object::Dictionary(dict));
        self.pages[page].placed = true;
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        self.finish();
        self.doc
            .save(path)
            .map_err(|e| ConvertError::Write(format!("Failed to save {:?}: {}", path, e)))?;
        tracing::debug!(pages = self.pages.len(), "Saved document {:?}", path);
        Ok(())
    }
}
