//! Text rendering for subtitle overlays

use std::path::{Path, PathBuf};

use fontdue::{Font, FontSettings};
use image::{Rgb, RgbImage};

use crate::error::{ConvertError, Result};

/// Font metrics and glyph drawing used by the overlay
pub trait TextRenderer {
    /// Distance between consecutive baselines in pixels
    fn line_height(&self) -> f32;

    /// Advance width of `text` rendered on one line
    fn string_width(&self, text: &str) -> f32;

    /// Draw `text` with its baseline at `baseline`, starting at `x`.
    /// Pixels outside the image are dropped.
    fn draw(&self, image: &mut RgbImage, text: &str, x: i32, baseline: i32, color: Rgb<u8>);
}

/// fontdue-backed renderer at a fixed pixel size
pub struct FontRenderer {
    font: Font,
    size: f32,
}

impl FontRenderer {
    /// Load a TrueType/OpenType font from disk
    pub fn load<P: AsRef<Path>>(path: P, size: f32) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| ConvertError::Font(format!("Failed to read {:?}: {}", path, e)))?;
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| ConvertError::Font(format!("Failed to parse {:?}: {}", path, e)))?;

        tracing::debug!("Loaded overlay font {:?} at {}px", path, size);
        Ok(Self { font, size })
    }

    /// Load the first readable font: `explicit` if given, else the first
    /// candidate that exists on disk.
    pub fn discover(explicit: Option<&Path>, candidates: &[PathBuf], size: f32) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path, size);
        }

        for candidate in candidates.iter().filter(|p| p.is_file()) {
            match Self::load(candidate, size) {
                Ok(renderer) => return Ok(renderer),
                Err(e) => tracing::warn!("Skipping font candidate: {}", e),
            }
        }

        Err(ConvertError::Font(format!(
            "No usable overlay font among {} candidates; set overlay.font_path",
            candidates.len()
        )))
    }
}

impl TextRenderer for FontRenderer {
    fn line_height(&self) -> f32 {
        self.font
            .horizontal_line_metrics(self.size)
            .map(|m| m.new_line_size)
            .unwrap_or(self.size * 1.2)
    }

    fn string_width(&self, text: &str) -> f32 {
        text.chars()
            .map(|c| self.font.metrics(c, self.size).advance_width)
            .sum()
    }

    fn draw(&self, image: &mut RgbImage, text: &str, x: i32, baseline: i32, color: Rgb<u8>) {
        let mut pen_x = x as f32;

        for c in text.chars() {
            let (metrics, coverage) = self.font.rasterize(c, self.size);
            let left = pen_x.round() as i32 + metrics.xmin;
            let top = baseline - metrics.height as i32 - metrics.ymin;

            for row in 0..metrics.height {
                for col in 0..metrics.width {
                    let alpha = coverage[row * metrics.width + col];
                    if alpha > 0 {
                        blend(image, left + col as i32, top + row as i32, color, alpha);
                    }
                }
            }

            pen_x += metrics.advance_width;
        }
    }
}

/// Alpha-blend `color` over the pixel at (x, y), ignoring out-of-bounds
pub fn blend(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>, alpha: u8) {
    if x < 0 || y < 0 || x as u32 >= image.width() || y as u32 >= image.height() {
        return;
    }
    let a = alpha as u16;
    let pixel = image.get_pixel_mut(x as u32, y as u32);
    for (dst, src) in pixel.0.iter_mut().zip(color.0) {
        *dst = ((src as u16 * a + *dst as u16 * (255 - a)) / 255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    #[test]
    fn test_blend_full_and_partial() {
        let mut image = RgbImage::new(2, 1);
        blend(&mut image, 0, 0, WHITE, 255);
        blend(&mut image, 1, 0, WHITE, 51);
        assert_eq!(image.get_pixel(0, 0), &WHITE);
        assert_eq!(image.get_pixel(1, 0), &Rgb([51, 51, 51]));
    }

    #[test]
    fn test_blend_out_of_bounds() {
        let mut image = RgbImage::new(1, 1);
        blend(&mut image, -1, 0, WHITE, 255);
        blend(&mut image, 0, 5, WHITE, 255);
        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_discover_reports_missing_fonts() {
        let candidates = vec![PathBuf::from("/nonexistent/font.ttf")];
        let err = FontRenderer::discover(None, &candidates, 40.0).err().unwrap();
        assert!(matches!(err, ConvertError::Font(_)));
    }

    #[test]
    fn test_load_rejects_non_font() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a font").unwrap();
        assert!(matches!(
            FontRenderer::load(file.path(), 40.0),
            Err(ConvertError::Font(_))
        ));
    }

    #[test]
    fn test_system_font_metrics() {
        // Skip when the host has none of the default fonts installed
        let candidates = crate::config::OverlayConfig::default().font_candidates;
        let Ok(renderer) = FontRenderer::discover(None, &candidates, 40.0) else {
            return;
        };

        assert!(renderer.line_height() > 0.0);
        assert!(renderer.string_width("Hello") > renderer.string_width("Hi"));
        assert_eq!(renderer.string_width(""), 0.0);

        let mut image = RgbImage::new(200, 80);
        renderer.draw(&mut image, "Hi", 10, 60, WHITE);
        assert!(image.pixels().any(|p| p.0[0] > 0));
    }
}
