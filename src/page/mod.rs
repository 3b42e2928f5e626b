//! Page assembly
//!
//! Turns a selected frame into one finished document page:
//! - rotation correction from the stream's rotation metadata
//! - bottom-centred white subtitle overlay
//! - one page per image, sized to the image

pub mod pdf;
pub mod text;

use image::{imageops, Rgb, RgbImage};

use crate::error::{ConvertError, Result};

use self::pdf::DocumentWriter;
use self::text::TextRenderer;

/// Overlay text colour
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Clockwise rotation reported by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    /// No metadata, unparsable metadata, or an explicit 0
    #[default]
    None,
    /// Normalised to 1..=359 degrees
    Degrees(u16),
}

impl Rotation {
    /// Interpret a `rotate` metadata tag.
    ///
    /// Absent, blank or unparsable values are treated as no rotation; an
    /// unparsable value is logged.
    pub fn from_metadata(value: Option<&str>) -> Self {
        let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Rotation::None;
        };

        match raw.parse::<i64>() {
            Ok(degrees) => Self::from_degrees(degrees),
            Err(e) => {
                tracing::warn!("Ignoring unparsable rotate metadata {:?}: {}", raw, e);
                Rotation::None
            }
        }
    }

    /// Interpret a 3x3 display matrix (16.16 fixed point, row major) as a
    /// clockwise rotation rounded to whole degrees.
    ///
    /// A degenerate matrix carries no usable angle and means no rotation.
    pub fn from_display_matrix(matrix: &[i32; 9]) -> Self {
        let scale_x = f64::from(matrix[0]).hypot(f64::from(matrix[3]));
        let scale_y = f64::from(matrix[1]).hypot(f64::from(matrix[4]));
        if scale_x == 0.0 || scale_y == 0.0 {
            tracing::warn!("Ignoring degenerate display matrix {:?}", matrix);
            return Rotation::None;
        }

        let clockwise = (f64::from(matrix[1]) / scale_y)
            .atan2(f64::from(matrix[0]) / scale_x)
            .to_degrees();
        Self::from_degrees(clockwise.round() as i64)
    }

    pub fn from_degrees(degrees: i64) -> Self {
        match degrees.rem_euclid(360) {
            0 => Rotation::None,
            d => Rotation::Degrees(d as u16),
        }
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Degrees(d) => *d,
        }
    }
}

/// Rotate `image` clockwise.
///
/// Right angles are exact; any other angle is resampled nearest-neighbour
/// onto the bounding canvas of the rotated frame with black fill.
pub fn rotate(image: RgbImage, rotation: Rotation) -> RgbImage {
    match rotation.degrees() {
        0 => image,
        90 => imageops::rotate90(&image),
        180 => imageops::rotate180(&image),
        270 => imageops::rotate270(&image),
        d => rotate_arbitrary(&image, d as f64),
    }
}

fn rotate_arbitrary(image: &RgbImage, degrees: f64) -> RgbImage {
    let (w, h) = (image.width() as f64, image.height() as f64);
    let (sin, cos) = degrees.to_radians().sin_cos();

    let out_w = (w * cos.abs() + h * sin.abs()).round().max(1.0) as u32;
    let out_h = (w * sin.abs() + h * cos.abs()).round().max(1.0) as u32;
    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ox, oy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);

    RgbImage::from_fn(out_w, out_h, |x, y| {
        let dx = x as f64 + 0.5 - ox;
        let dy = y as f64 + 0.5 - oy;
        // inverse of a clockwise turn in y-down coordinates
        let sx = cos * dx + sin * dy + cx;
        let sy = -sin * dx + cos * dy + cy;
        if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
            *image.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// Burn `text` into the bottom of `image`.
///
/// The line is horizontally centred with its baseline one line height
/// above the bottom edge. Line breaks are collapsed to spaces; text wider
/// than the frame is clipped.
pub fn overlay(image: &mut RgbImage, text: &str, renderer: &dyn TextRenderer) {
    let line = text
        .split(['\r', '\n'])
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if line.is_empty() {
        return;
    }

    let width = renderer.string_width(&line).round() as i32;
    let x = (image.width() as i32 - width) / 2;
    let baseline = image.height() as i32 - renderer.line_height().round() as i32;
    renderer.draw(image, &line, x, baseline, OVERLAY_COLOR);
}

/// Append `image` to `document` as its own page
pub fn add_page<D: DocumentWriter + ?Sized>(document: &mut D, image: &RgbImage) -> Result<()> {
    let page = document.add_page(image.width(), image.height())?;
    document.place_image(page, image)
}

/// Emits pages for one conversion: rotation, optional overlay, page
pub struct PageAssembler<'a, D: DocumentWriter> {
    document: &'a mut D,
    renderer: Option<&'a dyn TextRenderer>,
    rotation: Rotation,
}

impl<'a, D: DocumentWriter> PageAssembler<'a, D> {
    pub fn new(
        document: &'a mut D,
        renderer: Option<&'a dyn TextRenderer>,
        rotation: Rotation,
    ) -> Self {
        if rotation != Rotation::None {
            tracing::debug!(degrees = rotation.degrees(), "Frames will be rotation corrected");
        }
        Self {
            document,
            renderer,
            rotation,
        }
    }

    /// Rotate, overlay `text` if any, and append as a new page
    pub fn emit(&mut self, image: RgbImage, text: Option<&str>) -> Result<()> {
        let mut image = rotate(image, self.rotation);

        if let Some(text) = text {
            let renderer = self.renderer.ok_or_else(|| {
                ConvertError::Font("no overlay font loaded for a subtitle page".to_string())
            })?;
            overlay(&mut image, text, renderer);
        }

        add_page(&mut *self.document, &image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::{BoxRenderer, RecordingDocument};

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, (x * y) as u8]))
    }

    #[test]
    fn test_rotation_from_metadata() {
        assert_eq!(Rotation::from_metadata(None), Rotation::None);
        assert_eq!(Rotation::from_metadata(Some("")), Rotation::None);
        assert_eq!(Rotation::from_metadata(Some("0")), Rotation::None);
        assert_eq!(Rotation::from_metadata(Some("90")), Rotation::Degrees(90));
        assert_eq!(Rotation::from_metadata(Some(" 270 ")), Rotation::Degrees(270));
        assert_eq!(Rotation::from_metadata(Some("-90")), Rotation::Degrees(270));
        assert_eq!(Rotation::from_metadata(Some("450")), Rotation::Degrees(90));
        assert_eq!(Rotation::from_metadata(Some("sideways")), Rotation::None);
    }

    /// Matrix for a counter-clockwise turn, laid out the way muxers store it
    fn display_matrix(counter_clockwise: f64) -> [i32; 9] {
        let (sin, cos) = counter_clockwise.to_radians().sin_cos();
        let fixed = |v: f64| (v * 65536.0).round() as i32;
        [fixed(cos), fixed(-sin), 0, fixed(sin), fixed(cos), 0, 0, 0, 1 << 30]
    }

    #[test]
    fn test_rotation_from_display_matrix() {
        assert_eq!(Rotation::from_display_matrix(&display_matrix(0.0)), Rotation::None);
        assert_eq!(
            Rotation::from_display_matrix(&display_matrix(-90.0)),
            Rotation::Degrees(90)
        );
        assert_eq!(
            Rotation::from_display_matrix(&display_matrix(90.0)),
            Rotation::Degrees(270)
        );
        assert_eq!(
            Rotation::from_display_matrix(&display_matrix(180.0)),
            Rotation::Degrees(180)
        );
        assert_eq!(Rotation::from_display_matrix(&[0; 9]), Rotation::None);
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        let image = gradient(7, 5);
        assert_eq!(rotate(image.clone(), Rotation::None), image);
    }

    #[test]
    fn test_rotate_quarter_turn_clockwise() {
        let image = gradient(4, 2);
        let rotated = rotate(image.clone(), Rotation::Degrees(90));
        assert_eq!(rotated.dimensions(), (2, 4));
        // Bottom-left of the source becomes top-left
        assert_eq!(rotated.get_pixel(0, 0), image.get_pixel(0, 1));
        assert_eq!(rotated.get_pixel(1, 0), image.get_pixel(0, 0));
    }

    #[test]
    fn test_rotate_half_turn() {
        let image = gradient(3, 2);
        let rotated = rotate(image.clone(), Rotation::Degrees(180));
        assert_eq!(rotated.get_pixel(0, 0), image.get_pixel(2, 1));
    }

    #[test]
    fn test_rotate_arbitrary_grows_canvas() {
        let image = RgbImage::from_pixel(10, 10, Rgb([200, 0, 0]));
        let rotated = rotate(image, Rotation::Degrees(45));
        assert_eq!(rotated.dimensions(), (14, 14));
        // Centre stays inside the source, corners fall outside it
        assert_eq!(rotated.get_pixel(7, 7), &Rgb([200, 0, 0]));
        assert_eq!(rotated.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_overlay_bottom_centre() {
        let renderer = BoxRenderer::default();
        let mut image = RgbImage::new(100, 50);
        overlay(&mut image, "abcd", &renderer);

        let draws = renderer.draws();
        assert_eq!(draws.len(), 1);
        // width 4 * 6 = 24, line height 10
        assert_eq!(draws[0], ("abcd".to_string(), 38, 40));
    }

    #[test]
    fn test_overlay_collapses_line_breaks() {
        let renderer = BoxRenderer::default();
        let mut image = RgbImage::new(100, 50);
        overlay(&mut image, "two\r\nlines", &renderer);
        assert_eq!(renderer.draws()[0].0, "two lines");
    }

    #[test]
    fn test_overlay_wider_than_frame() {
        let renderer = BoxRenderer::default();
        let mut image = RgbImage::new(12, 20);
        overlay(&mut image, "much too long", &renderer);
        assert!(renderer.draws()[0].1 < 0);
    }

    #[test]
    fn test_assembler_rotates_before_overlay() {
        let renderer = BoxRenderer::default();
        let mut document = RecordingDocument::default();
        let mut assembler =
            PageAssembler::new(&mut document, Some(&renderer), Rotation::Degrees(90));

        assembler.emit(RgbImage::new(40, 20), Some("hi")).unwrap();
        assert_eq!(document.page_count(), 1);

        // Placement is computed on the rotated 20x40 frame
        assert_eq!(renderer.draws()[0], ("hi".to_string(), 4, 30));
        assert_eq!(document.pages[0], (20, 40));
    }

    #[test]
    fn test_assembler_requires_renderer_for_text() {
        let mut document = RecordingDocument::default();
        let mut assembler = PageAssembler::new(&mut document, None, Rotation::None);
        assembler.emit(RgbImage::new(4, 4), None).unwrap();
        assert!(matches!(
            assembler.emit(RgbImage::new(4, 4), Some("text")),
            Err(ConvertError::Font(_))
        ));
    }
}
