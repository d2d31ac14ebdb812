//! Page rasterization seam
//!
//! The core does not interpret content streams. A [`PageRenderer`] turns a
//! [`PageHandle`] into RGBA pixels; [`convert_pages`] drives it over a
//! document and encodes the results as PNG or JPEG files.

use std::io::Cursor;
use log::debug;

use crate::document::{Document, Rectangle, Rotation};
use crate::editor::ImageFormat;
use crate::error::{PDFError, PDFResult};
use crate::pdf::{Dictionary, Object};

/// Quality used for JPEG output
pub const JPEG_QUALITY: u8 = 90;

/// Largest bitmap side, the JPEG limit
pub const MAX_TARGET_DIMENSION: u32 = 65_535;

/// Everything a renderer needs to draw one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageHandle {
    /// Zero-based page index
    pub index: usize,
    pub media_box: Rectangle,
    pub rotation: Rotation,
    /// Decoded content streams, concatenated in drawing order
    pub content: Vec<u8>,
    pub resources: Dictionary,
}

/// Output bitmap size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of `page` at `scale` pixels per point, as displayed after
    /// rotation
    ///
    /// Fails when either side would exceed [`MAX_TARGET_DIMENSION`].
    pub fn for_page(page: &PageHandle, scale: f64) -> PDFResult<Self> {
        let pixels = |points: f64| {
            let pixels = (points.abs() * scale).floor().max(1.0);
            if pixels.is_finite() && pixels <= f64::from(MAX_TARGET_DIMENSION) {
                Ok(pixels as u32)
            } else {
                Err(PDFError::invalid_length(format!(
                    "page {} at scale {} ({} points)",
                    page.index, scale, points
                )))
            }
        };
        let (width, height) = (pixels(page.media_box.width())?, pixels(page.media_box.height())?);
        if page.rotation.is_sideways() {
            Ok(Self::new(height, width))
        } else {
            Ok(Self::new(width, height))
        }
    }

    /// Bytes in an RGBA bitmap of this size
    pub fn rgba_len(&self) -> PDFResult<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| PDFError::invalid_length(format!("{}x{} bitmap", self.width, self.height)))
    }
}

/// Rasterizes pages
pub trait PageRenderer {
    /// Draw `page` into a `target`-sized RGBA bitmap, row-major with four
    /// bytes per pixel
    fn render_page_to_bitmap(&self, page: &PageHandle, target: TargetSize) -> PDFResult<Vec<u8>>;
}

/// Renderer producing white pages of the right size
#[derive(Debug, Clone, Copy, Default)]
pub struct BlankRenderer;

impl PageRenderer for BlankRenderer {
    fn render_page_to_bitmap(&self, _page: &PageHandle, target: TargetSize) -> PDFResult<Vec<u8>> {
        Ok(vec![0xFF; target.rgba_len()?])
    }
}

/// One converted page
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// `<base>_page_<N>.<ext>`, N counted from 1
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Document {
    /// Renderer input for the page at zero-based `index`
    pub fn page_handle(&self, index: usize) -> PDFResult<PageHandle> {
        self.ensure_unlocked()?;
        let page = self.get_page(index)?;

        let mut content = Vec::new();
        for id in &page.contents {
            let Some(stream) = self.store.get(*id).and_then(Object::as_stream) else {
                continue;
            };
            if !content.is_empty() {
                content.push(b'\n');
            }
            content.extend_from_slice(&stream.decoded_content()?);
        }

        Ok(PageHandle {
            index,
            media_box: page.media_box,
            rotation: page.rotation,
            content,
            resources: page.resources,
        })
    }
}

fn encode_bitmap(bitmap: Vec<u8>, target: TargetSize, format: ImageFormat) -> PDFResult<Vec<u8>> {
    if bitmap.len() != target.rgba_len()? {
        return Err(PDFError::invalid_length(format!(
            "{}x{} bitmap ({} bytes)",
            target.width,
            target.height,
            bitmap.len()
        )));
    }
    let pixels = image::RgbaImage::from_raw(target.width, target.height, bitmap)
        .ok_or_else(|| PDFError::invalid_length("bitmap"))?;

    let mut output = Cursor::new(Vec::new());
    let written = match format {
        ImageFormat::Png => image::DynamicImage::ImageRgba8(pixels).write_to(&mut output, image::ImageOutputFormat::Png),
        ImageFormat::Jpeg => image::DynamicImage::ImageRgb8(image::DynamicImage::ImageRgba8(pixels).to_rgb8())
            .write_to(&mut output, image::ImageOutputFormat::Jpeg(JPEG_QUALITY)),
    };
    written.map_err(|e| PDFError::UnsupportedImageFormat(format!("{} encoding failed: {}", format, e)))?;
    Ok(output.into_inner())
}

/// Render every page at `scale` pixels per point and encode it
pub fn convert_pages(
    document: &Document,
    renderer: &dyn PageRenderer,
    scale: f64,
    base_name: &str,
    format: ImageFormat,
) -> PDFResult<Vec<RenderedPage>> {
    (0..document.page_count()?)
        .map(|index| {
            let page = document.page_handle(index)?;
            let target = TargetSize::for_page(&page, scale)?;
            let bitmap = renderer.render_page_to_bitmap(&page, target)?;
            let file_name = format!("{}_page_{}.{}", base_name, index + 1, format.extension());
            debug!("Rendered {} at {}x{}", file_name, target.width, target.height);
            Ok(RenderedPage {
                file_name,
                bytes: encode_bitmap(bitmap, target, format)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{add_page, add_text, rotate_page, PageSize, TextOptions};
    use image::GenericImageView;
    use pretty_assertions::assert_eq;
    use test_log::test;

    struct WrongSize;

    impl PageRenderer for WrongSize {
        fn render_page_to_bitmap(&self, _page: &PageHandle, _target: TargetSize) -> PDFResult<Vec<u8>> {
            Ok(vec![0; 3])
        }
    }

    fn two_pages() -> PDFResult<Document> {
        let document = add_page(&Document::new(), PageSize::A4, None)?;
        let document = add_page(&document, PageSize::Custom { width: 200.0, height: 100.0 }, None)?;
        rotate_page(&document, 1, 90)
    }

    #[test]
    fn test_page_handle() -> PDFResult<()> {
        let document = add_text(&two_pages()?, 0, "hi", 1.0, 2.0, &TextOptions::default())?;
        let handle = document.page_handle(0)?;
        assert!(handle.content.starts_with(b"q\nBT\n"));
        assert!(handle.resources.get_dict("Font").is_some());

        let sideways = document.page_handle(1)?;
        assert_eq!(TargetSize::for_page(&sideways, 2.0)?, TargetSize::new(200, 400));
        Ok(())
    }

    #[test]
    fn test_convert_names_and_encodes() -> PDFResult<()> {
        let pages = convert_pages(&two_pages()?, &BlankRenderer, 0.5, "scan", ImageFormat::Png)?;
        let names: Vec<&str> = pages.iter().map(|p| p.file_name.as_str()).collect();
        assert_eq!(names, vec!["scan_page_1.png", "scan_page_2.png"]);

        let decoded = image::load_from_memory(&pages[1].bytes).map_err(|e| PDFError::malformed(e.to_string()))?;
        assert_eq!(decoded.dimensions(), (50, 100));

        let jpeg = convert_pages(&two_pages()?, &BlankRenderer, 0.25, "scan", ImageFormat::Jpeg)?;
        assert_eq!(jpeg[0].file_name, "scan_page_1.jpg");
        assert!(jpeg[0].bytes.starts_with(&[0xFF, 0xD8]));
        Ok(())
    }

    #[test]
    fn test_oversized_target_is_rejected() -> PDFResult<()> {
        let huge = add_page(&Document::new(), PageSize::Custom { width: 1e12, height: 10.0 }, None)?;
        let result = convert_pages(&huge, &BlankRenderer, 1.0, "huge", ImageFormat::Png);
        assert!(matches!(result, Err(PDFError::InvalidDataLength { .. })));

        let page = two_pages()?.page_handle(0)?;
        assert!(TargetSize::for_page(&page, f64::INFINITY).is_err());
        assert_eq!(TargetSize::for_page(&page, 1.0)?, TargetSize::new(595, 841));
        Ok(())
    }

    #[test]
    fn test_renderer_output_is_checked() -> PDFResult<()> {
        let result = convert_pages(&two_pages()?, &WrongSize, 1.0, "scan", ImageFormat::Png);
        assert!(matches!(result, Err(PDFError::InvalidDataLength { .. })));
        Ok(())
    }
}
