//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::io::Cursor;

use pdf_editor_core::{
    add_image, add_page, add_text, Document, ImageOptions, Metadata, Object, PDFError, PDFResult, PageSize, Rectangle,
    Rotation, TextOptions,
};

/// Bodies of a small hand-written file: three pages under an intermediate
/// `Pages` node, with MediaBox and Resources inherited from the root
const FIXTURE_OBJECTS: [&str; 9] = [
    "<< /Type /Catalog /Pages 2 0 R >>",
    "<< /Type /Pages /Kids [3 0 R 6 0 R] /Count 3 /MediaBox [0 0 612 792] /Resources << /Font << /F1 9 0 R >> >> >>",
    "<< /Type /Pages /Parent 2 0 R /Kids [4 0 R 5 0 R] /Count 2 /Rotate 90 >>",
    "<< /Type /Page /Parent 3 0 R /Contents 7 0 R >>",
    "<< /Type /Page /Parent 3 0 R /MediaBox [0 0 200 300] >>",
    "<< /Type /Page /Parent 2 0 R /Contents 8 0 R >>",
    "<< /Length 34 >>\nstream\nBT /F1 12 Tf 72 720 Td (One) Tj ET\nendstream",
    "<< /Length 36 >>\nstream\nBT /F1 12 Tf 72 720 Td (Three) Tj ET\nendstream",
    "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>",
];

/// Assemble the fixture with correct xref offsets
pub fn three_page_pdf() -> Vec<u8> {
    let mut output = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(FIXTURE_OBJECTS.len());
    for (index, body) in FIXTURE_OBJECTS.iter().enumerate() {
        offsets.push(output.len());
        output.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", index + 1, body).as_bytes());
    }

    let xref_offset = output.len();
    output.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", FIXTURE_OBJECTS.len() + 1).as_bytes());
    for offset in offsets {
        output.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    output.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            FIXTURE_OBJECTS.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    output
}

/// Document with one page per size and a title
pub fn sized_document(sizes: &[PageSize], title: &str) -> PDFResult<Document> {
    let document = sizes
        .iter()
        .try_fold(Document::new(), |document, size| add_page(&document, *size, None))?;
    document.set_metadata(&Metadata {
        title: Some(title.to_string()),
        ..Metadata::default()
    })
}

/// Page heights in order; distinct sizes make page identity observable
pub fn page_heights(document: &Document) -> PDFResult<Vec<f64>> {
    (0..document.page_count()?)
        .map(|index| document.get_page(index).map(|page| page.media_box.height()))
        .collect()
}

/// What a page draws, independent of object numbering
#[derive(Debug, Clone, PartialEq)]
pub struct PageSummary {
    pub media_box: Rectangle,
    pub rotation: Rotation,
    /// Decoded content streams in drawing order
    pub content: Vec<u8>,
    /// Font resource name and its `/BaseFont`
    pub fonts: Vec<(String, String)>,
    /// XObject resource name, its pixel width and its decoded size
    pub xobjects: Vec<(String, i64, usize)>,
}

pub fn page_summaries(document: &Document) -> PDFResult<Vec<PageSummary>> {
    (0..document.page_count()?)
        .map(|index| {
            let handle = document.page_handle(index)?;
            let store = document.store();
            let resolve_dict = |category: &str| {
                handle
                    .resources
                    .get(category)
                    .and_then(|object| store.resolve(object))
                    .and_then(Object::as_dict)
                    .map(|dict| {
                        dict.iter()
                            .map(|(name, value)| (name.clone(), store.resolve(value).cloned()))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            };

            let fonts = resolve_dict("Font")
                .into_iter()
                .map(|(name, font)| {
                    let base = font
                        .as_ref()
                        .and_then(Object::as_dict)
                        .and_then(|dict| dict.get_name("BaseFont"))
                        .unwrap_or_default()
                        .to_string();
                    (name, base)
                })
                .collect();

            let mut xobjects = Vec::new();
            for (name, object) in resolve_dict("XObject") {
                let stream = object
                    .as_ref()
                    .and_then(Object::as_stream)
                    .ok_or_else(|| PDFError::malformed(format!("XObject {} is not a stream", name)))?;
                let width = stream.dict.get_integer("Width").unwrap_or_default();
                xobjects.push((name, width, stream.decoded_content()?.len()));
            }

            Ok(PageSummary {
                media_box: handle.media_box,
                rotation: handle.rotation,
                content: handle.content,
                fonts,
                xobjects,
            })
        })
        .collect()
}

/// 3x2 PNG with an alpha channel
pub fn small_png() -> PDFResult<Vec<u8>> {
    let pixels = image::RgbaImage::from_fn(3, 2, |x, y| image::Rgba([(x * 80) as u8, (y * 120) as u8, 40, 200]));
    let mut output = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut output, image::ImageOutputFormat::Png)
        .map_err(|e| PDFError::UnsupportedImageFormat(e.to_string()))?;
    Ok(output.into_inner())
}

/// The hand-written fixture with text on its first page and an image on
/// its second, so pages carry fonts, XObjects and several content streams
pub fn decorated_document() -> PDFResult<Document> {
    let document = Document::parse(&three_page_pdf())?;
    let document = add_text(&document, 0, "Annotated", 100.0, 100.0, &TextOptions::default().with_font_family("Courier"))?;
    add_image(&document, 1, &small_png()?, "png", 20.0, 30.0, &ImageOptions::with_size(60.0, 40.0))
}
