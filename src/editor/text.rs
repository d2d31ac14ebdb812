//! Text insertion with the standard fonts

use log::{debug, warn};

use crate::document::{inherited, page_dict, Document};
use crate::error::PDFResult;
use crate::pdf::{Object, ObjectId};
use super::content::{add_resource, append_content, Color, ContentBuilder};
use super::fonts::{try_embed_font, StandardFont};

/// Options for [`add_text`]
#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions {
    pub font_size: f64,
    pub color: Color,
    pub font_family: String,
    /// Distance between baselines of consecutive lines; defaults to
    /// 1.2 times the font size
    pub line_height: Option<f64>,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            color: Color::BLACK,
            font_family: StandardFont::Helvetica.base_font().to_string(),
            line_height: None,
        }
    }
}

impl TextOptions {
    pub fn with_font_size(mut self, font_size: f64) -> Self {
        self.font_size = font_size;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }
}

/// Draw `text` with its first baseline starting at (`x`, `y`)
///
/// Line breaks in `text` start new lines below the first. A font family
/// with no standard font falls back to Helvetica.
pub fn add_text(
    document: &Document,
    page_index: usize,
    text: &str,
    x: f64,
    y: f64,
    options: &TextOptions,
) -> PDFResult<Document> {
    document.ensure_unlocked()?;
    let mut output = document.clone();
    let page = output.page_id(page_index)?;

    let font = try_embed_font(&options.font_family).unwrap_or_else(|| {
        warn!("Font {:?} cannot be embedded; falling back to Helvetica", options.font_family);
        StandardFont::Helvetica
    });
    let resource = match existing_font_resource(&output, page, font) {
        Some(name) => name,
        None => {
            let font_id = output.store.add(font.to_dict().into());
            add_resource(&mut output, page, "Font", "F", font_id)?
        }
    };
    debug!("Adding text on page {} with {} as /{}", page_index, font, resource);

    let mut builder = ContentBuilder::new();
    builder
        .begin_text()
        .font(&resource, options.font_size)
        .fill_color(options.color)
        .leading(options.line_height.unwrap_or(options.font_size * 1.2))
        .move_text(x, y);
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            builder.next_line();
        }
        builder.show_text(&font.encode(line));
    }
    builder.end_text();

    append_content(&mut output, page, builder.finish())?;
    Ok(output)
}

/// Name of a font resource on the page that already references `font`
fn existing_font_resource(document: &Document, page: ObjectId, font: StandardFont) -> Option<String> {
    let store = &document.store;
    let resources = inherited(store, page_dict(store, page).ok()?, "Resources")?.as_dict()?;
    let fonts = store.resolve(resources.get("Font")?)?.as_dict()?;
    fonts
        .iter()
        .find(|(_, value)| {
            store.resolve(value).and_then(Object::as_dict).map_or(false, |dict| {
                dict.get_name("Subtype") == Some("Type1")
                    && dict.get_name("BaseFont") == Some(font.base_font())
                    && (font.is_symbolic() || dict.get_name("Encoding") == Some("WinAnsiEncoding"))
            })
        })
        .map(|(name, _)| name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::content_ids;
    use crate::editor::{add_page, PageSize};
    use crate::error::PDFError;
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn last_content(document: &Document, index: usize) -> PDFResult<String> {
        let page = document.get_page(index)?;
        let id = page.contents.last().copied().ok_or_else(|| PDFError::malformed("no content"))?;
        let stream = document.store.require(id)?.as_stream().ok_or_else(|| PDFError::malformed("not a stream"))?;
        Ok(String::from_utf8_lossy(&stream.decoded_content()?).into_owned())
    }

    #[test]
    fn test_add_text() -> PDFResult<()> {
        let document = add_page(&Document::new(), PageSize::A4, None)?;
        let edited = add_text(&document, 0, "Hello\nWorld", 72.0, 720.0, &TextOptions::default())?;

        let content = last_content(&edited, 0)?;
        assert_eq!(
            content,
            "q\nBT\n/F1 12 Tf\n0 0 0 rg\n14.4 TL\n72 720 Td\n(Hello) Tj\nT*\n(World) Tj\nET\nQ\n"
        );
        let page = edited.get_page(0)?;
        let font = page
            .resources
            .get_dict("Font")
            .and_then(|fonts| fonts.get_reference("F1"))
            .and_then(|id| edited.store.get(id))
            .and_then(Object::as_dict)
            .and_then(|dict| dict.get_name("BaseFont"));
        assert_eq!(font, Some("Helvetica"));

        assert!(document.get_page(0)?.contents.is_empty());
        Ok(())
    }

    #[test]
    fn test_unknown_font_falls_back() -> PDFResult<()> {
        let document = add_page(&Document::new(), PageSize::A4, None)?;
        let options = TextOptions::default().with_font_family("Comic Sans");
        let edited = add_text(&document, 0, "x", 10.0, 10.0, &options)?;
        let edited = add_text(&edited, 0, "y", 10.0, 30.0, &options)?;

        let fonts = edited.get_page(0)?.resources.get_dict("Font").map(|f| f.len());
        assert_eq!(fonts, Some(1));
        Ok(())
    }

    #[test]
    fn test_text_on_missing_page() -> PDFResult<()> {
        let document = add_page(&Document::new(), PageSize::A4, None)?;
        assert!(matches!(
            add_text(&document, 1, "x", 0.0, 0.0, &TextOptions::default()),
            Err(PDFError::IndexOutOfRange { index: 1, len: 1 })
        ));
        let page = document.page_id(0)?;
        assert!(content_ids(&document.store, page_dict(&document.store, page)?).is_empty());
        Ok(())
    }
}
