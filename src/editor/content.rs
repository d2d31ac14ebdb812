//! Content stream assembly and page resources
//!
//! New drawing is always appended as a separate content stream; existing
//! streams are referenced, never parsed or rewritten.

use crate::document::{content_ids, inherited, page_dict, Document};
use crate::error::{PDFError, PDFResult};
use crate::pdf::{format_real, Dictionary, Object, ObjectId, ObjectStore, Stream};

/// RGB color with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };

    /// Components are clamped into range
    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgb(f64::from(r) / 255.0, f64::from(g) / 255.0, f64::from(b) / 255.0)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Builder for content stream operators
#[derive(Debug, Default)]
pub(crate) struct ContentBuilder {
    buffer: Vec<u8>,
}

impl ContentBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn operands(&mut self, values: &[f64], operator: &str) -> &mut Self {
        for value in values {
            self.buffer.extend_from_slice(format_real(*value).as_bytes());
            self.buffer.push(b' ');
        }
        self.buffer.extend_from_slice(operator.as_bytes());
        self.buffer.push(b'\n');
        self
    }

    pub(crate) fn save_state(&mut self) -> &mut Self {
        self.operands(&[], "q")
    }

    pub(crate) fn restore_state(&mut self) -> &mut Self {
        self.operands(&[], "Q")
    }

    pub(crate) fn fill_color(&mut self, color: Color) -> &mut Self {
        self.operands(&[color.r, color.g, color.b], "rg")
    }

    pub(crate) fn rectangle(&mut self, x: f64, y: f64, width: f64, height: f64) -> &mut Self {
        self.operands(&[x, y, width, height], "re")
    }

    pub(crate) fn fill(&mut self) -> &mut Self {
        self.operands(&[], "f")
    }

    pub(crate) fn transform(&mut self, matrix: [f64; 6]) -> &mut Self {
        self.operands(&matrix, "cm")
    }

    pub(crate) fn begin_text(&mut self) -> &mut Self {
        self.operands(&[], "BT")
    }

    pub(crate) fn end_text(&mut self) -> &mut Self {
        self.operands(&[], "ET")
    }

    pub(crate) fn font(&mut self, resource: &str, size: f64) -> &mut Self {
        self.name(resource);
        self.operands(&[size], "Tf")
    }

    pub(crate) fn leading(&mut self, leading: f64) -> &mut Self {
        self.operands(&[leading], "TL")
    }

    pub(crate) fn move_text(&mut self, x: f64, y: f64) -> &mut Self {
        self.operands(&[x, y], "Td")
    }

    pub(crate) fn next_line(&mut self) -> &mut Self {
        self.operands(&[], "T*")
    }

    pub(crate) fn show_text(&mut self, encoded: &[u8]) -> &mut Self {
        Object::String(encoded.to_vec()).write_to(&mut self.buffer);
        self.operands(&[], " Tj")
    }

    pub(crate) fn paint_xobject(&mut self, resource: &str) -> &mut Self {
        self.name(resource);
        self.operands(&[], "Do")
    }

    fn name(&mut self, resource: &str) {
        Object::name(resource).write_to(&mut self.buffer);
        self.buffer.push(b' ');
    }

    pub(crate) fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

/// Page dictionary for in-place modification
pub(crate) fn page_dict_mut(store: &mut ObjectStore, id: ObjectId) -> PDFResult<&mut Dictionary> {
    store
        .get_mut(id)
        .and_then(Object::as_dict_mut)
        .ok_or_else(|| PDFError::malformed(format!("Page object {} is not a dictionary", id)))
}

fn plain_stream(content: &[u8]) -> Object {
    Stream::new(Dictionary::new(), content.to_vec()).into()
}

const OPEN_MARKER: &[u8] = b"q\n";
const CLOSE_MARKER: &[u8] = b"\nQ\n";

/// True when the stream `id` decodes to exactly `marker`
fn is_marker(store: &ObjectStore, id: ObjectId, marker: &[u8]) -> bool {
    store
        .get(id)
        .and_then(Object::as_stream)
        .and_then(|stream| stream.decoded_content().ok())
        .map_or(false, |content| content == marker)
}

/// Append `operators` to the page as a new content stream
///
/// Existing content is bracketed by `q`/`Q` so graphics state it leaves
/// behind cannot leak into the appended stream. Content bracketed by an
/// earlier append is not bracketed again; every appended stream restores
/// its own state.
pub(crate) fn append_content(document: &mut Document, page: ObjectId, operators: Vec<u8>) -> PDFResult<()> {
    let existing = content_ids(&document.store, page_dict(&document.store, page)?);
    let bracketed = existing.len() >= 2
        && is_marker(&document.store, existing[0], OPEN_MARKER)
        && existing[1..].iter().any(|&id| is_marker(&document.store, id, CLOSE_MARKER));

    let mut contents: Vec<Object> = Vec::with_capacity(existing.len() + 3);
    if bracketed {
        contents.extend(existing.into_iter().map(Object::from));
    } else if !existing.is_empty() {
        contents.push(document.store.add(plain_stream(OPEN_MARKER)).into());
        contents.extend(existing.into_iter().map(Object::from));
        contents.push(document.store.add(plain_stream(CLOSE_MARKER)).into());
    }

    let mut wrapped = Vec::with_capacity(operators.len() + 4);
    wrapped.extend_from_slice(b"q\n");
    wrapped.extend_from_slice(&operators);
    wrapped.extend_from_slice(b"Q\n");
    contents.push(document.store.add(Stream::new(Dictionary::new(), wrapped).into()).into());

    page_dict_mut(&mut document.store, page)?.set("Contents", contents);
    Ok(())
}

/// Register `object` under the first unused `<prefix><n>` name in the
/// page's `/Resources` `category` and return the name
///
/// Inherited or indirect resources are copied onto the page first, so
/// dictionaries shared with other pages are left untouched.
pub(crate) fn add_resource(
    document: &mut Document,
    page: ObjectId,
    category: &str,
    prefix: &str,
    object: ObjectId,
) -> PDFResult<String> {
    let store = &document.store;
    let mut resources = inherited(store, page_dict(store, page)?, "Resources")
        .and_then(Object::as_dict)
        .cloned()
        .unwrap_or_default();
    let mut entries = resources
        .get(category)
        .and_then(|entries| store.resolve(entries))
        .and_then(Object::as_dict)
        .cloned()
        .unwrap_or_default();

    let name = unused_name(&entries, prefix);
    entries.set(name.clone(), object);
    resources.set(category, entries);
    page_dict_mut(&mut document.store, page)?.set("Resources", resources);
    Ok(name)
}

/// First `<prefix><n>` key, counting from 1, that `dict` does not hold
pub(crate) fn unused_name(dict: &Dictionary, prefix: &str) -> String {
    let mut index = 1;
    loop {
        let name = format!("{}{}", prefix, index);
        if !dict.has(&name) {
            return name;
        }
        index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{add_page, PageSize};
    use pretty_assertions::assert_eq;
    use test_log::test;

    #[test]
    fn test_builder_output() {
        let content = ContentBuilder::new()
            .save_state()
            .fill_color(Color::rgb(1.0, 0.5, 0.0))
            .rectangle(0.0, 0.0, 595.28, 841.89)
            .fill()
            .restore_state()
            .finish();
        assert_eq!(
            String::from_utf8_lossy(&content),
            "q\n1 0.5 0 rg\n0 0 595.28 841.89 re\nf\nQ\n"
        );
    }

    #[test]
    fn test_text_operators() {
        let content = ContentBuilder::new()
            .begin_text()
            .font("F1", 12.0)
            .move_text(72.0, 700.0)
            .show_text(b"Hi (there)")
            .end_text()
            .finish();
        assert_eq!(
            String::from_utf8_lossy(&content),
            "BT\n/F1 12 Tf\n72 700 Td\n(Hi \\(there\\)) Tj\nET\n"
        );
    }

    #[test]
    fn test_unused_name() {
        let mut dict = Dictionary::new();
        assert_eq!(unused_name(&dict, "F"), "F1");
        dict.set("F1", Object::Null);
        dict.set("F2", Object::Null);
        assert_eq!(unused_name(&dict, "F"), "F3");
    }

    #[test]
    fn test_append_wraps_existing_content() -> PDFResult<()> {
        let mut document = add_page(&Document::new(), PageSize::A4, Some(Color::WHITE))?;
        let page = document.page_id(0)?;
        append_content(&mut document, page, b"0 0 m\n".to_vec())?;

        let contents = content_ids(&document.store, page_dict(&document.store, page)?);
        assert_eq!(contents.len(), 4);
        let last = document.store.require(contents[3])?.as_stream().map(|s| s.content.clone());
        assert_eq!(last, Some(b"q\n0 0 m\nQ\n".to_vec()));
        Ok(())
    }

    #[test]
    fn test_repeated_appends_do_not_nest() -> PDFResult<()> {
        let mut document = add_page(&Document::new(), PageSize::A4, Some(Color::WHITE))?;
        let page = document.page_id(0)?;
        for _ in 0..5 {
            append_content(&mut document, page, b"0 0 m\n".to_vec())?;
        }

        let contents = content_ids(&document.store, page_dict(&document.store, page)?);
        assert_eq!(contents.len(), 8);
        let opening = contents
            .iter()
            .filter(|&&id| is_marker(&document.store, id, OPEN_MARKER))
            .count();
        assert_eq!(opening, 1);

        let mut depth = 0i32;
        let mut deepest = 0;
        for id in contents {
            let stream = document.store.require(id)?.as_stream().map(|s| s.content.clone()).unwrap_or_default();
            for line in stream.split(|&b| b == b'\n') {
                match line {
                    b"q" => depth += 1,
                    b"Q" => depth -= 1,
                    _ => {}
                }
                deepest = deepest.max(depth);
            }
        }
        assert_eq!(depth, 0);
        assert_eq!(deepest, 2);
        Ok(())
    }

    #[test]
    fn test_inherited_resources_are_copied() -> PDFResult<()> {
        let mut document = add_page(&Document::new(), PageSize::A4, None)?;
        let root = document.pages_root()?;
        let mut shared = Dictionary::new();
        shared.set("Font", Dictionary::new());
        if let Some(node) = document.store.get_mut(root).and_then(Object::as_dict_mut) {
            node.set("Resources", shared);
        }
        let page = document.page_id(0)?;
        page_dict_mut(&mut document.store, page)?.remove("Resources");

        let font = document.store.add(Object::Null);
        let name = add_resource(&mut document, page, "Font", "F", font)?;
        assert_eq!(name, "F1");

        let page_fonts = page_dict(&document.store, page)?
            .get_dict("Resources")
            .and_then(|r| r.get_dict("Font"))
            .map(|f| f.has("F1"));
        assert_eq!(page_fonts, Some(true));
        let root_fonts = page_dict(&document.store, root)?
            .get_dict("Resources")
            .and_then(|r| r.get_dict("Font"))
            .map(|f| f.has("F1"));
        assert_eq!(root_fonts, Some(false));
        Ok(())
    }
}
