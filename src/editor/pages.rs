//! Page tree edits: add, delete, move and rotate pages

use std::collections::HashSet;
use log::{debug, warn};

use crate::document::{inherited, page_dict, Document, Rotation, INHERITABLE};
use crate::error::{PDFError, PDFResult};
use crate::pdf::{Dictionary, Object, ObjectId, ObjectStore, Stream};
use super::content::{page_dict_mut, Color, ContentBuilder};

/// Page dimensions in points
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PageSize {
    #[default]
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Custom { width: f64, height: f64 },
}

impl PageSize {
    /// Width and height in points
    pub fn dimensions(&self) -> (f64, f64) {
        match *self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::A3 => (841.89, 1190.55),
            PageSize::A5 => (419.53, 595.28),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::Custom { width, height } => (width, height),
        }
    }
}

/// Kids array of a page tree node, following an indirect array
fn kids_mut(store: &mut ObjectStore, node: ObjectId) -> PDFResult<&mut Vec<Object>> {
    let indirect = page_dict(store, node)?.get_reference("Kids");
    let kids = match indirect {
        Some(array) => store.get_mut(array),
        None => store
            .get_mut(node)
            .and_then(Object::as_dict_mut)
            .and_then(|dict| dict.get_mut("Kids")),
    };
    kids.and_then(Object::as_array_mut)
        .ok_or_else(|| PDFError::malformed(format!("Pages node {} has no /Kids array", node)))
}

/// Add `delta` to `/Count` on `node` and every ancestor above it
fn adjust_counts(store: &mut ObjectStore, node: ObjectId, delta: i64) -> PDFResult<()> {
    let mut visited = HashSet::new();
    let mut current = Some(node);
    while let Some(id) = current {
        if !visited.insert(id) {
            return Err(PDFError::malformed(format!("Page tree cycle through object {}", id)));
        }
        let dict = page_dict_mut(store, id)?;
        let count = dict.get_integer("Count").unwrap_or(0);
        dict.set("Count", (count + delta).max(0));
        current = dict.get_reference("Parent");
    }
    Ok(())
}

/// Parent node of a page
fn parent_of(store: &ObjectStore, page: ObjectId) -> PDFResult<ObjectId> {
    page_dict(store, page)?
        .get_reference("Parent")
        .ok_or_else(|| PDFError::malformed(format!("Page {} has no /Parent", page)))
}

/// Detach a page from its parent's kids and update the counts above it
fn unlink_page(store: &mut ObjectStore, page: ObjectId) -> PDFResult<()> {
    let parent = parent_of(store, page)?;
    kids_mut(store, parent)?.retain(|kid| kid.as_reference() != Some(page));
    adjust_counts(store, parent, -1)
}

/// Copy attributes the page inherits onto the page itself, so that it
/// keeps them under a different parent
fn materialize_inherited(store: &mut ObjectStore, page: ObjectId) -> PDFResult<()> {
    let dict = page_dict(store, page)?;
    let missing: Vec<(&str, Object)> = INHERITABLE
        .iter()
        .filter(|&&key| !dict.has(key))
        .filter_map(|&key| inherited(store, dict, key).map(|value| (key, value.clone())))
        .collect();
    let dict = page_dict_mut(store, page)?;
    for (key, value) in missing {
        dict.set(key, value);
    }
    Ok(())
}

/// Insert a page into `parent`'s kids at `position`
fn link_page(store: &mut ObjectStore, parent: ObjectId, position: usize, page: ObjectId) -> PDFResult<()> {
    let kids = kids_mut(store, parent)?;
    let position = position.min(kids.len());
    kids.insert(position, Object::Reference(page));
    page_dict_mut(store, page)?.set("Parent", parent);
    adjust_counts(store, parent, 1)
}

/// Append a blank page after the last page
///
/// With a background color the page gets a single content stream filling
/// its media box.
pub fn add_page(document: &Document, size: PageSize, background: Option<Color>) -> PDFResult<Document> {
    document.ensure_unlocked()?;
    let (width, height) = size.dimensions();
    if !(width > 0.0 && height > 0.0) {
        return Err(PDFError::invalid_length(format!("page size {}x{}", width, height)));
    }

    let mut output = document.clone();
    let root = output.pages_root()?;

    let mut page = Dictionary::with_type("Page");
    page.set("Parent", root);
    page.set("MediaBox", Object::rectangle(0.0, 0.0, width, height));
    page.set("Resources", Dictionary::new());
    if let Some(color) = background {
        let content = ContentBuilder::new()
            .save_state()
            .fill_color(color)
            .rectangle(0.0, 0.0, width, height)
            .fill()
            .restore_state()
            .finish();
        let content_id = output.store.add(Stream::new(Dictionary::new(), content).into());
        page.set("Contents", content_id);
    }
    let page_id = output.store.add(page.into());

    let position = kids_mut(&mut output.store, root)?.len();
    link_page(&mut output.store, root, position, page_id)?;
    output.invalidate_page_cache();
    debug!("Added {}x{} page {}", width, height, page_id);
    Ok(output)
}

/// Remove the page at zero-based `index` and free its object number
pub fn delete_page(document: &Document, index: usize) -> PDFResult<Document> {
    document.ensure_unlocked()?;
    let mut output = document.clone();
    let page = output.page_id(index)?;

    unlink_page(&mut output.store, page)?;
    output.store.remove(page);
    output.invalidate_page_cache();
    debug!("Deleted page {} (object {})", index, page);
    Ok(output)
}

/// Move the page at `from` so that it ends up at position `to`
pub fn move_page(document: &Document, from: usize, to: usize) -> PDFResult<Document> {
    document.ensure_unlocked()?;
    let mut output = document.clone();
    let pages = output.page_ids()?.to_vec();
    let page = output.page_id(from)?;
    if to >= pages.len() {
        return Err(PDFError::IndexOutOfRange { index: to, len: pages.len() });
    }
    if from == to {
        return Ok(output);
    }

    materialize_inherited(&mut output.store, page)?;
    unlink_page(&mut output.store, page)?;

    // Place before the page that will follow it, or after the last page
    let remaining: Vec<ObjectId> = pages.into_iter().filter(|id| *id != page).collect();
    let (anchor, offset) = match remaining.get(to) {
        Some(&next) => (next, 0),
        None => {
            let last = remaining
                .last()
                .copied()
                .ok_or_else(|| PDFError::malformed("Page tree lost its pages while moving"))?;
            (last, 1)
        }
    };
    let parent = parent_of(&output.store, anchor)?;
    let position = kids_mut(&mut output.store, parent)?
        .iter()
        .position(|kid| kid.as_reference() == Some(anchor))
        .ok_or_else(|| PDFError::malformed(format!("Page {} is missing from its parent", anchor)))?;

    link_page(&mut output.store, parent, position + offset, page)?;
    output.invalidate_page_cache();
    debug!("Moved page {} to {}", from, to);
    Ok(output)
}

/// Rotate the page at `index` by `degrees` clockwise
///
/// The result is normalized into `[0, 360)`; angles that are not
/// multiples of 90 are rounded to the nearest quarter turn.
pub fn rotate_page(document: &Document, index: usize, degrees: i64) -> PDFResult<Document> {
    document.ensure_unlocked()?;
    let mut output = document.clone();
    let page = output.get_page(index)?;

    if degrees % 90 != 0 {
        warn!("Rotation by {} degrees rounded to the nearest quarter turn", degrees);
    }
    let rotation: Rotation = page.rotation.rotate(degrees);
    page_dict_mut(&mut output.store, page.id)?.set("Rotate", rotation.degrees());
    Ok(output)
}
