//! Page tree traversal and page attributes

use log::{trace, warn};

use crate::error::{PDFError, PDFResult};
use crate::pdf::{Dictionary, Object, ObjectId, ObjectStore};

/// Attributes a page may inherit from its ancestors
pub(crate) const INHERITABLE: [&str; 4] = ["MediaBox", "CropBox", "Resources", "Rotate"];

/// Bound on `/Parent` hops when resolving inherited attributes
const MAX_TREE_DEPTH: usize = 256;

/// Node visits allowed in one traversal; shared subtrees are walked once
/// per parent
const MAX_TREE_NODES: usize = 1 << 20;

/// Rectangle in default user space units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rectangle {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// US Letter, used when a page declares no media box at all
    pub const LETTER: Rectangle = Rectangle { x0: 0.0, y0: 0.0, x1: 612.0, y1: 792.0 };

    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }

    /// Read a four-number array, resolving indirect elements
    pub fn from_object(object: &Object, store: &ObjectStore) -> Option<Self> {
        let items = store.resolve(object)?.as_array()?;
        let numbers: Vec<f64> = items
            .iter()
            .map(|item| store.resolve(item).and_then(Object::as_number))
            .collect::<Option<_>>()?;
        match numbers.as_slice() {
            &[x0, y0, x1, y1] => Some(Self::new(x0, y0, x1, y1)),
            _ => None,
        }
    }

    pub fn to_object(&self) -> Object {
        Object::rectangle(self.x0, self.y0, self.x1, self.y1)
    }
}

/// Page rotation in quarter turns clockwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalize any angle into `[0, 360)`, rounding to the nearest
    /// quarter turn
    pub fn from_degrees(degrees: i64) -> Self {
        let normalized = degrees.rem_euclid(360);
        match ((normalized + 45) / 90) % 4 {
            0 => Rotation::Deg0,
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            _ => Rotation::Deg270,
        }
    }

    pub fn degrees(&self) -> i64 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Add `degrees` to this rotation
    pub fn rotate(self, degrees: i64) -> Self {
        Self::from_degrees(self.degrees() + degrees.rem_euclid(360))
    }

    /// True for 90 and 270, where width and height trade places
    pub fn is_sideways(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// A leaf of the page tree with its inherited attributes resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub id: ObjectId,
    pub media_box: Rectangle,
    pub crop_box: Option<Rectangle>,
    pub rotation: Rotation,
    /// Content streams in drawing order
    pub contents: Vec<ObjectId>,
    pub resources: Dictionary,
}

impl Page {
    pub(crate) fn load(store: &ObjectStore, id: ObjectId) -> PDFResult<Self> {
        let dict = page_dict(store, id)?;

        let media_box = inherited(store, dict, "MediaBox")
            .and_then(|object| Rectangle::from_object(object, store))
            .unwrap_or_else(|| {
                warn!("Page {} has no usable /MediaBox; assuming US Letter", id);
                Rectangle::LETTER
            });
        let crop_box = inherited(store, dict, "CropBox")
            .and_then(|object| Rectangle::from_object(object, store));
        let rotation = inherited(store, dict, "Rotate")
            .and_then(|object| store.resolve_integer(object))
            .map(Rotation::from_degrees)
            .unwrap_or_default();
        let resources = inherited(store, dict, "Resources")
            .and_then(Object::as_dict)
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            id,
            media_box,
            crop_box,
            rotation,
            contents: content_ids(store, dict),
            resources,
        })
    }

    /// Visible region: the crop box when present, the media box otherwise
    pub fn visible_box(&self) -> Rectangle {
        self.crop_box.unwrap_or(self.media_box)
    }
}

/// Dictionary of a page object
pub(crate) fn page_dict(store: &ObjectStore, id: ObjectId) -> PDFResult<&Dictionary> {
    store
        .require(id)?
        .as_dict()
        .ok_or_else(|| PDFError::malformed(format!("Page object {} is not a dictionary", id)))
}

/// Content stream references held by a page's `/Contents`, which may be
/// a single stream, an array, or a reference to an array
pub(crate) fn content_ids(store: &ObjectStore, page: &Dictionary) -> Vec<ObjectId> {
    let references = |items: &[Object]| -> Vec<ObjectId> { items.iter().filter_map(Object::as_reference).collect() };
    match page.get("Contents") {
        Some(Object::Reference(id)) => match store.get(*id) {
            Some(Object::Array(items)) => references(items.as_slice()),
            Some(_) => vec![*id],
            None => Vec::new(),
        },
        Some(Object::Array(items)) => references(items.as_slice()),
        _ => Vec::new(),
    }
}

/// Look up `key` on the page or the nearest ancestor that carries it,
/// resolving the value if it is a reference
pub(crate) fn inherited<'a>(store: &'a ObjectStore, page: &'a Dictionary, key: &str) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        if let Some(value) = node.get(key) {
            return store.resolve(value);
        }
        node = node
            .get_reference("Parent")
            .and_then(|parent| store.get(parent))
            .and_then(Object::as_dict)?;
    }
    warn!("Gave up resolving inherited /{} after {} levels", key, MAX_TREE_DEPTH);
    None
}

/// Collect the leaves of the page tree in depth-first order
///
/// A node reachable from two parents is visited under each of them; only
/// a node that is its own ancestor is a cycle.
pub(crate) fn collect_page_ids(store: &ObjectStore, root: ObjectId) -> PDFResult<Vec<ObjectId>> {
    let mut pages = Vec::new();
    // Pages nodes from the root down to the parent of the next node
    let mut ancestors: Vec<ObjectId> = Vec::new();
    let mut stack = vec![(root, 0usize)];
    let mut visits = 0usize;

    while let Some((id, depth)) = stack.pop() {
        ancestors.truncate(depth);
        if ancestors.contains(&id) {
            return Err(PDFError::malformed(format!("Page tree cycle through object {}", id)));
        }
        if depth > MAX_TREE_DEPTH {
            return Err(PDFError::malformed(format!("Page tree deeper than {} levels", MAX_TREE_DEPTH)));
        }
        visits += 1;
        if visits > MAX_TREE_NODES {
            return Err(PDFError::malformed(format!("Page tree has more than {} nodes", MAX_TREE_NODES)));
        }
        let Some(object) = store.get(id) else {
            warn!("Skipping missing page tree node {}", id);
            continue;
        };
        let node = object
            .as_dict()
            .ok_or_else(|| PDFError::malformed(format!("Page tree node {} is not a dictionary", id)))?;

        let is_leaf = node.type_is("Page") || (!node.type_is("Pages") && !node.has("Kids"));
        if is_leaf {
            pages.push(id);
            continue;
        }

        let kids = node
            .get("Kids")
            .and_then(|kids| store.resolve(kids))
            .and_then(Object::as_array)
            .ok_or_else(|| PDFError::malformed(format!("Pages node {} has no /Kids array", id)))?;
        ancestors.push(id);
        // Reversed so the first kid is popped first
        for kid in kids.iter().rev() {
            match kid {
                Object::Reference(kid) => stack.push((*kid, depth + 1)),
                Object::Null => {}
                other => {
                    return Err(PDFError::malformed(format!(
                        "Pages node {} has a {} in /Kids",
                        id,
                        other.type_name()
                    )))
                }
            }
        }
    }

    trace!("Page tree has {} leaves", pages.len());
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn tree() -> (ObjectStore, ObjectId, Vec<ObjectId>) {
        let mut store = ObjectStore::new();
        let root = store.reserve();
        let middle = store.reserve();
        let first = store.reserve();
        let second = store.reserve();
        let third = store.reserve();

        let mut root_dict = Dictionary::with_type("Pages");
        root_dict.set("Kids", vec![Object::from(middle), Object::from(third)]);
        root_dict.set("Count", 3);
        root_dict.set("MediaBox", Object::rectangle(0.0, 0.0, 595.0, 842.0));
        root_dict.set("Rotate", 90);
        store.insert(root, root_dict.into());

        let mut middle_dict = Dictionary::with_type("Pages");
        middle_dict.set("Kids", vec![Object::from(first), Object::from(second)]);
        middle_dict.set("Count", 2);
        middle_dict.set("Parent", root);
        store.insert(middle, middle_dict.into());

        for (id, parent) in [(first, middle), (second, middle), (third, root)] {
            let mut page = Dictionary::with_type("Page");
            page.set("Parent", parent);
            store.insert(id, page.into());
        }
        if let Some(page) = store.get_mut(second).and_then(Object::as_dict_mut) {
            page.set("MediaBox", Object::rectangle(0.0, 0.0, 612.0, 792.0));
            page.set("Rotate", 0);
        }
        (store, root, vec![first, second, third])
    }

    #[test_log::test]
    fn test_depth_first_order() -> PDFResult<()> {
        let (store, root, expected) = tree();
        assert_eq!(collect_page_ids(&store, root)?, expected);
        Ok(())
    }

    #[test_log::test]
    fn test_inherited_attributes() -> PDFResult<()> {
        let (store, _, pages) = tree();
        let first = Page::load(&store, pages[0])?;
        assert_eq!(first.media_box, Rectangle::new(0.0, 0.0, 595.0, 842.0));
        assert_eq!(first.rotation, Rotation::Deg90);

        let second = Page::load(&store, pages[1])?;
        assert_eq!(second.media_box.width(), 612.0);
        assert_eq!(second.rotation, Rotation::Deg0);
        Ok(())
    }

    #[test_log::test]
    fn test_cycle_is_malformed() {
        let (mut store, root, _) = tree();
        if let Some(dict) = store.get_mut(root).and_then(Object::as_dict_mut) {
            dict.set("Kids", vec![Object::from(root)]);
        }
        assert!(matches!(collect_page_ids(&store, root), Err(PDFError::MalformedDocument(_))));
    }

    #[test_log::test]
    fn test_shared_node_is_not_a_cycle() -> PDFResult<()> {
        let (mut store, root, leaves) = tree();
        let middle = store
            .get(root)
            .and_then(Object::as_dict)
            .and_then(|dict| dict.get_array("Kids"))
            .and_then(|kids| kids[0].as_reference())
            .ok_or_else(|| PDFError::malformed("tree fixture"))?;
        if let Some(dict) = store.get_mut(middle).and_then(Object::as_dict_mut) {
            dict.set("Kids", vec![Object::from(leaves[0]), Object::from(leaves[1]), Object::from(leaves[2])]);
        }
        assert_eq!(collect_page_ids(&store, root)?, vec![leaves[0], leaves[1], leaves[2], leaves[2]]);

        // A node below itself is still rejected
        if let Some(dict) = store.get_mut(middle).and_then(Object::as_dict_mut) {
            dict.set("Kids", vec![Object::from(leaves[0]), Object::from(middle)]);
        }
        assert!(matches!(collect_page_ids(&store, root), Err(PDFError::MalformedDocument(_))));
        Ok(())
    }

    #[test_log::test]
    fn test_missing_kids_is_malformed() {
        let mut store = ObjectStore::new();
        let root = store.add(Dictionary::with_type("Pages").into());
        assert!(matches!(collect_page_ids(&store, root), Err(PDFError::MalformedDocument(_))));
    }

    #[rstest]
    #[case(0, Rotation::Deg0)]
    #[case(-90, Rotation::Deg270)]
    #[case(450, Rotation::Deg90)]
    #[case(100, Rotation::Deg90)]
    #[case(359, Rotation::Deg0)]
    #[case(-180, Rotation::Deg180)]
    fn test_rotation_normalization(#[case] degrees: i64, #[case] expected: Rotation) {
        assert_eq!(Rotation::from_degrees(degrees), expected);
    }
}
