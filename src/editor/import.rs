//! Copying pages between documents
//!
//! Every object reachable from an imported page is copied into the target
//! store under a fresh number, with references rewritten to match. Page
//! tree nodes and the catalog are never followed: `/Parent` is rebuilt in
//! the target, and references to pages that are not part of the import
//! become `null`.

use std::collections::{HashMap, VecDeque};
use log::trace;

use crate::document::{inherited, page_dict, Document, INHERITABLE};
use crate::error::PDFResult;
use crate::pdf::{Object, ObjectId, ObjectStore};

/// Copies pages and the objects they reach from one source document
pub(crate) struct PageImporter<'s> {
    source: &'s Document,
    /// Source identifier to target identifier
    mapping: HashMap<ObjectId, ObjectId>,
    /// Source objects whose target number is reserved but not yet filled
    pending: VecDeque<ObjectId>,
}

impl<'s> PageImporter<'s> {
    pub(crate) fn new(source: &'s Document) -> Self {
        Self {
            source,
            mapping: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Append copies of `pages` to the root of `target`'s page tree
    pub(crate) fn import_pages(&mut self, target: &mut Document, pages: &[ObjectId]) -> PDFResult<Vec<ObjectId>> {
        let source = self.source;
        let root = target.pages_root()?;

        // Reserve every page first so pages can reference each other
        let imported: Vec<ObjectId> = pages
            .iter()
            .map(|&page| {
                let id = target.store.reserve();
                self.mapping.insert(page, id);
                id
            })
            .collect();

        for (&page, &id) in pages.iter().zip(&imported) {
            let original = page_dict(&source.store, page)?;
            let mut copy = original.clone();
            for key in INHERITABLE {
                if !copy.has(key) {
                    if let Some(value) = inherited(&source.store, original, key) {
                        copy.set(key, value.clone());
                    }
                }
            }
            copy.remove("Parent");

            let mut object = Object::Dictionary(copy);
            object.remap_references(&mut |reference| self.map_reference(&mut target.store, reference));
            if let Some(dict) = object.as_dict_mut() {
                dict.set("Parent", root);
            }
            target.store.insert(id, object);
            self.copy_pending(&mut target.store);
        }

        let count = imported.len() as i64;
        if let Some(root_dict) = target.store.get_mut(root).and_then(Object::as_dict_mut) {
            let mut kids = root_dict.get_array("Kids").cloned().unwrap_or_default();
            kids.extend(imported.iter().copied().map(Object::from));
            root_dict.set("Kids", kids);
            let total = root_dict.get_integer("Count").unwrap_or(0) + count;
            root_dict.set("Count", total);
        }
        target.invalidate_page_cache();
        trace!("Imported {} pages, {} objects copied", imported.len(), self.mapping.len());
        Ok(imported)
    }

    /// Copy a single object and everything it reaches; returns the value to
    /// store in the target in place of a reference to `id`
    pub(crate) fn import_object(&mut self, target: &mut ObjectStore, id: ObjectId) -> Object {
        let reference = self.map_reference(target, id);
        self.copy_pending(target);
        reference
    }

    fn map_reference(&mut self, target: &mut ObjectStore, id: ObjectId) -> Object {
        if let Some(&mapped) = self.mapping.get(&id) {
            return Object::Reference(mapped);
        }
        match self.source.store.get(id) {
            None => Object::Null,
            Some(object) if is_page_structure(object) => Object::Null,
            Some(_) => {
                let mapped = target.reserve();
                self.mapping.insert(id, mapped);
                self.pending.push_back(id);
                Object::Reference(mapped)
            }
        }
    }

    /// Fill in every reserved object, sharing those without references
    fn copy_pending(&mut self, target: &mut ObjectStore) {
        let source = self.source;
        while let Some(id) = self.pending.pop_front() {
            let (Some(shared), Some(&mapped)) = (source.store.get_shared(id), self.mapping.get(&id)) else {
                continue;
            };
            let mut has_references = false;
            shared.for_each_reference(&mut |_| has_references = true);
            if has_references {
                let mut copy = (*shared).clone();
                copy.remap_references(&mut |reference| self.map_reference(target, reference));
                target.insert(mapped, copy);
            } else {
                target.insert_shared(mapped, shared);
            }
        }
    }
}

/// Page tree nodes and the catalog are rebuilt, never copied
fn is_page_structure(object: &Object) -> bool {
    object
        .as_dict()
        .map_or(false, |dict| dict.type_is("Page") || dict.type_is("Pages") || dict.type_is("Catalog"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{add_page, add_text, PageSize, TextOptions};
    use crate::pdf::Dictionary;
    use pretty_assertions::assert_eq;
    use test_log::test;

    #[test]
    fn test_import_renumbers_and_shares() -> PDFResult<()> {
        let source = add_page(&Document::new(), PageSize::Letter, None)?;
        let source = add_text(&source, 0, "copied", 10.0, 10.0, &TextOptions::default())?;
        let page = source.page_id(0)?;

        let mut target = add_page(&Document::new(), PageSize::A4, None)?;
        let imported = PageImporter::new(&source).import_pages(&mut target, &[page])?;

        assert_eq!(target.page_count()?, 2);
        assert_eq!(target.page_ids()?[1], imported[0]);
        let copy = target.get_page(1)?;
        assert_eq!(copy.media_box.width(), 612.0);
        assert_eq!(copy.contents.len(), 1);
        assert!(copy.resources.get_dict("Font").is_some());
        Ok(())
    }

    #[test]
    fn test_references_to_other_pages_become_null() -> PDFResult<()> {
        let source = add_page(&add_page(&Document::new(), PageSize::A4, None)?, PageSize::A4, None)?;
        let mut source = source;
        let first = source.page_id(0)?;
        let second = source.page_id(1)?;

        let mut link = Dictionary::with_type("Annot");
        link.set("Subtype", Object::name("Link"));
        link.set("Dest", vec![Object::from(second), Object::name("Fit")]);
        let link_id = source.store.add(link.into());
        if let Some(page) = source.store.get_mut(first).and_then(Object::as_dict_mut) {
            page.set("Annots", vec![Object::from(link_id)]);
        }

        let mut target = Document::new();
        PageImporter::new(&source).import_pages(&mut target, &[first])?;
        let page = target.page_id(0)?;
        let annots = page_dict(&target.store, page)?.get_array("Annots").cloned().unwrap_or_default();
        let copied_link = annots[0]
            .as_reference()
            .and_then(|id| target.store.get(id))
            .and_then(Object::as_dict)
            .cloned()
            .unwrap_or_default();
        assert_eq!(copied_link.get_array("Dest"), Some(&vec![Object::Null, Object::name("Fit")]));
        Ok(())
    }

    #[test]
    fn test_inherited_attributes_materialized() -> PDFResult<()> {
        let mut source = add_page(&Document::new(), PageSize::A4, None)?;
        let page = source.page_id(0)?;
        let root = source.pages_root()?;
        if let Some(dict) = source.store.get_mut(page).and_then(Object::as_dict_mut) {
            dict.remove("MediaBox");
        }
        if let Some(dict) = source.store.get_mut(root).and_then(Object::as_dict_mut) {
            dict.set("MediaBox", Object::rectangle(0.0, 0.0, 300.0, 400.0));
            dict.set("Rotate", 90);
        }

        let mut target = Document::new();
        let imported = PageImporter::new(&source).import_pages(&mut target, &[page])?;
        let dict = page_dict(&target.store, imported[0])?;
        assert!(dict.has("MediaBox"));
        assert_eq!(dict.get_integer("Rotate"), Some(90));
        assert_eq!(dict.get_reference("Parent"), Some(target.pages_root()?));
        Ok(())
    }
}
