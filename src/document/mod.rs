//! Document model
//!
//! A [`Document`] is an immutable value: every editing operation returns a
//! new document and leaves its input untouched. Cloning shares the
//! underlying objects, so an edit copies only what it changes.

mod metadata;
mod page;

pub use metadata::{decode_text_string, encode_text_string, format_date, parse_date, Metadata};
pub use page::{Page, Rectangle, Rotation};
pub(crate) use page::{content_ids, inherited, page_dict, INHERITABLE};

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::path::Path;
use log::{debug, info};

use crate::config::{ParseOptions, SaveOptions};
use crate::error::{PDFError, PDFResult};
use crate::handlers::SecurityHandler;
use crate::pdf::{
    CompressedLocation, Dictionary, Object, ObjectId, ObjectStore, PDFParser, PDFWriter, Trailer, Version,
};
use crate::security::{self, SecurityState};

/// Parsed or newly created PDF document
#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) version: Version,
    pub(crate) store: ObjectStore,
    pub(crate) trailer: Trailer,
    pub(crate) security: SecurityState,
    /// Compressed objects still inside encrypted object streams
    pub(crate) deferred: BTreeMap<u32, CompressedLocation>,
    page_order: OnceCell<Vec<ObjectId>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document: a catalog and a page tree with no pages
    pub fn new() -> Self {
        let mut store = ObjectStore::new();
        let catalog = store.reserve();
        let pages = store.reserve();

        let mut pages_dict = Dictionary::with_type("Pages");
        pages_dict.set("Kids", Vec::<Object>::new());
        pages_dict.set("Count", 0);
        store.insert(pages, pages_dict.into());

        let mut catalog_dict = Dictionary::with_type("Catalog");
        catalog_dict.set("Pages", pages);
        store.insert(catalog, catalog_dict.into());

        let mut trailer = Trailer::new(catalog);
        trailer.size = store.size();

        Self {
            version: Version::default(),
            store,
            trailer,
            security: SecurityState::Unencrypted,
            deferred: BTreeMap::new(),
            page_order: OnceCell::new(),
        }
    }

    /// Parse a document with default options
    ///
    /// An encrypted document parses into the locked state; its strings and
    /// streams stay encrypted until [`security::decrypt`] is applied.
    pub fn parse(bytes: &[u8]) -> PDFResult<Self> {
        Self::parse_with(bytes, &ParseOptions::default())
    }

    pub fn parse_with(bytes: &[u8], options: &ParseOptions) -> PDFResult<Self> {
        let parsed = PDFParser::new(bytes, options.clone()).parse()?;

        let security = match parsed.trailer.encrypt {
            Some(encrypt) => {
                let dict = parsed
                    .store
                    .require(encrypt)?
                    .as_dict()
                    .ok_or_else(|| PDFError::malformed("/Encrypt is not a dictionary"))?;
                let handler = SecurityHandler::from_dict(dict, parsed.trailer.first_id())?;
                info!("Document is encrypted with {}", handler.algorithm());
                SecurityState::Locked(handler)
            }
            None => SecurityState::Unencrypted,
        };

        let document = Self {
            version: parsed.version,
            store: parsed.store,
            trailer: parsed.trailer,
            security,
            deferred: parsed.deferred,
            page_order: OnceCell::new(),
        };
        if !document.security.is_locked() {
            document.catalog()?;
        }
        Ok(document)
    }

    /// Parse and decrypt in one step
    pub fn parse_with_password(bytes: &[u8], password: &str) -> PDFResult<Self> {
        let document = Self::parse(bytes)?;
        security::decrypt(&document, password)
    }

    /// Read and parse a file
    pub fn load(path: impl AsRef<Path>) -> PDFResult<Self> {
        let path = path.as_ref();
        debug!("Loading {}", path.display());
        let bytes = std::fs::read(path).map_err(|e| PDFError::io(path, e))?;
        Self::parse(&bytes)
    }

    /// Serialize with default options and write to `path`
    pub fn save(&self, path: impl AsRef<Path>) -> PDFResult<()> {
        self.save_with(path, &SaveOptions::default())
    }

    /// Serialize and write to `path`
    ///
    /// The whole file is produced in memory first, so a serialization
    /// failure never leaves a truncated file behind.
    pub fn save_with(&self, path: impl AsRef<Path>, options: &SaveOptions) -> PDFResult<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes_with(options)?;
        std::fs::write(path, &bytes).map_err(|e| PDFError::io(path, e))?;
        info!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    pub fn to_bytes(&self) -> PDFResult<Vec<u8>> {
        self.to_bytes_with(&SaveOptions::default())
    }

    /// Serialize as a complete PDF file
    pub fn to_bytes_with(&self, options: &SaveOptions) -> PDFResult<Vec<u8>> {
        if !self.deferred.is_empty() {
            // Objects inside encrypted object streams cannot be written back
            return Err(PDFError::DocumentLocked);
        }
        PDFWriter::new(&self.store, &self.trailer, self.version)
            .with_cipher(self.security.pending_cipher())
            .write(options)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn security_state(&self) -> &SecurityState {
        &self.security
    }

    /// True when the document is encrypted on disk or will be on save
    pub fn is_encrypted(&self) -> bool {
        self.security.is_encrypted()
    }

    /// Document catalog
    pub fn catalog(&self) -> PDFResult<&Dictionary> {
        self.store
            .require(self.trailer.root)?
            .as_dict()
            .ok_or_else(|| PDFError::malformed("Document catalog is not a dictionary"))
    }

    /// Root node of the page tree
    pub(crate) fn pages_root(&self) -> PDFResult<ObjectId> {
        self.catalog()?
            .get_reference("Pages")
            .ok_or_else(|| PDFError::malformed("Catalog has no /Pages reference"))
    }

    /// Page objects in document order
    pub fn page_ids(&self) -> PDFResult<&[ObjectId]> {
        if let Some(ids) = self.page_order.get() {
            return Ok(ids);
        }
        let ids = page::collect_page_ids(&self.store, self.pages_root()?)?;
        Ok(self.page_order.get_or_init(|| ids))
    }

    pub fn page_count(&self) -> PDFResult<usize> {
        Ok(self.page_ids()?.len())
    }

    /// Object of the page at zero-based `index`
    pub(crate) fn page_id(&self, index: usize) -> PDFResult<ObjectId> {
        let ids = self.page_ids()?;
        ids.get(index).copied().ok_or(PDFError::IndexOutOfRange {
            index,
            len: ids.len(),
        })
    }

    /// Page at zero-based `index` with inherited attributes resolved
    pub fn get_page(&self, index: usize) -> PDFResult<Page> {
        Page::load(&self.store, self.page_id(index)?)
    }

    /// Drop the cached page order after the page tree changes
    pub(crate) fn invalidate_page_cache(&mut self) {
        self.page_order = OnceCell::new();
    }

    /// Fail on documents whose content is still ciphertext
    pub(crate) fn ensure_unlocked(&self) -> PDFResult<()> {
        if self.security.is_locked() {
            return Err(PDFError::DocumentLocked);
        }
        Ok(())
    }

    /// Read the information dictionary
    pub fn metadata(&self) -> PDFResult<Metadata> {
        self.ensure_unlocked()?;
        let info = self
            .trailer
            .info
            .and_then(|id| self.store.get(id))
            .and_then(Object::as_dict);
        Ok(info.map(Metadata::from_info).unwrap_or_default())
    }

    /// Return a copy with the present fields of `metadata` written to the
    /// information dictionary
    pub fn set_metadata(&self, metadata: &Metadata) -> PDFResult<Document> {
        self.ensure_unlocked()?;
        let mut output = self.clone();

        let existing = output
            .trailer
            .info
            .filter(|id| output.store.get(*id).and_then(Object::as_dict).is_some());
        let info_id = match existing {
            Some(id) => id,
            None => {
                let id = output.store.add(Dictionary::new().into());
                output.trailer.info = Some(id);
                id
            }
        };
        if let Some(info) = output.store.get_mut(info_id).and_then(Object::as_dict_mut) {
            metadata.apply_to(info);
        }
        Ok(output)
    }
}
