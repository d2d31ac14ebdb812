//! Full-rewrite serializer
//!
//! Every save writes the header, all live objects in ascending object
//! number, a freshly built cross-reference section and the trailer. No
//! incremental-update sections are produced.

use std::borrow::Cow;
use log::{debug, trace};
use md5::{Digest, Md5};

use crate::config::{SaveOptions, XRefForm};
use crate::crypto::ObjectCipher;
use crate::error::PDFResult;
use super::{Object, ObjectId, ObjectStore, Trailer, Version, XRefWriter};

/// Binary comment after the header so transfer tools treat the file as binary
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Serializes a store and trailer into PDF bytes
pub struct PDFWriter<'a> {
    store: &'a ObjectStore,
    trailer: &'a Trailer,
    version: Version,
    cipher: Option<&'a ObjectCipher>,
}

impl<'a> PDFWriter<'a> {
    pub fn new(store: &'a ObjectStore, trailer: &'a Trailer, version: Version) -> Self {
        Self {
            store,
            trailer,
            version,
            cipher: None,
        }
    }

    /// Encrypt strings and streams while writing
    ///
    /// The object named by the trailer's `/Encrypt` entry is written in the
    /// clear, as are cross-reference streams.
    pub fn with_cipher(mut self, cipher: Option<&'a ObjectCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    fn output_version(&self, options: &SaveOptions) -> Version {
        let mut version = self.version.max(options.xref_form.minimum_version());
        if let Some(cipher) = self.cipher {
            version = version.max(cipher.algorithm().minimum_version());
        }
        version
    }

    /// Serialize to a complete byte buffer
    pub fn write(&self, options: &SaveOptions) -> PDFResult<Vec<u8>> {
        let version = self.output_version(options);
        debug!(
            "Writing PDF {} with {} objects ({:?} cross-reference)",
            version,
            self.store.len(),
            options.xref_form
        );

        let mut output = format!("%PDF-{}\n", version).into_bytes();
        output.extend_from_slice(BINARY_MARKER);

        let mut xref = XRefWriter::new(self.store.size());
        for (number, generation) in self.store.free_entries() {
            xref.set_free_generation(number, generation);
        }

        for (id, object) in self.store.iter() {
            xref.set_in_use(id.number, output.len() as u64, id.generation);
            let object = self.prepare(id, object, options)?;
            write_indirect(&mut output, id, &object);
        }

        let mut trailer = self.trailer.clone();
        if trailer.id.is_none() {
            let digest = Md5::digest(&output).to_vec();
            trailer.id = Some([digest.clone(), digest]);
        }

        let xref_offset = output.len();
        match options.xref_form {
            XRefForm::Table => {
                trailer.size = xref.size();
                xref.write_table(&mut output);
                output.extend_from_slice(b"trailer\n");
                trailer.to_dict().write_to(&mut output);
                output.push(b'\n');
            }
            XRefForm::Stream => {
                let stream_id = ObjectId::new(xref.size(), 0);
                xref.set_in_use(stream_id.number, xref_offset as u64, 0);
                trailer.size = xref.size();
                let stream = xref.to_stream(&trailer.to_dict())?;
                write_indirect(&mut output, stream_id, &Object::Stream(stream));
            }
        }

        output.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());
        trace!("Cross-reference section at byte {}, file size {}", xref_offset, output.len());
        Ok(output)
    }

    /// Apply compression and encryption to a copy when either is needed
    fn prepare<'o>(&self, id: ObjectId, object: &'o Object, options: &SaveOptions) -> PDFResult<Cow<'o, Object>> {
        let mut object = Cow::Borrowed(object);

        if options.compress_streams {
            if let Object::Stream(stream) = object.as_ref() {
                if !stream.is_filtered() && !stream.content.is_empty() {
                    if let Some(stream) = object.to_mut().as_stream_mut() {
                        stream.compress()?;
                    }
                }
            }
        }

        if let Some(cipher) = self.cipher {
            if self.trailer.encrypt != Some(id) {
                cipher.encrypt_object(id, object.to_mut())?;
            }
        }
        Ok(object)
    }
}

fn write_indirect(output: &mut Vec<u8>, id: ObjectId, object: &Object) {
    output.extend_from_slice(format!("{} {} obj\n", id.number, id.generation).as_bytes());
    object.write_to(output);
    output.extend_from_slice(b"\nendobj\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseOptions;
    use crate::pdf::{Dictionary, PDFParser, Stream};
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn sample_store() -> (ObjectStore, Trailer) {
        let mut store = ObjectStore::new();
        let catalog = store.reserve();
        let pages = store.reserve();

        let mut page = Dictionary::with_type("Page");
        page.set("Parent", pages);
        page.set("MediaBox", Object::rectangle(0.0, 0.0, 612.0, 792.0));
        let content = store.add(Object::Stream(Stream::new(Dictionary::new(), b"0 0 m 100 100 l S".repeat(8))));
        page.set("Contents", content);
        let page = store.add(Object::Dictionary(page));

        let mut tree = Dictionary::with_type("Pages");
        tree.set("Kids", vec![Object::Reference(page)]);
        tree.set("Count", 1);
        store.insert(pages, Object::Dictionary(tree));

        let mut root = Dictionary::with_type("Catalog");
        root.set("Pages", pages);
        store.insert(catalog, Object::Dictionary(root));
        (store, Trailer::new(catalog))
    }

    #[test]
    fn test_table_output_reparses() -> PDFResult<()> {
        let (store, trailer) = sample_store();
        let bytes = PDFWriter::new(&store, &trailer, Version::new(1, 4)).write(&SaveOptions::default())?;

        assert!(bytes.starts_with(b"%PDF-1.4\n"));
        assert!(bytes.ends_with(b"%%EOF\n"));

        let parsed = PDFParser::new(&bytes, ParseOptions::default()).parse()?;
        assert_eq!(parsed.store.ids(), store.ids());
        assert_eq!(parsed.trailer.root, trailer.root);
        assert!(parsed.trailer.id.is_some());
        for (id, object) in store.iter() {
            assert_eq!(parsed.store.get(id), Some(object));
        }
        Ok(())
    }

    #[test]
    fn test_stream_output_reparses() -> PDFResult<()> {
        let (store, trailer) = sample_store();
        let bytes = PDFWriter::new(&store, &trailer, Version::new(1, 4))
            .write(&SaveOptions::default().with_xref_stream())?;

        assert!(bytes.starts_with(b"%PDF-1.5\n"));
        let parsed = PDFParser::new(&bytes, ParseOptions::default()).parse()?;
        // The XRef stream itself is not kept
        assert_eq!(parsed.store.ids(), store.ids());
        Ok(())
    }

    #[test]
    fn test_free_numbers_survive_save() -> PDFResult<()> {
        let (mut store, trailer) = sample_store();
        let scratch = store.add(Object::Integer(7));
        store.add(Object::Integer(8));
        store.remove(scratch);

        let bytes = PDFWriter::new(&store, &trailer, Version::default()).write(&SaveOptions::default())?;
        let mut parsed = PDFParser::new(&bytes, ParseOptions::default()).parse()?;
        let reused = parsed.store.add(Object::Null);
        assert_eq!(reused, ObjectId::new(scratch.number, 1));
        Ok(())
    }

    #[test]
    fn test_compress_streams() -> PDFResult<()> {
        let (store, trailer) = sample_store();
        let options = SaveOptions::default().with_compression(true);
        let bytes = PDFWriter::new(&store, &trailer, Version::default()).write(&options)?;

        let parsed = PDFParser::new(&bytes, ParseOptions::default()).parse()?;
        let content = parsed
            .store
            .iter()
            .find_map(|(_, object)| object.as_stream().cloned())
            .unwrap();
        assert_eq!(content.dict.get_name("Filter"), Some("FlateDecode"));
        assert_eq!(content.decoded_content()?, b"0 0 m 100 100 l S".repeat(8));
        Ok(())
    }
}
