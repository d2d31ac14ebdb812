//! PDF document parser implementation
//!
//! Parsing is eager: every object declared by the cross-reference chain is
//! read into the store, and object streams are expanded, before the parser
//! returns. Objects packed in object streams of an encrypted file stay
//! deferred until the document is decrypted, since the stream data is
//! ciphertext until then.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use log::{debug, trace, warn};

use crate::config::ParseOptions;
use crate::error::{PDFError, PDFResult};
use super::lexer::Lexer;
use super::xref::{XRefEntry, XRefSection, XRefTable};
use super::{Dictionary, Object, ObjectId, ObjectStore, Trailer};

const PDF_MAGIC: &[u8] = b"%PDF-";
const STARTXREF_MARKER: &[u8] = b"startxref";
const HEADER_SEARCH_WINDOW: usize = 1024;
const TRAILER_SEARCH_WINDOW: usize = 1024;

/// PDF version from the file header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new(1, 7)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = PDFError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| PDFError::malformed(format!("Invalid PDF version '{}'", s)))?;
        let parse = |part: &str| {
            part.parse::<u8>()
                .map_err(|_| PDFError::malformed(format!("Invalid PDF version '{}'", s)))
        };
        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

/// Location of an object that lives inside an object stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedLocation {
    pub stream: u32,
    pub index: u32,
}

/// Result of parsing a PDF byte sequence
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub version: Version,
    pub store: ObjectStore,
    pub trailer: Trailer,
    /// Compressed objects not yet expanded, keyed by object number
    pub deferred: BTreeMap<u32, CompressedLocation>,
}

/// PDF document parser
pub struct PDFParser<'a> {
    data: &'a [u8],
    options: ParseOptions,
    header_offset: usize,
}

impl<'a> PDFParser<'a> {
    /// Create new parser instance
    pub fn new(data: &'a [u8], options: ParseOptions) -> Self {
        Self {
            data,
            options,
            header_offset: 0,
        }
    }

    /// Parse PDF document structure
    pub fn parse(mut self) -> PDFResult<ParsedDocument> {
        debug!("Parsing PDF document ({} bytes)", self.data.len());

        let version = self.parse_header()?;
        let startxref = self.find_startxref()?;
        let (xref, trailer_dict) = self.read_xref_chain(startxref)?;
        trace!("Cross-reference chain declares {} entries", xref.len());

        let encrypted = trailer_dict.has("Encrypt");
        let mut store = ObjectStore::new();
        let mut compressed = BTreeMap::new();

        for (number, entry) in xref.entries() {
            match entry {
                XRefEntry::InUse { offset, generation } => {
                    let id = ObjectId::new(number, generation);
                    let object = self.read_object_at(&xref, offset, id)?;
                    if object.as_dict().map_or(false, |d| d.type_is("XRef")) {
                        // Rebuilt on save
                        continue;
                    }
                    store.insert(id, object);
                }
                XRefEntry::Free { generation, .. } => store.mark_free(number, generation),
                XRefEntry::Compressed { stream, index } => {
                    compressed.insert(number, CompressedLocation { stream, index });
                }
            }
        }

        let mut trailer_dict = trailer_dict;
        if let Some(Object::Dictionary(encrypt)) = trailer_dict.get("Encrypt") {
            let encrypt = encrypt.clone();
            let id = store.add(Object::Dictionary(encrypt));
            trailer_dict.set("Encrypt", id);
        }
        let mut trailer = Trailer::from_dict(&trailer_dict)?;

        let deferred = if encrypted {
            debug!("Deferring {} compressed objects until decryption", compressed.len());
            compressed
        } else {
            expand_object_streams(&mut store, &compressed, self.options.max_nesting)?;
            BTreeMap::new()
        };

        self.validate_references(&store, &xref, &deferred)?;

        if deferred.is_empty() && !store.contains(trailer.root) {
            return Err(PDFError::malformed(format!(
                "Document catalog {} not found",
                trailer.root
            )));
        }
        trailer.size = store.size();

        debug!("Parsed PDF {} with {} objects", version, store.len());
        Ok(ParsedDocument {
            version,
            store,
            trailer,
            deferred,
        })
    }

    /// Locate `%PDF-x.y` within the first kilobyte
    fn parse_header(&mut self) -> PDFResult<Version> {
        let window = &self.data[..self.data.len().min(HEADER_SEARCH_WINDOW)];
        let start = find_sequence(window, PDF_MAGIC)
            .ok_or_else(|| PDFError::malformed("Invalid PDF header"))?;
        self.header_offset = start;

        let version_bytes: Vec<u8> = self.data[start + PDF_MAGIC.len()..]
            .iter()
            .take_while(|b| b.is_ascii_digit() || **b == b'.')
            .copied()
            .collect();
        let version = std::str::from_utf8(&version_bytes)
            .map_err(|_| PDFError::malformed("Invalid PDF version"))?
            .parse()?;
        trace!("PDF header version {} at byte {}", version, start);
        Ok(version)
    }

    /// Find the last `startxref` offset within the final kilobyte
    fn find_startxref(&self) -> PDFResult<u64> {
        let window_start = self.data.len().saturating_sub(TRAILER_SEARCH_WINDOW);
        let window = &self.data[window_start..];
        let marker = find_sequence_backwards(window, STARTXREF_MARKER)
            .ok_or_else(|| PDFError::malformed("No startxref marker found"))?;

        let mut lexer = Lexer::at(self.data, window_start + marker + STARTXREF_MARKER.len());
        lexer
            .read_unsigned()
            .ok_or_else(|| PDFError::malformed("Invalid startxref offset"))
    }

    /// Follow `/Prev` (and hybrid `/XRefStm`) links from the newest section
    fn read_xref_chain(&self, start: u64) -> PDFResult<(XRefTable, Dictionary)> {
        let mut table = XRefTable::new();
        let mut newest_trailer: Option<Dictionary> = None;
        let mut visited = HashSet::new();
        let mut next = Some(start);

        while let Some(offset) = next {
            if !visited.insert(offset) {
                return Err(PDFError::malformed(format!(
                    "Cross-reference chain loops back to offset {}",
                    offset
                )));
            }

            let section = self.read_section_at(offset)?;
            table.merge_older(&section);

            if let Some(stm_offset) = section.trailer.get_integer("XRefStm") {
                trace!("Hybrid file, reading XRefStm at {}", stm_offset);
                let stream_section = self.read_section_at(offset_from(stm_offset)?)?;
                table.merge_older(&stream_section);
            }

            next = match section.trailer.get_integer("Prev") {
                Some(prev) => Some(offset_from(prev)?),
                None => None,
            };
            if newest_trailer.is_none() {
                newest_trailer = Some(section.trailer);
            }
        }

        let trailer = newest_trailer.ok_or_else(|| PDFError::malformed("No trailer found"))?;
        Ok((table, trailer))
    }

    fn read_section_at(&self, offset: u64) -> PDFResult<XRefSection> {
        let pos = self.checked_position(offset)?;
        let mut lexer = Lexer::at(self.data, pos).with_max_nesting(self.options.max_nesting);
        lexer.skip_whitespace();

        if lexer.peek_keyword("xref") {
            return XRefSection::parse_table(&mut lexer);
        }

        let (id, object) = lexer.read_indirect_object(&|_| None)?;
        match object {
            Object::Stream(stream) => XRefSection::from_stream(&stream),
            _ => Err(PDFError::malformed(format!(
                "Object {} at offset {} is not a cross-reference section",
                id, offset
            ))),
        }
    }

    fn checked_position(&self, offset: u64) -> PDFResult<usize> {
        usize::try_from(offset)
            .ok()
            .filter(|&pos| pos < self.data.len())
            .ok_or_else(|| PDFError::malformed(format!("Offset {} is past end of file", offset)))
    }

    /// Read the indirect object declared at `offset`
    fn read_object_at(&self, xref: &XRefTable, offset: u64, id: ObjectId) -> PDFResult<Object> {
        let resolve_length = |length_id: ObjectId| self.resolve_length(xref, length_id);

        let mut candidates = vec![offset];
        if self.header_offset > 0 {
            // Offsets measured from the header rather than the file start
            candidates.push(offset + self.header_offset as u64);
        }

        let mut last_error = None;
        for candidate in candidates {
            let pos = match self.checked_position(candidate) {
                Ok(pos) => pos,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };
            let mut lexer = Lexer::at(self.data, pos).with_max_nesting(self.options.max_nesting);
            match lexer.read_indirect_object(&resolve_length) {
                Ok((found, object)) if found.number == id.number => {
                    if found.generation != id.generation {
                        warn!("Object {} found with generation {}", id, found.generation);
                    }
                    return Ok(object);
                }
                Ok((found, _)) => {
                    last_error = Some(PDFError::malformed(format!(
                        "Expected object {} at offset {}, found {}",
                        id, candidate, found
                    )));
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| PDFError::malformed(format!("Object {} unreadable", id))))
    }

    /// Value of an indirect `/Length` object
    fn resolve_length(&self, xref: &XRefTable, id: ObjectId) -> Option<i64> {
        match xref.get(id.number)? {
            XRefEntry::InUse { offset, .. } => {
                let pos = self.checked_position(offset).ok()?;
                let mut lexer = Lexer::at(self.data, pos);
                let (_, object) = lexer.read_indirect_object(&|_| None).ok()?;
                object.as_integer()
            }
            _ => None,
        }
    }

    /// Every reference must name a live object or a declared entry
    fn validate_references(
        &self,
        store: &ObjectStore,
        xref: &XRefTable,
        deferred: &BTreeMap<u32, CompressedLocation>,
    ) -> PDFResult<()> {
        let mut undeclared = None;
        for (owner, object) in store.iter() {
            object.for_each_reference(&mut |id| {
                if store.contains(id) || deferred.contains_key(&id.number) {
                    return;
                }
                if xref.get(id.number).is_some() || store.id_for_number(id.number).is_some() {
                    trace!("Reference {} in {} resolves to null", id, owner);
                } else if undeclared.is_none() {
                    undeclared = Some((owner, id));
                }
            });
        }

        match undeclared {
            Some((owner, id)) if self.options.strict_references => Err(PDFError::malformed(format!(
                "Object {} references undeclared object {}",
                owner, id
            ))),
            Some((owner, id)) => {
                warn!("Object {} references undeclared object {}, reading as null", owner, id);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Unpack objects from their object streams into the store
///
/// Only entries the cross-reference data assigns to a given stream and
/// index are taken. Object stream containers are dropped afterwards.
pub(crate) fn expand_object_streams(
    store: &mut ObjectStore,
    compressed: &BTreeMap<u32, CompressedLocation>,
    max_nesting: usize,
) -> PDFResult<()> {
    let mut by_stream: BTreeMap<u32, Vec<(u32, u32)>> = BTreeMap::new();
    for (&number, location) in compressed {
        by_stream
            .entry(location.stream)
            .or_default()
            .push((number, location.index));
    }

    for (stream_number, members) in by_stream {
        let stream_id = store
            .id_for_number(stream_number)
            .ok_or_else(|| PDFError::malformed(format!("Object stream {} not found", stream_number)))?;
        let stream = store
            .get(stream_id)
            .and_then(Object::as_stream)
            .ok_or_else(|| PDFError::malformed(format!("Object {} is not an object stream", stream_id)))?;

        let count = stream
            .dict
            .get_integer("N")
            .filter(|&n| n >= 0)
            .ok_or_else(|| PDFError::malformed("Object stream has no /N"))? as usize;
        let first = stream
            .dict
            .get_integer("First")
            .filter(|&f| f >= 0)
            .ok_or_else(|| PDFError::malformed("Object stream has no /First"))? as usize;
        let data = stream.decoded_content()?;

        let mut header = Lexer::new(&data);
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            let number = header.read_unsigned();
            let offset = header.read_unsigned();
            match (number, offset) {
                (Some(n), Some(o)) => offsets.push((n as u32, o as usize)),
                _ => return Err(PDFError::malformed("Truncated object stream header")),
            }
        }

        let mut expanded = Vec::with_capacity(members.len());
        for (number, index) in members {
            let (declared, offset) = *offsets.get(index as usize).ok_or_else(|| {
                PDFError::malformed(format!("Object stream {} has no index {}", stream_number, index))
            })?;
            if declared != number {
                warn!(
                    "Object stream {} index {} holds object {}, expected {}",
                    stream_number, index, declared, number
                );
                continue;
            }
            let mut lexer = Lexer::at(&data, first + offset).with_max_nesting(max_nesting);
            expanded.push((ObjectId::new(number, 0), lexer.read_object()?));
        }

        for (id, object) in expanded {
            store.insert(id, object);
        }
        store.remove(stream_id);
        trace!("Expanded object stream {}", stream_id);
    }

    Ok(())
}

fn offset_from(value: i64) -> PDFResult<u64> {
    u64::try_from(value).map_err(|_| PDFError::malformed(format!("Invalid offset {}", value)))
}

/// Find byte sequence
fn find_sequence(data: &[u8], sequence: &[u8]) -> Option<usize> {
    data.windows(sequence.len()).position(|w| w == sequence)
}

/// Find byte sequence in reverse
fn find_sequence_backwards(data: &[u8], sequence: &[u8]) -> Option<usize> {
    data.windows(sequence.len()).rposition(|w| w == sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_log::test;

    /// Assemble a PDF from object bodies, computing xref offsets
    fn build_pdf(objects: &[&str], trailer_extra: &str) -> Vec<u8> {
        let mut output = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(output.len());
            output.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_offset = output.len();
        output.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            output.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        output.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                trailer_extra,
                xref_offset
            )
            .as_bytes(),
        );
        output
    }

    fn minimal_objects() -> Vec<&'static str> {
        vec![
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
        ]
    }

    #[test]
    fn test_pdf_parsing() -> PDFResult<()> {
        let data = build_pdf(&minimal_objects(), "");
        let parsed = PDFParser::new(&data, ParseOptions::default()).parse()?;

        assert_eq!(parsed.version, Version::new(1, 4));
        assert_eq!(parsed.store.len(), 3);
        assert_eq!(parsed.trailer.root, ObjectId::new(1, 0));
        assert_eq!(parsed.trailer.size, 4);
        assert!(parsed.deferred.is_empty());
        Ok(())
    }

    #[test]
    fn test_invalid_pdf() {
        let result = PDFParser::new(b"Not a PDF file", ParseOptions::default()).parse();
        assert!(matches!(result, Err(PDFError::MalformedDocument(_))));
    }

    #[test]
    fn test_missing_startxref() {
        let mut data = build_pdf(&minimal_objects(), "");
        let pos = find_sequence_backwards(&data, b"startxref").unwrap();
        data.truncate(pos);
        let result = PDFParser::new(&data, ParseOptions::default()).parse();
        assert!(matches!(result, Err(PDFError::MalformedDocument(_))));
    }

    #[test]
    fn test_prev_loop_detected() {
        let data = build_pdf(&minimal_objects(), "");
        let xref_offset = find_sequence_backwards(&data, b"xref\n0").unwrap();
        let looped = build_pdf(&minimal_objects(), &format!("/Prev {}", xref_offset));
        let result = PDFParser::new(&looped, ParseOptions::default()).parse();
        assert!(matches!(result, Err(PDFError::MalformedDocument(msg)) if msg.contains("loops")));
    }

    #[test]
    fn test_undeclared_reference_rejected() {
        let mut objects = minimal_objects();
        objects[2] = "<< /Type /Page /Parent 2 0 R /Contents 40 0 R >>";
        let data = build_pdf(&objects, "");

        let strict = PDFParser::new(&data, ParseOptions::default()).parse();
        assert!(matches!(strict, Err(PDFError::MalformedDocument(_))));

        let lenient = ParseOptions {
            strict_references: false,
            ..ParseOptions::default()
        };
        assert!(PDFParser::new(&data, lenient).parse().is_ok());
    }

    #[test]
    fn test_object_stream_expansion() -> PDFResult<()> {
        // Objects 2 and 3 live in object stream 4
        let packed = "2 0 3 42 << /Type /Pages /Kids [3 0 R] /Count 1 >> << /Type /Page /Parent 2 0 R >>";
        let first = packed.find("<<").unwrap();
        let stream_obj = format!(
            "<< /Type /ObjStm /N 2 /First {} /Length {} >>\nstream\n{}\nendstream",
            first,
            packed.len(),
            packed
        );

        let mut output = b"%PDF-1.5\n".to_vec();
        let catalog_offset = output.len();
        output.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        let stream_offset = output.len();
        output.extend_from_slice(format!("4 0 obj\n{}\nendobj\n", stream_obj).as_bytes());

        let mut rows = Vec::new();
        rows.extend_from_slice(&[0, 0, 0, 0xFF]);
        rows.extend_from_slice(&[1, 0, catalog_offset as u8, 0]);
        rows.extend_from_slice(&[2, 0, 4, 0]);
        rows.extend_from_slice(&[2, 0, 4, 1]);
        rows.extend_from_slice(&[1, 0, stream_offset as u8, 0]);
        let xref_offset = output.len();
        rows.extend_from_slice(&[1, (xref_offset >> 8) as u8, xref_offset as u8, 0]);
        output.extend_from_slice(
            format!(
                "5 0 obj\n<< /Type /XRef /Size 6 /W [1 2 1] /Root 1 0 R /Length {} >>\nstream\n",
                rows.len()
            )
            .as_bytes(),
        );
        output.extend_from_slice(&rows);
        output.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());

        let parsed = PDFParser::new(&output, ParseOptions::default()).parse()?;
        let pages = parsed.store.get(ObjectId::new(2, 0)).and_then(Object::as_dict).unwrap();
        assert!(pages.type_is("Pages"));
        assert!(parsed.store.get(ObjectId::new(3, 0)).is_some());
        // Containers are structural and rebuilt on save
        assert!(parsed.store.id_for_number(4).is_none());
        assert!(parsed.store.id_for_number(5).is_none());
        Ok(())
    }

    #[test]
    fn test_version_parsing() -> PDFResult<()> {
        assert_eq!("1.7".parse::<Version>()?, Version::new(1, 7));
        assert!(Version::new(2, 0) > Version::new(1, 7));
        assert!("17".parse::<Version>().is_err());
        Ok(())
    }
}
