//! PDF cross-reference table implementation
//!
//! Reads classic `xref` tables and XRef streams, and writes either form for
//! a full save.

use std::collections::BTreeMap;
use byteorder::{BigEndian, ByteOrder};
use log::{trace, warn};

use crate::error::{PDFError, PDFResult};
use super::lexer::Lexer;
use super::store::MAX_GENERATION;
use super::{Dictionary, Object, Stream};

/// One cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free entry linking to the next free number
    Free { next: u32, generation: u16 },
    /// Uncompressed object at a byte offset
    InUse { offset: u64, generation: u16 },
    /// Object stored at `index` inside object stream `stream`
    Compressed { stream: u32, index: u32 },
}

/// One cross-reference section with its trailer dictionary
#[derive(Debug, Clone, Default)]
pub struct XRefSection {
    pub entries: BTreeMap<u32, XRefEntry>,
    pub trailer: Dictionary,
}

impl XRefSection {
    /// Parse a classic table; the lexer sits just before `xref`
    pub fn parse_table(lexer: &mut Lexer<'_>) -> PDFResult<Self> {
        lexer.expect_keyword("xref")?;
        let mut entries = BTreeMap::new();

        while !lexer.peek_keyword("trailer") {
            let start = lexer
                .read_unsigned()
                .ok_or_else(|| PDFError::malformed("Invalid xref subsection header"))?;
            let count = lexer
                .read_unsigned()
                .ok_or_else(|| PDFError::malformed("Invalid xref subsection header"))?;
            trace!("Xref subsection {} +{}", start, count);

            for i in 0..count {
                let field1 = lexer
                    .read_unsigned()
                    .ok_or_else(|| PDFError::malformed("Invalid xref entry offset"))?;
                let field2 = lexer
                    .read_unsigned()
                    .ok_or_else(|| PDFError::malformed("Invalid xref entry generation"))?;
                let generation = u16::try_from(field2)
                    .map_err(|_| PDFError::malformed("Xref generation out of range"))?;
                let number = u32::try_from(start + i)
                    .map_err(|_| PDFError::malformed("Xref object number out of range"))?;

                let entry = match lexer.read_keyword() {
                    b"n" => XRefEntry::InUse {
                        offset: field1,
                        generation,
                    },
                    b"f" => XRefEntry::Free {
                        next: u32::try_from(field1).unwrap_or(0),
                        generation,
                    },
                    other => {
                        return Err(PDFError::malformed(format!(
                            "Invalid xref entry type '{}'",
                            String::from_utf8_lossy(other)
                        )))
                    }
                };
                entries.insert(number, entry);
            }
        }

        lexer.expect_keyword("trailer")?;
        let trailer = match lexer.read_object()? {
            Object::Dictionary(dict) => dict,
            other => {
                return Err(PDFError::malformed(format!(
                    "Trailer is a {}",
                    other.type_name()
                )))
            }
        };

        Ok(Self { entries, trailer })
    }

    /// Parse the entries of an XRef stream; its dictionary is the trailer
    pub fn from_stream(stream: &Stream) -> PDFResult<Self> {
        let dict = &stream.dict;
        if dict.get_name("Type").map_or(false, |t| t != "XRef") {
            return Err(PDFError::malformed("Cross-reference stream is not /Type /XRef"));
        }

        let widths: Vec<usize> = dict
            .get_array("W")
            .ok_or_else(|| PDFError::malformed("XRef stream has no /W array"))?
            .iter()
            .map(|w| w.as_integer().filter(|&w| (0..=8).contains(&w)).map(|w| w as usize))
            .collect::<Option<_>>()
            .ok_or_else(|| PDFError::malformed("Invalid /W entry in XRef stream"))?;
        let [w1, w2, w3] = <[usize; 3]>::try_from(widths)
            .map_err(|_| PDFError::malformed("/W array must have three entries"))?;
        let row_len = w1 + w2 + w3;
        if row_len == 0 {
            return Err(PDFError::malformed("XRef stream rows are empty"));
        }

        let size = dict.get_integer("Size").unwrap_or(0).max(0) as u64;
        let ranges: Vec<(u64, u64)> = match dict.get_array("Index") {
            Some(index) => index
                .chunks(2)
                .map(|pair| match pair {
                    [start, count] => Some((
                        start.as_integer()?.max(0) as u64,
                        count.as_integer()?.max(0) as u64,
                    )),
                    _ => None,
                })
                .collect::<Option<_>>()
                .ok_or_else(|| PDFError::malformed("Invalid /Index array in XRef stream"))?,
            None => vec![(0, size)],
        };

        let data = stream.decoded_content()?;
        let mut rows = data.chunks_exact(row_len);
        let mut entries = BTreeMap::new();

        for (start, count) in ranges {
            for number in start..start + count {
                let row = rows
                    .next()
                    .ok_or_else(|| PDFError::malformed("Truncated XRef stream data"))?;
                let entry_type = if w1 == 0 { 1 } else { read_field(&row[..w1]) };
                let field2 = read_field(&row[w1..w1 + w2]);
                let field3 = read_field(&row[w1 + w2..]);
                let number = u32::try_from(number)
                    .map_err(|_| PDFError::malformed("Xref object number out of range"))?;

                let entry = match entry_type {
                    0 => XRefEntry::Free {
                        next: field2 as u32,
                        generation: field3.min(u64::from(MAX_GENERATION)) as u16,
                    },
                    1 => XRefEntry::InUse {
                        offset: field2,
                        generation: field3.min(u64::from(MAX_GENERATION)) as u16,
                    },
                    2 => XRefEntry::Compressed {
                        stream: field2 as u32,
                        index: field3 as u32,
                    },
                    other => {
                        // Unknown types are references to the null object
                        warn!("Ignoring xref entry type {} for object {}", other, number);
                        continue;
                    }
                };
                entries.insert(number, entry);
            }
        }

        Ok(Self {
            entries,
            trailer: dict.clone(),
        })
    }
}

fn read_field(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        0
    } else {
        BigEndian::read_uint(bytes, bytes.len())
    }
}

/// Merged view over a chain of sections, newest entries winning
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: BTreeMap<u32, XRefEntry>,
}

impl XRefTable {
    /// Create new xref table
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an older section; entries already present are kept
    pub fn merge_older(&mut self, section: &XRefSection) {
        for (&number, &entry) in &section.entries {
            self.entries.entry(number).or_insert(entry);
        }
    }

    pub fn get(&self, number: u32) -> Option<XRefEntry> {
        self.entries.get(&number).copied()
    }

    /// Get xref table entries in ascending object number order
    pub fn entries(&self) -> impl Iterator<Item = (u32, XRefEntry)> + '_ {
        self.entries.iter().map(|(&n, &e)| (n, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cross-reference data for a full save, indexed by object number
#[derive(Debug, Clone)]
pub struct XRefWriter {
    entries: Vec<XRefEntry>,
}

impl XRefWriter {
    /// Start with every number in `0..size` free
    pub fn new(size: u32) -> Self {
        Self {
            entries: vec![
                XRefEntry::Free {
                    next: 0,
                    generation: 0,
                };
                size.max(1) as usize
            ],
        }
    }

    pub fn size(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn set_in_use(&mut self, number: u32, offset: u64, generation: u16) {
        self.ensure(number);
        self.entries[number as usize] = XRefEntry::InUse { offset, generation };
    }

    /// Record the generation a freed number will carry when reused
    pub fn set_free_generation(&mut self, number: u32, generation: u16) {
        self.ensure(number);
        if let XRefEntry::Free { .. } = self.entries[number as usize] {
            self.entries[number as usize] = XRefEntry::Free { next: 0, generation };
        }
    }

    fn ensure(&mut self, number: u32) {
        let needed = number as usize + 1;
        if self.entries.len() < needed {
            self.entries.resize(
                needed,
                XRefEntry::Free {
                    next: 0,
                    generation: 0,
                },
            );
        }
    }

    /// Link free entries into a list headed by entry 0 and ending at 0
    fn linked(&self) -> Vec<XRefEntry> {
        let mut entries = self.entries.clone();
        let free_numbers: Vec<u32> = (1..entries.len() as u32)
            .filter(|&n| matches!(entries[n as usize], XRefEntry::Free { .. }))
            .collect();

        entries[0] = XRefEntry::Free {
            next: free_numbers.first().copied().unwrap_or(0),
            generation: MAX_GENERATION,
        };
        for (i, &number) in free_numbers.iter().enumerate() {
            if let XRefEntry::Free { generation, .. } = entries[number as usize] {
                entries[number as usize] = XRefEntry::Free {
                    next: free_numbers.get(i + 1).copied().unwrap_or(0),
                    generation,
                };
            }
        }
        entries
    }

    /// Write a classic `xref` section with a single subsection
    pub fn write_table(&self, output: &mut Vec<u8>) {
        let entries = self.linked();
        output.extend_from_slice(format!("xref\n0 {}\n", entries.len()).as_bytes());
        for entry in entries {
            let line = match entry {
                XRefEntry::Free { next, generation } => format!("{:010} {:05} f\r\n", next, generation),
                XRefEntry::InUse { offset, generation } => format!("{:010} {:05} n\r\n", offset, generation),
                // Never produced by a full save
                XRefEntry::Compressed { .. } => format!("{:010} {:05} f\r\n", 0, 0),
            };
            output.extend_from_slice(line.as_bytes());
        }
    }

    /// Build an XRef stream whose dictionary also carries `trailer`
    pub fn to_stream(&self, trailer: &Dictionary) -> PDFResult<Stream> {
        let entries = self.linked();
        let max_field2 = entries
            .iter()
            .map(|entry| match *entry {
                XRefEntry::Free { next, .. } => u64::from(next),
                XRefEntry::InUse { offset, .. } => offset,
                XRefEntry::Compressed { stream, .. } => u64::from(stream),
            })
            .max()
            .unwrap_or(0);
        let w2 = byte_width(max_field2);
        let w3 = 2;

        let mut data = vec![0u8; entries.len() * (1 + w2 + w3)];
        for (row, entry) in data.chunks_exact_mut(1 + w2 + w3).zip(&entries) {
            let (kind, field2, field3) = match *entry {
                XRefEntry::Free { next, generation } => (0u8, u64::from(next), u64::from(generation)),
                XRefEntry::InUse { offset, generation } => (1, offset, u64::from(generation)),
                XRefEntry::Compressed { stream, index } => (2, u64::from(stream), u64::from(index)),
            };
            row[0] = kind;
            BigEndian::write_uint(&mut row[1..1 + w2], field2, w2);
            BigEndian::write_uint(&mut row[1 + w2..], field3.min(0xFFFF), w3);
        }

        let mut dict = trailer.clone();
        dict.set("Type", Object::name("XRef"));
        dict.set("Size", entries.len());
        dict.set(
            "W",
            vec![Object::Integer(1), Object::from(w2), Object::from(w3)],
        );
        dict.set("Filter", Object::name("FlateDecode"));
        let compressed = super::Filter::FlateDecode.encode(&data)?;
        Ok(Stream::new(dict, compressed))
    }
}

fn byte_width(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    ((bits + 7) / 8).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_log::test;

    #[test]
    fn test_xref_parsing() -> PDFResult<()> {
        let xref_data = b"xref\n0 3\n\
                          0000000000 65535 f \n\
                          0000000012 00000 n \n\
                          0000000234 00002 n \n\
                          trailer\n<< /Size 3 /Root 1 0 R >>\n";

        let section = XRefSection::parse_table(&mut Lexer::new(xref_data))?;
        assert_eq!(section.entries.len(), 3);
        assert_eq!(
            section.entries.get(&2),
            Some(&XRefEntry::InUse {
                offset: 234,
                generation: 2
            })
        );
        assert_eq!(section.trailer.get_integer("Size"), Some(3));
        Ok(())
    }

    #[test]
    fn test_multiple_subsections() -> PDFResult<()> {
        let xref_data = b"xref\n0 1\n0000000000 65535 f\r\n5 2\n0000000100 00000 n\r\n0000000200 00000 n\r\ntrailer <<>>";
        let section = XRefSection::parse_table(&mut Lexer::new(xref_data))?;
        assert_eq!(section.entries.keys().copied().collect::<Vec<_>>(), vec![0, 5, 6]);
        Ok(())
    }

    #[test]
    fn test_invalid_xref() {
        let invalid_data = b"xref\n0 2\ninvalid entry\n0000000234 00000 n \ntrailer <<>>";
        assert!(XRefSection::parse_table(&mut Lexer::new(invalid_data)).is_err());
    }

    #[test]
    fn test_newer_entries_win() {
        let mut newer = XRefSection::default();
        newer.entries.insert(1, XRefEntry::InUse { offset: 500, generation: 0 });
        let mut older = XRefSection::default();
        older.entries.insert(1, XRefEntry::InUse { offset: 10, generation: 0 });
        older.entries.insert(2, XRefEntry::InUse { offset: 20, generation: 0 });

        let mut table = XRefTable::new();
        table.merge_older(&newer);
        table.merge_older(&older);
        assert_eq!(table.get(1), Some(XRefEntry::InUse { offset: 500, generation: 0 }));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_free_list_linking() {
        let mut writer = XRefWriter::new(5);
        writer.set_in_use(1, 15, 0);
        writer.set_in_use(3, 90, 0);
        writer.set_free_generation(2, 1);

        let mut output = Vec::new();
        writer.write_table(&mut output);
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[1], "0 5");
        assert_eq!(lines[2], "0000000002 65535 f");
        assert_eq!(lines[3], "0000000015 00000 n");
        assert_eq!(lines[4], "0000000004 00001 f");
        assert_eq!(lines[6], "0000000000 00000 f");
    }

    #[test]
    fn test_stream_round_trip() -> PDFResult<()> {
        let mut writer = XRefWriter::new(4);
        writer.set_in_use(1, 15, 0);
        writer.set_in_use(2, 70_000, 0);
        writer.set_in_use(3, 90, 0);

        let mut trailer = Dictionary::new();
        trailer.set("Root", crate::pdf::ObjectId::new(1, 0));
        let stream = writer.to_stream(&trailer)?;
        assert_eq!(
            stream.dict.get_array("W").cloned(),
            Some(vec![Object::Integer(1), Object::Integer(3), Object::Integer(2)])
        );

        let section = XRefSection::from_stream(&stream)?;
        assert_eq!(
            section.entries.get(&2),
            Some(&XRefEntry::InUse { offset: 70_000, generation: 0 })
        );
        assert_eq!(section.trailer.get_reference("Root").map(|id| id.number), Some(1));
        Ok(())
    }
}
