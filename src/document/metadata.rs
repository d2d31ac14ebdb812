//! Document information dictionary
//!
//! Text strings are stored as PDFDocEncoding when every character fits and
//! as UTF-16BE with a byte order mark otherwise. Dates use the
//! `D:YYYYMMDDHHmmSSOHH'mm'` form.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone};
use log::warn;

use crate::pdf::{Dictionary, Object};

const UTF16_BOM: [u8; 2] = [0xFE, 0xFF];

/// Characters PDFDocEncoding places at 0x80..=0x9E
const PDFDOC_HIGH: [char; 31] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}',
];

/// Document information fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<DateTime<FixedOffset>>,
    pub modification_date: Option<DateTime<FixedOffset>>,
}

impl Metadata {
    /// Read the fields of an information dictionary; absent or
    /// unreadable entries are `None`
    pub(crate) fn from_info(info: &Dictionary) -> Self {
        let text = |key: &str| info.get_string(key).map(decode_text_string);
        let date = |key: &str| {
            info.get_string(key).and_then(|raw| {
                let parsed = parse_date(raw);
                if parsed.is_none() {
                    warn!("Ignoring unparseable /{} date", key);
                }
                parsed
            })
        };

        Self {
            title: text("Title"),
            author: text("Author"),
            subject: text("Subject"),
            keywords: text("Keywords"),
            creator: text("Creator"),
            producer: text("Producer"),
            creation_date: date("CreationDate"),
            modification_date: date("ModDate"),
        }
    }

    /// Write the present, non-empty fields into `info`, leaving the
    /// other entries untouched
    pub(crate) fn apply_to(&self, info: &mut Dictionary) {
        let fields = [
            ("Title", &self.title),
            ("Author", &self.author),
            ("Subject", &self.subject),
            ("Keywords", &self.keywords),
            ("Creator", &self.creator),
            ("Producer", &self.producer),
        ];
        for (key, value) in fields {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                info.set(key, Object::String(encode_text_string(value)));
            }
        }
        if let Some(date) = &self.creation_date {
            info.set("CreationDate", Object::string(format_date(date)));
        }
        if let Some(date) = &self.modification_date {
            info.set("ModDate", Object::string(format_date(date)));
        }
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn pdfdoc_decode(code: u8) -> char {
    match code {
        0x80..=0x9E => PDFDOC_HIGH[usize::from(code - 0x80)],
        0x9F => '\u{FFFD}',
        _ => char::from(code),
    }
}

fn pdfdoc_encode(c: char) -> Option<u8> {
    match u32::from(c) {
        code @ (0x00..=0x7F | 0xA0..=0xFF) => u8::try_from(code).ok(),
        _ => PDFDOC_HIGH
            .iter()
            .position(|&high| high == c)
            .and_then(|i| u8::try_from(0x80 + i).ok()),
    }
}

/// Decode a PDF text string (UTF-16BE with byte order mark, or
/// PDFDocEncoding)
pub fn decode_text_string(bytes: &[u8]) -> String {
    match bytes.strip_prefix(&UTF16_BOM) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => bytes.iter().copied().map(pdfdoc_decode).collect(),
    }
}

/// Encode text as PDFDocEncoding when possible, UTF-16BE otherwise
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if let Some(bytes) = text.chars().map(pdfdoc_encode).collect::<Option<Vec<u8>>>() {
        return bytes;
    }
    let mut bytes = UTF16_BOM.to_vec();
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

/// Format a date as `D:YYYYMMDDHHmmSS` followed by the UTC offset
pub fn format_date(date: &DateTime<FixedOffset>) -> String {
    let offset = date.offset().fix().local_minus_utc();
    let zone = if offset == 0 {
        "Z".to_string()
    } else {
        let sign = if offset < 0 { '-' } else { '+' };
        let minutes = offset.abs() / 60;
        format!("{}{:02}'{:02}'", sign, minutes / 60, minutes % 60)
    };
    format!("D:{}{}", date.format("%Y%m%d%H%M%S"), zone)
}

/// Parse a PDF date string
///
/// Every field after the year is optional; missing fields take their
/// lowest value and a missing offset is read as UTC.
pub fn parse_date(raw: &[u8]) -> Option<DateTime<FixedOffset>> {
    let text = std::str::from_utf8(raw).ok()?.trim();
    let text = text.strip_prefix("D:").unwrap_or(text);
    let bytes = text.as_bytes();

    let mut pos = 0;
    let mut field = |width: usize, default: u32| -> Option<u32> {
        let digits = bytes.get(pos..pos + width).filter(|d| d.iter().all(u8::is_ascii_digit));
        match digits {
            Some(digits) => {
                pos += width;
                std::str::from_utf8(digits).ok()?.parse().ok()
            }
            None => Some(default),
        }
    };

    let year = field(4, u32::MAX)?;
    if year == u32::MAX {
        return None;
    }
    let month = field(2, 1)?;
    let day = field(2, 1)?;
    let hour = field(2, 0)?;
    let minute = field(2, 0)?;
    let second = field(2, 0)?;

    let offset_seconds = match bytes.get(pos) {
        Some(sign @ (b'+' | b'-')) => {
            let rest: Vec<u8> = bytes[pos + 1..].iter().copied().filter(u8::is_ascii_digit).collect();
            let number = |range: std::ops::Range<usize>| -> i32 {
                rest.get(range)
                    .and_then(|d| std::str::from_utf8(d).ok())
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(0)
            };
            let seconds = number(0..2) * 3600 + number(2..4) * 60;
            if *sign == b'-' { -seconds } else { seconds }
        }
        _ => 0,
    };

    let naive = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)?
        .and_hms_opt(hour, minute, second)?;
    FixedOffset::east_opt(offset_seconds)?
        .from_local_datetime(&naive)
        .single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test_log::test]
    fn test_pdfdoc_text_string() {
        let encoded = encode_text_string("Quarterly \u{2014} Caf\u{e9}");
        assert_eq!(encoded[10], 0x84);
        assert_eq!(decode_text_string(&encoded), "Quarterly \u{2014} Caf\u{e9}");
    }

    #[test_log::test]
    fn test_utf16_text_string() {
        let encoded = encode_text_string("\u{65e5}\u{672c}");
        assert_eq!(encoded, vec![0xFE, 0xFF, 0x65, 0xE5, 0x67, 0x2C]);
        assert_eq!(decode_text_string(&encoded), "\u{65e5}\u{672c}");
    }

    #[rstest]
    #[case(b"D:20231015143000+05'30'", 2023, 14, 5 * 3600 + 30 * 60)]
    #[case(b"D:20231015143000Z", 2023, 14, 0)]
    #[case(b"D:2023", 2023, 0, 0)]
    #[case(b"19991231235959-08'00", 1999, 23, -8 * 3600)]
    fn test_parse_date(#[case] raw: &[u8], #[case] year: i32, #[case] hour: u32, #[case] offset: i32) {
        let date = parse_date(raw).expect("date should parse");
        assert_eq!(chrono::Datelike::year(&date), year);
        assert_eq!(date.hour(), hour);
        assert_eq!(date.offset().local_minus_utc(), offset);
    }

    #[test_log::test]
    fn test_bad_dates() {
        assert!(parse_date(b"D:").is_none());
        assert!(parse_date(b"D:20231399").is_none());
        assert!(parse_date(b"yesterday").is_none());
    }

    #[test_log::test]
    fn test_date_format() {
        let date = parse_date(b"D:20240229080910-03'30'").expect("date should parse");
        assert_eq!(format_date(&date), "D:20240229080910-03'30'");
        assert_eq!(parse_date(format_date(&date).as_bytes()), Some(date));
    }

    #[test_log::test]
    fn test_apply_skips_empty_fields() {
        let mut info = Dictionary::new();
        info.set("Title", Object::string("Old"));
        let metadata = Metadata {
            title: Some(String::new()),
            author: Some("Ops".to_string()),
            ..Metadata::default()
        };
        metadata.apply_to(&mut info);

        let read = Metadata::from_info(&info);
        assert_eq!(read.title.as_deref(), Some("Old"));
        assert_eq!(read.author.as_deref(), Some("Ops"));
        assert_eq!(read.subject, None);
    }
}
