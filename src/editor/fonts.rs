//! Standard 14 fonts and WinAnsi text encoding

use std::fmt;
use std::str::FromStr;
use log::debug;

use crate::error::PDFError;
use crate::pdf::{Dictionary, Object};

/// The fourteen fonts every PDF reader provides without embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StandardFont {
    #[default]
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
    Symbol,
    ZapfDingbats,
}

impl StandardFont {
    const ALL: [StandardFont; 14] = [
        StandardFont::Helvetica,
        StandardFont::HelveticaBold,
        StandardFont::HelveticaOblique,
        StandardFont::HelveticaBoldOblique,
        StandardFont::TimesRoman,
        StandardFont::TimesBold,
        StandardFont::TimesItalic,
        StandardFont::TimesBoldItalic,
        StandardFont::Courier,
        StandardFont::CourierBold,
        StandardFont::CourierOblique,
        StandardFont::CourierBoldOblique,
        StandardFont::Symbol,
        StandardFont::ZapfDingbats,
    ];

    /// PostScript name used for `/BaseFont`
    pub fn base_font(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::TimesItalic => "Times-Italic",
            StandardFont::TimesBoldItalic => "Times-BoldItalic",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
            StandardFont::CourierOblique => "Courier-Oblique",
            StandardFont::CourierBoldOblique => "Courier-BoldOblique",
            StandardFont::Symbol => "Symbol",
            StandardFont::ZapfDingbats => "ZapfDingbats",
        }
    }

    /// Symbol and ZapfDingbats carry their own built-in encodings
    pub fn is_symbolic(&self) -> bool {
        matches!(self, StandardFont::Symbol | StandardFont::ZapfDingbats)
    }

    /// Font dictionary referencing this font without embedding
    pub(crate) fn to_dict(&self) -> Dictionary {
        let mut dict = Dictionary::with_type("Font");
        dict.set("Subtype", Object::name("Type1"));
        dict.set("BaseFont", Object::name(self.base_font()));
        if !self.is_symbolic() {
            dict.set("Encoding", Object::name("WinAnsiEncoding"));
        }
        dict
    }

    /// Encode text for a simple font of this family
    pub(crate) fn encode(&self, text: &str) -> Vec<u8> {
        if self.is_symbolic() {
            return text
                .chars()
                .map(|c| u8::try_from(c).ok().filter(u8::is_ascii).unwrap_or(b'?'))
                .collect();
        }
        encode_win_ansi(text)
    }
}

impl fmt::Display for StandardFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_font())
    }
}

/// Reduce a family name to lowercase letters for lenient matching, so
/// `Times New Roman`, `times-roman` and `TimesRoman` compare equal
fn normalize(family: &str) -> String {
    family
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl FromStr for StandardFont {
    type Err = PDFError;

    fn from_str(family: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(family);
        if let Some(font) = Self::ALL.iter().find(|font| normalize(font.base_font()) == wanted) {
            return Ok(*font);
        }
        let alias = match wanted.as_str() {
            "arial" | "sansserif" | "helv" => Some(StandardFont::Helvetica),
            "arialbold" => Some(StandardFont::HelveticaBold),
            "times" | "timesnewroman" | "serif" => Some(StandardFont::TimesRoman),
            "timesnewromanbold" => Some(StandardFont::TimesBold),
            "couriernew" | "monospace" => Some(StandardFont::Courier),
            "zapf" | "dingbats" => Some(StandardFont::ZapfDingbats),
            _ => None,
        };
        alias.ok_or_else(|| PDFError::UnsupportedFontEmbed(format!("no standard font for family {:?}", family)))
    }
}

/// Resolve a family name to a standard font
///
/// `None` when no standard font matches; callers fall back to Helvetica.
pub fn try_embed_font(family: &str) -> Option<StandardFont> {
    match family.parse() {
        Ok(font) => Some(font),
        Err(e) => {
            debug!("{}", e);
            None
        }
    }
}

fn win_ansi_byte(c: char) -> Option<u8> {
    let code = u32::from(c);
    if code < 0x80 || (0xA0..=0xFF).contains(&code) {
        return u8::try_from(code).ok();
    }
    match code {
        0x20AC => Some(0x80),
        0x201A => Some(0x82),
        0x0192 => Some(0x83),
        0x201E => Some(0x84),
        0x2026 => Some(0x85),
        0x2020 => Some(0x86),
        0x2021 => Some(0x87),
        0x02C6 => Some(0x88),
        0x2030 => Some(0x89),
        0x0160 => Some(0x8A),
        0x2039 => Some(0x8B),
        0x0152 => Some(0x8C),
        0x017D => Some(0x8E),
        0x2018 => Some(0x91),
        0x2019 => Some(0x92),
        0x201C => Some(0x93),
        0x201D => Some(0x94),
        0x2022 => Some(0x95),
        0x2013 => Some(0x96),
        0x2014 => Some(0x97),
        0x02DC => Some(0x98),
        0x2122 => Some(0x99),
        0x0161 => Some(0x9A),
        0x203A => Some(0x9B),
        0x0153 => Some(0x9C),
        0x017E => Some(0x9E),
        0x0178 => Some(0x9F),
        _ => None,
    }
}

/// Encode text as WinAnsi; characters outside the code page become `?`
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(|c| win_ansi_byte(c).unwrap_or(b'?')).collect()
}
