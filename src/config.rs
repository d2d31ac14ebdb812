//! Options for parsing and saving documents

use crate::pdf::{Version, DEFAULT_MAX_NESTING};

/// Form of the cross-reference section written on save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XRefForm {
    /// Classic `xref` table followed by a `trailer` dictionary
    #[default]
    Table,
    /// Compressed `/Type /XRef` stream (PDF 1.5)
    Stream,
}

impl XRefForm {
    /// Lowest file version that can carry this form
    pub fn minimum_version(&self) -> Version {
        match self {
            XRefForm::Table => Version::new(1, 0),
            XRefForm::Stream => Version::new(1, 5),
        }
    }
}

/// Options for `PDFWriter`
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub xref_form: XRefForm,
    /// Flate-encode streams that carry no filter
    pub compress_streams: bool,
}

impl SaveOptions {
    pub fn with_xref_stream(mut self) -> Self {
        self.xref_form = XRefForm::Stream;
        self
    }

    pub fn with_compression(mut self, compress_streams: bool) -> Self {
        self.compress_streams = compress_streams;
        self
    }
}

/// Options for `PDFParser`
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Reject references to object numbers the file never declares
    pub strict_references: bool,
    /// Deepest array/dictionary nesting accepted
    pub max_nesting: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_references: true,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

impl ParseOptions {
    /// Read references to undeclared objects as null instead of failing
    pub fn lenient() -> Self {
        Self {
            strict_references: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let save = SaveOptions::default();
        assert_eq!(save.xref_form, XRefForm::Table);
        assert!(!save.compress_streams);

        let parse = ParseOptions::default();
        assert!(parse.strict_references);
        assert_eq!(parse.max_nesting, 256);
        assert!(!ParseOptions::lenient().strict_references);
    }

    #[test]
    fn test_xref_stream_needs_1_5() {
        assert_eq!(SaveOptions::default().with_xref_stream().xref_form.minimum_version(), Version::new(1, 5));
    }
}
