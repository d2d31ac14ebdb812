//! Error types for the PDF editing core

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for PDF document operations
#[derive(Error, Debug)]
pub enum PDFError {
    /// Unparseable structure: broken xref chain, invalid object syntax,
    /// stream length mismatch, unsupported structural filter
    #[error("Malformed PDF document: {0}")]
    MalformedDocument(String),

    /// Page or object index outside valid bounds
    #[error("Index {index} out of range (document has {len} pages)")]
    IndexOutOfRange {
        index: usize,
        len: usize,
    },

    /// Image format other than JPEG/PNG, or image bytes that do not decode
    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    /// Font family that cannot be embedded; recovered by falling back
    #[error("Font cannot be embedded: {0}")]
    UnsupportedFontEmbed(String),

    /// Neither the user nor the owner password validates
    #[error("Invalid password")]
    InvalidPassword,

    /// One of the merge inputs failed to parse
    #[error("Merge failed on input {index}: {source}")]
    MergeError {
        index: usize,
        #[source]
        source: Box<PDFError>,
    },

    /// Underlying read or write failure
    #[error("IO failure on {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stream filter that cannot be decoded
    #[error("Unsupported stream filter: {0}")]
    UnsupportedFilter(String),

    /// Unsupported security handler revision
    #[error("Unsupported revision: {0}")]
    UnsupportedRevision(u32),

    /// Unsupported security handler or crypt filter
    #[error("Unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    /// Invalid key length
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(usize),

    /// Invalid data length
    #[error("Invalid data length for {operation}")]
    InvalidDataLength {
        operation: String,
    },

    /// Compression error
    #[error("Compression error: {0}")]
    CompressionError(String),

    /// Mutation attempted before the document was decrypted
    #[error("Document is encrypted; decrypt it before editing")]
    DocumentLocked,
}

/// Result type for PDF document operations
pub type PDFResult<T> = Result<T, PDFError>;

impl PDFError {
    /// Create a new malformed document error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDocument(msg.into())
    }

    /// Create a new invalid data length error
    pub fn invalid_length(operation: impl Into<String>) -> Self {
        Self::InvalidDataLength {
            operation: operation.into(),
        }
    }

    /// Attach a path to an IO error
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::IoFailure {
            path: path.into(),
            source,
        }
    }

    /// Wrap the failure of merge input `index`
    pub fn merge(index: usize, source: PDFError) -> Self {
        Self::MergeError {
            index,
            source: Box::new(source),
        }
    }

    /// Check if error is authentication related
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::InvalidPassword | Self::DocumentLocked)
    }

    /// Check if error is cryptographic
    pub fn is_crypto_error(&self) -> bool {
        matches!(self,
            Self::UnsupportedRevision(_) |
            Self::UnsupportedEncryption(_) |
            Self::InvalidKeyLength(_) |
            Self::InvalidDataLength { .. }
        )
    }

    /// Check if error is related to PDF structure
    pub fn is_structure_error(&self) -> bool {
        match self {
            Self::MalformedDocument(_) | Self::UnsupportedFilter(_) => true,
            Self::MergeError { source, .. } => source.is_structure_error(),
            _ => false,
        }
    }
}

impl From<aes::cipher::InvalidLength> for PDFError {
    fn from(err: aes::cipher::InvalidLength) -> Self {
        Self::InvalidDataLength {
            operation: format!("cipher setup ({})", err),
        }
    }
}
