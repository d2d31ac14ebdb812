//! PDF editing core for Rust
//!
//! Parses PDF files into an object store, exposes the page tree and
//! document information, applies structural edits (pages, merge, split,
//! text and image content, metadata), handles the standard security
//! handler (RC4 and AES, revisions 2 to 6) and writes complete files back
//! out with a classic cross-reference table or an XRef stream.
//!
//! ```no_run
//! use pdf_editor_core::{editor, security, Document, EncryptOptions, PDFResult};
//!
//! fn stamp(input: &str, output: &str) -> PDFResult<()> {
//!     let document = Document::load(input)?;
//!     let document = editor::add_text(&document, 0, "Approved", 72.0, 72.0, &Default::default())?;
//!     let document = security::encrypt(&document, &EncryptOptions::new("secret"))?;
//!     document.save(output)
//! }
//! ```

pub mod config;
pub mod document;
pub mod editor;
pub mod error;
pub mod handlers;
pub mod pdf;
pub mod render;
pub mod security;

mod crypto;

pub use config::{ParseOptions, SaveOptions, XRefForm};
pub use crypto::ObjectCipher;
pub use document::{Document, Metadata, Page, Rectangle, Rotation};
pub use editor::{
    add_image, add_page, add_text, delete_page, merge, merge_bytes, merge_files, move_page, rotate_page,
    split, write_split, Color, ImageFormat, ImageOptions, PageSize, SplitMode, StandardFont, TextOptions,
};
pub use error::{PDFError, PDFResult};
pub use handlers::{SecurityHandler, StandardSecurityHandler};
pub use pdf::{Dictionary, Object, ObjectId, Stream, Version};
pub use render::{convert_pages, PageHandle, PageRenderer, RenderedPage, TargetSize};
pub use security::{decrypt, encrypt, EncryptOptions, EncryptionAlgorithm, PDFPermissions, SecurityState};
