//! Mutation engine
//!
//! Every operation takes a [`Document`](crate::Document) by reference and
//! returns a new one; the input is never modified. Operations on a document
//! whose objects are still encrypted fail with
//! [`PDFError::DocumentLocked`](crate::PDFError::DocumentLocked).

mod content;
mod fonts;
mod image;
mod import;
mod merge;
mod pages;
mod split;
mod text;

pub use content::Color;
pub use fonts::{encode_win_ansi, try_embed_font, StandardFont};
pub use self::image::{add_image, ImageFormat, ImageOptions};
pub use merge::{merge, merge_bytes, merge_files};
pub use pages::{add_page, delete_page, move_page, rotate_page, PageSize};
pub use split::{split, split_file_name, write_split, SplitMode};
pub use text::{add_text, TextOptions};
