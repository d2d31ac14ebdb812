//! PDF object model, parsing and serialization

mod object;
mod dict;
mod stream;
mod filter;
mod lexer;
mod parser;
mod xref;
mod trailer;
mod store;
mod writer;

pub use object::{Object, ObjectId};
pub use dict::Dictionary;
pub use stream::Stream;
pub use filter::{apply_predictor, filter_chain, Filter, PredictorParams};
pub use parser::{CompressedLocation, PDFParser, ParsedDocument, Version};
pub use xref::{XRefEntry, XRefSection, XRefTable, XRefWriter};
pub use trailer::Trailer;
pub use store::{ObjectStore, MAX_GENERATION};
pub use writer::PDFWriter;

pub use lexer::DEFAULT_MAX_NESTING;
pub(crate) use lexer::Lexer;
pub(crate) use object::format_real;
pub(crate) use parser::expand_object_streams;
