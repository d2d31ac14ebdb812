//! PDF stream object implementation

use log::trace;
use crate::error::PDFResult;
use super::filter::{filter_chain, Filter};
use super::{Dictionary, Object};

/// PDF stream object
///
/// `content` holds the bytes exactly as they appear between `stream` and
/// `endstream`, still encoded with the filters named in `dict`. `/Length`
/// is kept equal to `content.len()` by every mutator.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Stream dictionary
    pub dict: Dictionary,
    /// Raw (encoded) stream data
    pub content: Vec<u8>,
}

impl Stream {
    /// Create new stream object
    pub fn new(mut dict: Dictionary, content: Vec<u8>) -> Self {
        dict.set("Length", content.len());
        Self { dict, content }
    }

    /// Replace the raw data, leaving the filter entries alone
    pub fn set_content(&mut self, content: Vec<u8>) {
        self.dict.set("Length", content.len());
        self.content = content;
    }

    /// Replace the data with unencoded bytes, dropping any filter entries
    pub fn set_plain_content(&mut self, content: Vec<u8>) {
        self.dict.remove("Filter");
        self.dict.remove("DecodeParms");
        self.set_content(content);
    }

    /// Filters applied to the stream, in decoding order
    pub fn filters(&self) -> PDFResult<Vec<Filter>> {
        Ok(filter_chain(&self.dict)?.into_iter().map(|(f, _)| f).collect())
    }

    pub fn is_filtered(&self) -> bool {
        self.dict.has("Filter")
    }

    /// Decode stream data through the full filter chain
    pub fn decoded_content(&self) -> PDFResult<Vec<u8>> {
        let chain = filter_chain(&self.dict)?;
        if chain.is_empty() {
            return Ok(self.content.clone());
        }

        trace!("Decoding stream with {} filters", chain.len());
        let mut data = self.content.clone();
        for (filter, params) in &chain {
            data = filter.decode(&data, params.as_ref())?;
        }
        Ok(data)
    }

    /// Flate-compress an unfiltered stream when that makes it smaller
    pub fn compress(&mut self) -> PDFResult<()> {
        if self.is_filtered() || self.content.is_empty() {
            return Ok(());
        }

        let encoded = Filter::FlateDecode.encode(&self.content)?;
        if encoded.len() < self.content.len() {
            trace!("Compressed stream {} -> {} bytes", self.content.len(), encoded.len());
            self.dict.set("Filter", Object::name("FlateDecode"));
            self.set_content(encoded);
        }
        Ok(())
    }

    /// Write stream to output
    pub fn write_to(&self, output: &mut Vec<u8>) {
        self.dict.write_to(output);
        output.extend_from_slice(b"\nstream\n");
        output.extend_from_slice(&self.content);
        output.extend_from_slice(b"\nendstream");
    }
}
