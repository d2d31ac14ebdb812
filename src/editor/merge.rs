//! Merging documents

use std::path::Path;
use log::{debug, info};
use rayon::prelude::*;

use crate::document::Document;
use crate::error::{PDFError, PDFResult};
use super::import::PageImporter;

/// Concatenate the pages of `documents`, in order, into a new document
///
/// The result carries no document information dictionary. A locked or
/// malformed input fails the whole merge with [`PDFError::MergeError`]
/// naming that input.
pub fn merge(documents: &[Document]) -> PDFResult<Document> {
    let mut output = Document::new();

    for (index, document) in documents.iter().enumerate() {
        let imported = document
            .ensure_unlocked()
            .and_then(|()| Ok(document.page_ids()?.to_vec()))
            .and_then(|pages| PageImporter::new(document).import_pages(&mut output, &pages))
            .map_err(|e| PDFError::merge(index, e))?;
        output.version = output.version.max(document.version);
        debug!("Merged {} pages from input {}", imported.len(), index);
    }

    info!("Merged {} documents into {} pages", documents.len(), output.page_count()?);
    Ok(output)
}

/// Parse every input concurrently, then merge them in order
pub fn merge_bytes<B>(inputs: &[B]) -> PDFResult<Document>
where
    B: AsRef<[u8]> + Sync,
{
    let documents = inputs
        .par_iter()
        .enumerate()
        .map(|(index, bytes)| Document::parse(bytes.as_ref()).map_err(|e| PDFError::merge(index, e)))
        .collect::<PDFResult<Vec<_>>>()?;
    merge(&documents)
}

/// Load every file concurrently, then merge them in order
pub fn merge_files<P>(paths: &[P]) -> PDFResult<Document>
where
    P: AsRef<Path> + Sync,
{
    let documents = paths
        .par_iter()
        .enumerate()
        .map(|(index, path)| Document::load(path).map_err(|e| PDFError::merge(index, e)))
        .collect::<PDFResult<Vec<_>>>()?;
    merge(&documents)
}
