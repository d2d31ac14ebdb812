//! Splitting documents

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};

use crate::document::Document;
use crate::error::{PDFError, PDFResult};
use crate::pdf::ObjectId;
use super::import::PageImporter;

/// How [`split`] divides a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// One document holding pages `from..=to`, counted from 1; bounds
    /// outside the document are clamped
    Range { from: usize, to: usize },
    /// One single-page document per page
    Individual,
}

/// Name of the `page`-th (1-indexed) output of an individual split
pub fn split_file_name(stem: &str, page: usize) -> String {
    format!("{}_page_{}.pdf", stem, page)
}

/// Copy `pages` into a new document that keeps the source metadata
fn extract(source: &Document, pages: &[ObjectId]) -> PDFResult<Document> {
    let mut output = Document::new();
    output.version = source.version;
    let mut importer = PageImporter::new(source);
    importer.import_pages(&mut output, pages)?;
    if let Some(info) = source.trailer.info {
        if let Some(id) = importer.import_object(&mut output.store, info).as_reference() {
            output.trailer.info = Some(id);
        }
    }
    Ok(output)
}

/// Split `document` into new documents
///
/// Range mode always yields exactly one document, which has no pages when
/// the clamped range is empty.
pub fn split(document: &Document, mode: SplitMode) -> PDFResult<Vec<Document>> {
    document.ensure_unlocked()?;
    let pages = document.page_ids()?;

    let outputs = match mode {
        SplitMode::Range { from, to } => {
            let first = from.max(1);
            let last = to.min(pages.len());
            if first != from || last != to {
                debug!("Clamped split range {}..={} to {}..={}", from, to, first, last);
            }
            let selected = if first <= last { &pages[first - 1..last] } else { &[][..] };
            vec![extract(document, selected)?]
        }
        SplitMode::Individual => pages
            .iter()
            .map(|page| extract(document, std::slice::from_ref(page)))
            .collect::<PDFResult<Vec<_>>>()?,
    };
    debug!("Split into {} documents", outputs.len());
    Ok(outputs)
}

/// Split `document` and write the results next to `output_path`
///
/// Range mode writes `output_path` itself; individual mode writes
/// `<stem>_page_<N>.pdf` in the same directory. Nothing is left on disk
/// unless every output was written.
pub fn write_split(document: &Document, output_path: impl AsRef<Path>, mode: SplitMode) -> PDFResult<Vec<PathBuf>> {
    let output_path = output_path.as_ref();
    let directory = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let parts = split(document, mode)?;
    let targets: Vec<PathBuf> = match mode {
        SplitMode::Range { .. } => vec![output_path.to_path_buf()],
        SplitMode::Individual => {
            let stem = output_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string());
            (1..=parts.len())
                .map(|page| directory.join(split_file_name(&stem, page)))
                .collect()
        }
    };

    // Staged next to the targets so the final renames stay on one filesystem
    let staging = tempfile::Builder::new()
        .prefix(".split-")
        .tempdir_in(&directory)
        .map_err(|e| PDFError::io(&directory, e))?;
    let mut staged = Vec::with_capacity(parts.len());
    for (index, (part, target)) in parts.iter().zip(&targets).enumerate() {
        let path = staging.path().join(format!("{}.pdf", index));
        let bytes = part.to_bytes()?;
        fs::write(&path, bytes).map_err(|e| PDFError::io(&path, e))?;
        staged.push(path);
        debug!("Staged {}", target.display());
    }

    // Files already at a target are moved into staging and put back if
    // any later rename fails
    let mut placed: Vec<(&PathBuf, Option<PathBuf>)> = Vec::with_capacity(targets.len());
    for (index, (from, target)) in staged.iter().zip(&targets).enumerate() {
        let backup = staging.path().join(format!("{}.orig", index));
        let outcome = displace(target, &backup).and_then(|moved| {
            placed.push((target, moved.then(|| backup.clone())));
            fs::rename(from, target).map_err(|e| PDFError::io(target, e))
        });
        if let Err(e) = outcome {
            roll_back(&placed);
            return Err(e);
        }
    }

    info!("Wrote {} split outputs", targets.len());
    Ok(targets)
}

/// Move an existing file at `target` to `backup`; `false` when nothing
/// was there
fn displace(target: &Path, backup: &Path) -> PDFResult<bool> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_file() || meta.file_type().is_symlink() => {
            fs::rename(target, backup).map_err(|e| PDFError::io(target, e))?;
            debug!("Moved existing {} aside", target.display());
            Ok(true)
        }
        Ok(_) => Err(PDFError::io(
            target,
            io::Error::new(io::ErrorKind::AlreadyExists, "not a regular file"),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PDFError::io(target, e)),
    }
}

/// Undo the renames of `write_split`, newest first
fn roll_back(placed: &[(&PathBuf, Option<PathBuf>)]) {
    for (target, backup) in placed.iter().rev() {
        match fs::remove_file(target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", target.display(), e),
        }
        if let Some(backup) = backup {
            if let Err(e) = fs::rename(backup, target) {
                warn!("Could not restore {} from {}: {}", target.display(), backup.display(), e);
            }
        }
    }
}
