//! ZIP packaging of converted outputs.
//!
//! [`build_archive`] takes whatever items it is given, keeps the ones that are
//! `Converted`, and writes each output under its download name. Entries are
//! written in item order with a fixed timestamp, so the same snapshot always
//! yields the same entry list. Two items deriving the same name collapse to
//! one entry carrying the later item's bytes.

use bytes::Bytes;
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::item::ConversionItem;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to write archive entry '{entry}': {source}")]
    Entry {
        entry: String,
        #[source]
        source: std::io::Error,
    },
    #[error("zip assembly failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to save archive to {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A finished archive, held in memory until the caller saves it.
#[derive(Debug, Clone)]
pub struct ArchiveBlob {
    /// `converted-images-<unix millis>.zip`
    pub file_name: String,
    pub bytes: Bytes,
    /// Entry names in archive order.
    pub entries: Vec<String>,
}

impl ArchiveBlob {
    /// Write the archive into `dir` under [`ArchiveBlob::file_name`].
    ///
    /// The bytes go to a temporary file in `dir` that is renamed into place
    /// only once fully written.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf, ArchiveError> {
        let target = dir.join(&self.file_name);
        persist_atomically(&target, &self.bytes)?;
        info!(path = %target.display(), entries = self.entries.len(), "[ARCHIVE] Archive saved");
        Ok(target)
    }
}

pub fn archive_file_name() -> String {
    format!("converted-images-{}.zip", chrono::Utc::now().timestamp_millis())
}

/// Collect the converted outputs among `items` into entry order, letting a
/// later duplicate name replace the earlier content in place.
fn collect_entries(items: &[ConversionItem]) -> Vec<(String, Bytes)> {
    let mut entries: Vec<(String, Bytes)> = Vec::new();
    for item in items {
        let Some(output) = item.output_preview() else {
            continue;
        };
        let name = item.download_name();
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => {
                debug!(entry = %name, "[ARCHIVE] Duplicate entry name; later item wins");
                slot.1 = output.bytes.clone();
            }
            None => entries.push((name, output.bytes.clone())),
        }
    }
    entries
}

/// Write the converted outputs among `items` as a ZIP into `sink`.
/// Returns the entry names written; an empty list means nothing was written.
pub fn write_archive<W>(items: &[ConversionItem], sink: W) -> Result<(W, Vec<String>), ArchiveError>
where
    W: Write + Seek,
{
    let entries = collect_entries(items);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut zip = ZipWriter::new(sink);
    for (name, bytes) in &entries {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(bytes).map_err(|source| ArchiveError::Entry {
            entry: name.clone(),
            source,
        })?;
    }
    let sink = zip.finish()?;
    Ok((sink, entries.into_iter().map(|(name, _)| name).collect()))
}

/// Package every `Converted` item into one in-memory ZIP.
///
/// Returns `Ok(None)` when no item is converted. Any failure aborts the
/// whole archive; no partial blob is ever returned.
pub fn build_archive(items: &[ConversionItem]) -> Result<Option<ArchiveBlob>, ArchiveError> {
    let converted = items.iter().filter(|item| item.output_preview().is_some()).count();
    if converted == 0 {
        debug!("[ARCHIVE] No converted items; nothing to package");
        return Ok(None);
    }

    info!(items = converted, "[ARCHIVE] Building archive");
    let (cursor, entries) = write_archive(items, Cursor::new(Vec::new())).map_err(|e| {
        error!(error = %e, "[ARCHIVE][ERROR] Archive assembly failed");
        e
    })?;

    let blob = ArchiveBlob {
        file_name: archive_file_name(),
        bytes: Bytes::from(cursor.into_inner()),
        entries,
    };
    info!(
        file = %blob.file_name,
        entries = blob.entries.len(),
        bytes = blob.bytes.len(),
        "[ARCHIVE] Archive built"
    );
    Ok(Some(blob))
}

/// Save one converted item's output into `dir` under its download name.
/// Returns `Ok(None)` if the item has no output.
pub fn save_output(item: &ConversionItem, dir: &Path) -> Result<Option<PathBuf>, ArchiveError> {
    let Some(output) = item.output_preview() else {
        return Ok(None);
    };
    let target = dir.join(item.download_name());
    persist_atomically(&target, &output.bytes)?;
    debug!(path = %target.display(), "[ARCHIVE] Output saved");
    Ok(Some(target))
}

fn persist_atomically(target: &Path, bytes: &[u8]) -> Result<(), ArchiveError> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let save_err = |source| ArchiveError::Save {
        path: target.to_path_buf(),
        source,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(save_err)?;
    tmp.write_all(bytes).map_err(save_err)?;
    tmp.persist(target).map_err(|e| save_err(e.error))?;
    Ok(())
}
