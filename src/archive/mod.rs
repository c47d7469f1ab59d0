//! Media archive: copies of user-selected files under collision-free names.
//!
//! Archiving happens before the catalog row is written. A crash in between
//! leaves an unreferenced file behind, which [`Archiver::find_orphans`]
//! reports.

pub mod mime;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::CatalogError;
use crate::storage::StorageRoot;

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

/// Result of archiving one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    /// Where the copy landed.
    pub absolute_path: PathBuf,
    /// Generated name of the copy.
    pub file_name: String,
    /// Path relative to the archive directory; this is what gets persisted.
    pub relative_path: String,
}

/// Build `<stem>_<unix millis>_<6 random base36 chars><.ext>`.
///
/// The timestamp and random suffix make collisions very unlikely, not
/// impossible.
pub fn generate_unique_filename(original: &str) -> String {
    let original = Path::new(original);
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let extension = original
        .extension()
        .map(|s| format!(".{}", s.to_string_lossy()))
        .unwrap_or_default();

    let millis = Utc::now().timestamp_millis();
    format!("{}_{}_{}{}", stem, millis, random_suffix(), extension)
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

pub struct Archiver {
    storage: StorageRoot,
}

impl Archiver {
    pub fn new(storage: StorageRoot) -> Self {
        Self { storage }
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.storage.archive_dir()
    }

    /// Copy `source` into the archive under a unique name derived from
    /// `filename`. The source file is not modified.
    pub fn save_media_file(&self, source: &Path, filename: &str) -> Result<ArchivedFile> {
        let archive_dir = self.storage.ensure_archive_dir()?;

        let mut file_name = generate_unique_filename(filename);
        while archive_dir.join(&file_name).exists() {
            file_name = generate_unique_filename(filename);
        }
        let destination = archive_dir.join(&file_name);

        fs::copy(source, &destination).with_context(|| {
            format!("Failed to copy {} into the archive", source.display())
        })?;
        info!("Archived {} as {}", source.display(), file_name);

        Ok(ArchivedFile {
            absolute_path: destination,
            relative_path: file_name.clone(),
            file_name,
        })
    }

    /// Remove a copy whose catalog row was never written.
    pub fn discard(&self, archived: &ArchivedFile) -> Result<()> {
        fs::remove_file(&archived.absolute_path).with_context(|| {
            format!("Failed to remove {} from the archive", archived.absolute_path.display())
        })?;
        debug!("Discarded {}", archived.file_name);
        Ok(())
    }

    /// Turn a stored archive-relative path back into an absolute one.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let relative = Path::new(relative);
        let safe = !relative.as_os_str().is_empty()
            && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(CatalogError::UnsafeArchivePath(relative.to_path_buf()).into());
        }
        Ok(self.archive_dir().join(relative))
    }

    /// Files in the archive that no catalog row refers to.
    pub fn find_orphans(&self, known: &HashSet<String>) -> Result<Vec<PathBuf>> {
        let archive_dir = self.archive_dir();
        if !archive_dir.exists() {
            return Ok(Vec::new());
        }

        let mut orphans = Vec::new();
        for entry in WalkDir::new(&archive_dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&archive_dir) else {
                continue;
            };
            if !known.contains(&to_archive_key(relative)) {
                orphans.push(entry.path().to_path_buf());
            }
        }

        orphans.sort();
        debug!("Found {} orphaned archive files", orphans.len());
        Ok(orphans)
    }
}

/// Forward-slash form of an archive-relative path, as stored in the catalog.
fn to_archive_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
