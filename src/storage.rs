//! Where the catalog lives on disk.
//!
//! ```text
//! <root>/
//! ├── memoryvault.db
//! └── Memory Vault Archive/
//!     └── beach_1700000000000_k3x9qa.jpg
//! ```
//!
//! The root is derived from configuration and the platform data directory,
//! never from the process's working directory.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;

pub const APP_DIR_NAME: &str = "MemoryVault";
pub const ARCHIVE_FOLDER_NAME: &str = "Memory Vault Archive";
pub const DATABASE_FILENAME: &str = "memoryvault.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoot {
    root: PathBuf,
}

impl StorageRoot {
    /// Resolve the storage root: explicit config path, then the executable's
    /// directory in portable mode, then the platform data directory.
    pub fn resolve(config: &StorageConfig) -> Result<Self> {
        if let Some(root) = &config.root {
            if !root.is_absolute() {
                anyhow::bail!("storage.root must be an absolute path, got {}", root.display());
            }
            return Ok(Self::at(root));
        }

        if config.portable {
            let exe = std::env::current_exe().context("Failed to locate executable")?;
            let dir = exe
                .parent()
                .context("Executable has no parent directory")?;
            return Ok(Self::at(dir));
        }

        let data_dir = dirs::data_dir().context("No platform data directory available")?;
        Ok(Self::at(data_dir.join(APP_DIR_NAME)))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create the root if missing and return it.
    pub fn ensure(&self) -> Result<&Path> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create storage root {}", self.root.display()))?;
        Ok(&self.root)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_FOLDER_NAME)
    }

    /// Create the archive directory if missing and return it.
    pub fn ensure_archive_dir(&self) -> Result<PathBuf> {
        let dir = self.archive_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create archive directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of the database file, with the root created beforehand.
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.ensure()?.join(DATABASE_FILENAME))
    }
}
