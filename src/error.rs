//! Typed errors raised by the catalog layer.
//!
//! Most plumbing returns `anyhow::Result`; these variants exist for the
//! conditions callers may want to match on.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The database failed to open at startup; writes cannot proceed.
    #[error("database is not available")]
    Unavailable,

    /// No storage root could be resolved, so nothing can be archived.
    #[error("storage location is not available")]
    NoStorage,

    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },

    /// An archive-relative path tried to escape the archive directory.
    #[error("path escapes the archive directory: {}", .0.display())]
    UnsafeArchivePath(PathBuf),
}
