mod schema;
pub mod models;
pub mod search;
pub mod sqlite;

use anyhow::Result;
use std::path::Path;
use tracing::{error, info, warn};

pub use models::{
    Collection, Comment, EntityRef, LookupEntry, MediaRecord, MediaUpdate, NewMedia,
    SearchCriteria, SortOrder,
};
pub use schema::{DEFAULT_COLLECTION, DEFAULT_MEDIA_TYPES, DEFAULT_SOURCE_TYPES, SCHEMA};
pub use search::SearchQuery;

use crate::error::CatalogError;

/// Dispatch a read to the open connection. Failures are logged and replaced
/// by `$default`, as is a missing connection.
macro_rules! read {
    ($self:expr, $what:literal, $default:expr, $method:ident($($arg:expr),* $(,)?)) => {
        match &$self.inner {
            Some(db) => db.$method($($arg),*).unwrap_or_else(|e| {
                warn!("Failed to load {}: {:#}", $what, e);
                $default
            }),
            None => $default,
        }
    };
}

/// Dispatch a write to the open connection. Failures are logged and
/// returned to the caller.
macro_rules! mutate {
    ($self:expr, $what:literal, $method:ident($($arg:expr),* $(,)?)) => {{
        let db = $self.inner.as_ref().ok_or(CatalogError::Unavailable)?;
        db.$method($($arg),*).map_err(|e| {
            error!("Failed to {}: {:#}", $what, e);
            e
        })
    }};
}

/// Owned handle on the catalog database.
///
/// A handle whose open failed is still usable: reads come back empty and
/// writes fail with [`CatalogError::Unavailable`].
pub struct Database {
    inner: Option<sqlite::SqliteDb>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sqlite::SqliteDb::open(path)?;
        info!("Database opened at {}", path.display());
        Ok(Self { inner: Some(db) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { inner: Some(sqlite::SqliteDb::open_in_memory()?) })
    }

    pub fn unavailable() -> Self {
        Self { inner: None }
    }

    pub fn is_available(&self) -> bool {
        self.inner.is_some()
    }

    pub fn close(self) -> Result<()> {
        match self.inner {
            Some(db) => db.close(),
            None => Ok(()),
        }
    }

    /// Create missing tables and seed empty lookup tables.
    pub fn initialize(&self, schema_script: Option<&Path>) -> Result<()> {
        match schema_script {
            Some(script) => mutate!(self, "initialize schema", initialize_schema_from(script))?,
            None => mutate!(self, "initialize schema", initialize_schema())?,
        }
        self.seed_defaults()
    }

    pub fn initialize_schema(&self) -> Result<()> {
        mutate!(self, "initialize schema", initialize_schema())
    }

    pub fn seed_defaults(&self) -> Result<()> {
        mutate!(self, "seed defaults", seed_defaults())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_all_media(&self) -> Vec<MediaRecord> {
        read!(self, "media", Vec::new(), get_all_media())
    }

    pub fn search_media(&self, criteria: &SearchCriteria) -> Vec<MediaRecord> {
        read!(self, "search results", Vec::new(), search_media(criteria))
    }

    pub fn get_media_by_id(&self, id: i64) -> Option<MediaRecord> {
        read!(self, "media item", None, get_media_by_id(id))
    }

    pub fn get_media_types(&self) -> Vec<LookupEntry> {
        read!(self, "media types", Vec::new(), get_media_types())
    }

    pub fn get_source_types(&self) -> Vec<LookupEntry> {
        read!(self, "source types", Vec::new(), get_source_types())
    }

    pub fn get_collections(&self) -> Vec<Collection> {
        read!(self, "collections", Vec::new(), get_collections())
    }

    pub fn get_tags(&self) -> Vec<LookupEntry> {
        read!(self, "tags", Vec::new(), get_tags())
    }

    pub fn get_people(&self) -> Vec<LookupEntry> {
        read!(self, "people", Vec::new(), get_people())
    }

    pub fn get_media_tags(&self, media_id: i64) -> Vec<LookupEntry> {
        read!(self, "media tags", Vec::new(), get_media_tags(media_id))
    }

    pub fn get_media_people(&self, media_id: i64) -> Vec<LookupEntry> {
        read!(self, "media people", Vec::new(), get_media_people(media_id))
    }

    pub fn get_comments(&self, media_id: i64) -> Vec<Comment> {
        read!(self, "comments", Vec::new(), get_comments(media_id))
    }

    pub fn get_archived_paths(&self) -> Vec<String> {
        read!(self, "archived paths", Vec::new(), get_archived_paths())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub fn add_media(&self, media: &NewMedia) -> Result<i64> {
        mutate!(self, "add media", add_media(media))
    }

    pub fn add_media_with_links(
        &self,
        media: &NewMedia,
        tag_ids: &[i64],
        person_ids: &[i64],
    ) -> Result<i64> {
        mutate!(self, "add media", add_media_with_links(media, tag_ids, person_ids))
    }

    pub fn update_media(&self, id: i64, update: &MediaUpdate) -> Result<bool> {
        mutate!(self, "update media", update_media(id, update))
    }

    pub fn delete_media(&self, id: i64) -> Result<bool> {
        mutate!(self, "delete media", delete_media(id))
    }

    pub fn add_tag(&self, name: &str) -> Result<i64> {
        mutate!(self, "add tag", add_tag(name))
    }

    pub fn add_person(&self, name: &str) -> Result<i64> {
        mutate!(self, "add person", add_person(name))
    }

    pub fn add_collection(&self, name: &str, description: Option<&str>) -> Result<i64> {
        mutate!(self, "add collection", add_collection(name, description))
    }

    pub fn link_tag_to_media(&self, media_id: i64, tag_id: i64) -> Result<bool> {
        mutate!(self, "link tag to media", link_tag_to_media(media_id, tag_id))
    }

    pub fn link_person_to_media(&self, media_id: i64, person_id: i64) -> Result<bool> {
        mutate!(self, "link person to media", link_person_to_media(media_id, person_id))
    }

    pub fn unlink_tag_from_media(&self, media_id: i64, tag_id: i64) -> Result<bool> {
        mutate!(self, "unlink tag from media", unlink_tag_from_media(media_id, tag_id))
    }

    pub fn unlink_person_from_media(&self, media_id: i64, person_id: i64) -> Result<bool> {
        mutate!(self, "unlink person from media", unlink_person_from_media(media_id, person_id))
    }

    pub fn add_comment(&self, media_id: i64, body: &str) -> Result<i64> {
        mutate!(self, "add comment", add_comment(media_id, body))
    }

    // ========================================================================
    // Entity references
    // ========================================================================

    pub fn resolve_tag(&self, tag: &EntityRef) -> Result<i64> {
        match tag {
            EntityRef::Existing { id } => Ok(*id),
            EntityRef::Pending { name, .. } => self.add_tag(name),
        }
    }

    pub fn resolve_person(&self, person: &EntityRef) -> Result<i64> {
        match person {
            EntityRef::Existing { id } => Ok(*id),
            EntityRef::Pending { name, .. } => self.add_person(name),
        }
    }

    pub fn resolve_collection(&self, collection: &EntityRef) -> Result<i64> {
        match collection {
            EntityRef::Existing { id } => Ok(*id),
            EntityRef::Pending { name, description } => {
                self.add_collection(name, description.as_deref())
            }
        }
    }
}
