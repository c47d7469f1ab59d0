//! Command handlers behind the IPC boundary.

use anyhow::{bail, Context, Result};
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::archive::{mime, Archiver};
use crate::config::Config;
use crate::db::{Database, EntityRef, LookupEntry, MediaUpdate, NewMedia, SearchCriteria};
use crate::error::CatalogError;
use crate::storage::StorageRoot;

/// One request from the UI shell, tagged by its `command` name.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Request {
    SelectFiles {
        paths: Vec<PathBuf>,
    },
    GetFilePreview {
        path: PathBuf,
    },
    GetMediaTypes,
    GetSourceTypes,
    GetCollections,
    GetTags,
    GetPeople,
    GetAllMedia,
    SearchMedia(SearchCriteria),
    GetMedia {
        id: i64,
    },
    SaveMedia(SaveMediaRequest),
    UpdateMedia(UpdateMediaRequest),
    DeleteMedia {
        id: i64,
    },
    AddCollection {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
    AddComment {
        media_id: i64,
        body: String,
    },
    FindOrphanedFiles,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMediaRequest {
    /// The user's original file; it is copied, never moved.
    pub file_path: PathBuf,
    pub metadata: MediaMetadata,
}

/// Form contents submitted with a new media item.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaMetadata {
    pub title: String,
    pub description: Option<String>,
    /// Inferred from the file extension when absent.
    pub media_type_id: Option<i64>,
    pub source_type_id: Option<i64>,
    pub capture_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub thumbnail_path: Option<String>,
    pub collection: Option<EntityRef>,
    pub tags: Vec<EntityRef>,
    pub people: Vec<EntityRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMediaRequest {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub media_type_id: i64,
    #[serde(default)]
    pub source_type_id: Option<i64>,
    #[serde(default)]
    pub capture_date: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub collection_id: Option<i64>,
    /// Replaces the tag set when present.
    #[serde(default)]
    pub tags: Option<Vec<EntityRef>>,
    /// Replaces the people set when present.
    #[serde(default)]
    pub people: Option<Vec<EntityRef>>,
}

/// What `select-files` reports about a picked file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    /// Lowercase extension with its leading dot, empty when there is none.
    #[serde(rename = "type")]
    pub file_type: String,
    /// Unix milliseconds.
    pub last_modified: i64,
}

pub struct Handler {
    db: Database,
    archiver: Option<Archiver>,
    page_size: Option<u32>,
}

impl Handler {
    pub fn new(db: Database, archiver: Archiver) -> Self {
        Self { db, archiver: Some(archiver), page_size: None }
    }

    /// Open the catalog described by `config`.
    ///
    /// Startup failures are logged, never fatal: without a storage root or
    /// a database the handler still answers, with empty reads and failing
    /// writes.
    pub fn open(config: &Config) -> Self {
        let page_size = config.search.page_size;
        let storage = match StorageRoot::resolve(&config.storage) {
            Ok(storage) => storage,
            Err(e) => {
                error!("Storage unavailable: {:#}", e);
                return Self { db: Database::unavailable(), archiver: None, page_size };
            }
        };

        match storage.ensure_archive_dir() {
            Ok(dir) => info!("Archive directory at {}", dir.display()),
            Err(e) => error!("{:#}", e),
        }

        let db = match storage.database_path().and_then(|path| Database::open(&path)) {
            Ok(db) => db,
            Err(e) => {
                error!("Database unavailable: {:#}", e);
                Database::unavailable()
            }
        };
        if db.is_available() {
            if let Err(e) = db.initialize(config.storage.schema_script.as_deref()) {
                error!("Failed to initialize database: {:#}", e);
            }
        }

        Self { db, archiver: Some(Archiver::new(storage)), page_size }
    }

    /// Default limit for searches that do not ask for one.
    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn into_database(self) -> Database {
        self.db
    }

    /// Answer one request. Reads return plain data; mutations return a
    /// `{success, ...}` envelope.
    pub fn handle(&self, request: Request) -> Value {
        match request {
            Request::SelectFiles { paths } => to_json(select_files(&paths)),
            Request::GetFilePreview { path } => file_preview(&path).unwrap_or_else(|e| {
                warn!("No preview for {}: {:#}", path.display(), e);
                Value::Null
            }),
            Request::GetMediaTypes => to_json(self.db.get_media_types()),
            Request::GetSourceTypes => to_json(self.db.get_source_types()),
            Request::GetCollections => to_json(self.db.get_collections()),
            Request::GetTags => to_json(self.db.get_tags()),
            Request::GetPeople => to_json(self.db.get_people()),
            Request::GetAllMedia => to_json(self.db.get_all_media()),
            Request::SearchMedia(mut criteria) => {
                if criteria.limit.is_none() {
                    criteria.limit = self.page_size;
                }
                to_json(self.db.search_media(&criteria))
            }
            Request::GetMedia { id } => self.get_media(id),
            Request::SaveMedia(request) => {
                envelope(self.save_media(request).map(|id| json!({ "mediaId": id })))
            }
            Request::UpdateMedia(request) => {
                envelope(self.update_media(request).map(|changed| json!({ "changed": changed })))
            }
            Request::DeleteMedia { id } => {
                envelope(self.db.delete_media(id).map(|deleted| json!({ "deleted": deleted })))
            }
            Request::AddCollection { name, description } => envelope(
                self.db
                    .add_collection(&name, description.as_deref())
                    .map(|id| json!({ "id": id })),
            ),
            Request::AddComment { media_id, body } => {
                envelope(self.db.add_comment(media_id, &body).map(|id| json!({ "id": id })))
            }
            Request::FindOrphanedFiles => to_json(self.find_orphaned_files()),
        }
    }

    fn get_media(&self, id: i64) -> Value {
        match self.db.get_media_by_id(id) {
            Some(media) => json!({
                "media": media,
                "tags": self.db.get_media_tags(id),
                "people": self.db.get_media_people(id),
                "comments": self.db.get_comments(id),
            }),
            None => Value::Null,
        }
    }

    /// Resolve every reference, archive the file, then write the catalog
    /// row and its links in one transaction.
    ///
    /// If the row cannot be written the archived copy is removed again; a
    /// copy that survives a crash in between is reported by
    /// `find-orphaned-files`.
    pub fn save_media(&self, request: SaveMediaRequest) -> Result<i64> {
        let SaveMediaRequest { file_path, metadata } = request;

        if !self.db.is_available() {
            return Err(CatalogError::Unavailable.into());
        }
        let archiver = self.archiver()?;
        if metadata.title.trim().is_empty() {
            bail!("A title is required");
        }

        let media_type_id = match metadata.media_type_id {
            Some(id) => id,
            None => self.infer_media_type(&file_path)?,
        };
        let original_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("{} has no file name", file_path.display()))?;

        let collection_id = metadata
            .collection
            .as_ref()
            .map(|c| self.db.resolve_collection(c))
            .transpose()?;
        let tag_ids = metadata
            .tags
            .iter()
            .map(|t| self.db.resolve_tag(t))
            .collect::<Result<Vec<_>>>()?;
        let person_ids = metadata
            .people
            .iter()
            .map(|p| self.db.resolve_person(p))
            .collect::<Result<Vec<_>>>()?;

        let archived = archiver.save_media_file(&file_path, &original_name)?;

        let media = NewMedia {
            file_name: archived.file_name.clone(),
            file_path: archived.relative_path.clone(),
            thumbnail_path: non_empty(metadata.thumbnail_path),
            title: metadata.title,
            description: non_empty(metadata.description),
            media_type_id,
            source_type_id: metadata.source_type_id,
            capture_date: metadata.capture_date,
            location: non_empty(metadata.location),
            collection_id,
        };
        let media_id = match self.db.add_media_with_links(&media, &tag_ids, &person_ids) {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = archiver.discard(&archived) {
                    warn!("{:#}", cleanup);
                }
                return Err(e);
            }
        };

        info!("Saved media {} from {}", media_id, file_path.display());
        Ok(media_id)
    }

    pub fn update_media(&self, request: UpdateMediaRequest) -> Result<bool> {
        let update = MediaUpdate {
            title: request.title,
            description: non_empty(request.description),
            media_type_id: request.media_type_id,
            source_type_id: request.source_type_id,
            capture_date: request.capture_date,
            location: non_empty(request.location),
            collection_id: request.collection_id,
        };
        let id = request.id;
        let changed = self.db.update_media(id, &update)?;
        if !changed {
            return Ok(false);
        }

        if let Some(tags) = &request.tags {
            let wanted = tags
                .iter()
                .map(|t| self.db.resolve_tag(t))
                .collect::<Result<HashSet<_>>>()?;
            let current = ids(self.db.get_media_tags(id));
            for tag_id in current.difference(&wanted) {
                self.db.unlink_tag_from_media(id, *tag_id)?;
            }
            for tag_id in wanted.difference(&current) {
                self.db.link_tag_to_media(id, *tag_id)?;
            }
        }

        if let Some(people) = &request.people {
            let wanted = people
                .iter()
                .map(|p| self.db.resolve_person(p))
                .collect::<Result<HashSet<_>>>()?;
            let current = ids(self.db.get_media_people(id));
            for person_id in current.difference(&wanted) {
                self.db.unlink_person_from_media(id, *person_id)?;
            }
            for person_id in wanted.difference(&current) {
                self.db.link_person_to_media(id, *person_id)?;
            }
        }

        Ok(true)
    }

    fn infer_media_type(&self, path: &Path) -> Result<i64> {
        let kind = mime::media_kind(path)
            .with_context(|| format!("Cannot infer a media type for {}", path.display()))?;
        self.db
            .get_media_types()
            .into_iter()
            .find(|t| t.name == kind.type_name())
            .map(|t| t.id)
            .with_context(|| format!("Media type {} is not in the catalog", kind.type_name()))
    }

    fn archiver(&self) -> Result<&Archiver> {
        self.archiver.as_ref().ok_or_else(|| CatalogError::NoStorage.into())
    }

    /// Archived files no media row refers to. Without a database every file
    /// would look unreferenced, so nothing is reported then.
    pub fn find_orphaned_files(&self) -> Vec<PathBuf> {
        let Some(archiver) = &self.archiver else {
            return Vec::new();
        };
        if !self.db.is_available() {
            warn!("Skipping orphan scan, database is not available");
            return Vec::new();
        }
        let known: HashSet<String> = self.db.get_archived_paths().into_iter().collect();
        archiver.find_orphans(&known).unwrap_or_else(|e| {
            warn!("Failed to scan the archive: {:#}", e);
            Vec::new()
        })
    }
}

/// Stat the picked paths. Anything that is not a readable file is skipped.
pub fn select_files(paths: &[PathBuf]) -> Vec<SelectedFile> {
    paths
        .iter()
        .filter_map(|path| {
            let metadata = match fs::metadata(path) {
                Ok(m) if m.is_file() => m,
                Ok(_) => return None,
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    return None;
                }
            };
            let last_modified = metadata
                .modified()
                .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
                .unwrap_or_default();
            Some(SelectedFile {
                path: path.clone(),
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                size: metadata.len(),
                file_type: path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                    .unwrap_or_default(),
                last_modified,
            })
        })
        .collect()
}

/// Inline the file as a `data:` URL for the preview pane.
pub fn file_preview(path: &Path) -> Result<Value> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mime_type = mime::mime_type(path);
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(json!({
        "dataUrl": format!("data:{};base64,{}", mime_type, encoded),
        "mimeType": mime_type,
    }))
}

fn ids(entries: Vec<LookupEntry>) -> HashSet<i64> {
    entries.into_iter().map(|e| e.id).collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn to_json<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        warn!("Failed to serialize response: {}", e);
        Value::Null
    })
}

fn envelope(result: Result<Value>) -> Value {
    match result {
        Ok(Value::Object(mut fields)) => {
            fields.insert("success".to_string(), Value::Bool(true));
            Value::Object(fields)
        }
        Ok(_) => json!({ "success": true }),
        Err(e) => json!({ "success": false, "error": format!("{:#}", e) }),
    }
}
