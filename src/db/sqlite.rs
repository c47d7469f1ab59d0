//! SQLite backend implementation.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info, warn};

use super::models::{
    Collection, Comment, LookupEntry, MediaRecord, MediaUpdate, NewMedia, SearchCriteria,
};
use super::schema::{
    DEFAULT_COLLECTION, DEFAULT_COLLECTION_DESCRIPTION, DEFAULT_MEDIA_TYPES,
    DEFAULT_SOURCE_TYPES, SCHEMA,
};
use super::search::{SearchQuery, LOWER_FN, MEDIA_SELECT};
use crate::error::CatalogError;

pub struct SqliteDb {
    pub(crate) conn: Connection,
}

impl SqliteDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // SQLite's own lower() and LIKE only fold ASCII
        conn.create_scalar_function(
            LOWER_FN,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let value: Option<String> = ctx.get(0)?;
                Ok(value.map(|v| v.to_lowercase()))
            },
        )?;
        Ok(Self { conn })
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }

    // ========================================================================
    // Schema
    // ========================================================================

    pub fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Run an external bootstrap script against an empty database, then the
    /// built-in schema to fill in anything the script left out.
    pub fn initialize_schema_from(&self, script: &Path) -> Result<()> {
        if !script.is_file() {
            warn!("Schema script {} not found, using built-in schema", script.display());
        } else if self.has_no_tables()? {
            let sql = std::fs::read_to_string(script)
                .with_context(|| format!("Failed to read schema script {}", script.display()))?;
            self.conn
                .execute_batch(&sql)
                .with_context(|| format!("Failed to execute schema script {}", script.display()))?;
            info!("Database bootstrapped from {}", script.display());
        }
        self.initialize_schema()
    }

    fn has_no_tables(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )?;
        Ok(count == 0)
    }

    /// Fill each lookup table that is still empty. Tables are checked
    /// independently so a half-seeded database gets completed.
    pub fn seed_defaults(&self) -> Result<()> {
        if self.table_is_empty("MediaTypes")? {
            self.seed_names("MediaTypes", DEFAULT_MEDIA_TYPES)?;
        }
        if self.table_is_empty("SourceTypes")? {
            self.seed_names("SourceTypes", DEFAULT_SOURCE_TYPES)?;
        }
        if self.table_is_empty("Collections")? {
            self.conn.execute(
                "INSERT INTO Collections (name, description) VALUES (?, ?)",
                params![DEFAULT_COLLECTION, DEFAULT_COLLECTION_DESCRIPTION],
            )?;
            debug!("Seeded default collection");
        }
        Ok(())
    }

    fn table_is_empty(&self, table: &'static str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count == 0)
    }

    fn seed_names(&self, table: &'static str, names: &[&str]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&format!("INSERT INTO {table} (name) VALUES (?)"))?;
            for name in names {
                stmt.execute([name])?;
            }
        }
        tx.commit()?;
        debug!("Seeded {} rows into {}", names.len(), table);
        Ok(())
    }

    // ========================================================================
    // Media
    // ========================================================================

    pub fn get_all_media(&self) -> Result<Vec<MediaRecord>> {
        self.run_media_query(&SearchQuery::new())
    }

    pub fn search_media(&self, criteria: &SearchCriteria) -> Result<Vec<MediaRecord>> {
        self.run_media_query(&SearchQuery::from_criteria(criteria))
    }

    fn run_media_query(&self, query: &SearchQuery) -> Result<Vec<MediaRecord>> {
        let (sql, values) = query.build();
        let mut stmt = self.conn.prepare(&sql)?;
        let media = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), row_to_media)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(media)
    }

    pub fn get_media_by_id(&self, id: i64) -> Result<Option<MediaRecord>> {
        let result = self
            .conn
            .query_row(&format!("{MEDIA_SELECT}\nWHERE m.id = ?"), [id], row_to_media);
        match result {
            Ok(media) => Ok(Some(media)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn add_media(&self, media: &NewMedia) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO Media (
                file_name, file_path, thumbnail_path, title, description,
                media_type_id, source_type_id, capture_date, location, collection_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                media.file_name,
                media.file_path,
                media.thumbnail_path,
                media.title,
                media.description,
                media.media_type_id,
                media.source_type_id,
                media.capture_date,
                media.location,
                media.collection_id,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert a media row together with its tag and person links. Either
    /// everything is written or nothing is.
    pub fn add_media_with_links(
        &self,
        media: &NewMedia,
        tag_ids: &[i64],
        person_ids: &[i64],
    ) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        let media_id = self.add_media(media)?;
        for tag_id in tag_ids {
            self.link_tag_to_media(media_id, *tag_id)?;
        }
        for person_id in person_ids {
            self.link_person_to_media(media_id, *person_id)?;
        }
        tx.commit()?;
        Ok(media_id)
    }

    pub fn update_media(&self, id: i64, update: &MediaUpdate) -> Result<bool> {
        let changed = self.conn.execute(
            r#"
            UPDATE Media
            SET title = ?, description = ?, media_type_id = ?, source_type_id = ?,
                capture_date = ?, location = ?, collection_id = ?
            WHERE id = ?
            "#,
            params![
                update.title,
                update.description,
                update.media_type_id,
                update.source_type_id,
                update.capture_date,
                update.location,
                update.collection_id,
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Delete a media row and everything hanging off it in one transaction.
    /// The archived file itself is left on disk.
    pub fn delete_media(&self, id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM MediaTags WHERE media_id = ?", [id])?;
        tx.execute("DELETE FROM MediaPeople WHERE media_id = ?", [id])?;
        tx.execute("DELETE FROM Comments WHERE media_id = ?", [id])?;
        let deleted = tx.execute("DELETE FROM Media WHERE id = ?", [id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn get_archived_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT file_path FROM Media")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn get_media_types(&self) -> Result<Vec<LookupEntry>> {
        self.lookup_list("MediaTypes")
    }

    pub fn get_source_types(&self) -> Result<Vec<LookupEntry>> {
        self.lookup_list("SourceTypes")
    }

    pub fn get_tags(&self) -> Result<Vec<LookupEntry>> {
        self.lookup_list("Tags")
    }

    pub fn get_people(&self) -> Result<Vec<LookupEntry>> {
        self.lookup_list("People")
    }

    pub fn get_collections(&self) -> Result<Vec<Collection>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM Collections ORDER BY name")?;
        let collections = stmt
            .query_map([], |row| {
                Ok(Collection { id: row.get(0)?, name: row.get(1)?, description: row.get(2)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(collections)
    }

    fn lookup_list(&self, table: &'static str) -> Result<Vec<LookupEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id, name FROM {table} ORDER BY name"))?;
        let entries = stmt
            .query_map([], |row| Ok(LookupEntry { id: row.get(0)?, name: row.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn add_tag(&self, name: &str) -> Result<i64> {
        self.find_or_create("Tags", "tag", name)
    }

    pub fn add_person(&self, name: &str) -> Result<i64> {
        self.find_or_create("People", "person", name)
    }

    /// Existing id for an exact (case-sensitive) name match, else a new row.
    fn find_or_create(&self, table: &'static str, kind: &'static str, name: &str) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(CatalogError::EmptyName { kind }.into());
        }
        let existing = self.conn.query_row(
            &format!("SELECT id FROM {table} WHERE name = ?"),
            [name],
            |row| row.get(0),
        );
        match existing {
            Ok(id) => Ok(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                self.conn
                    .execute(&format!("INSERT INTO {table} (name) VALUES (?)"), [name])?;
                Ok(self.conn.last_insert_rowid())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Existing id for an exact name match (description untouched), else a
    /// new collection.
    pub fn add_collection(&self, name: &str, description: Option<&str>) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(CatalogError::EmptyName { kind: "collection" }.into());
        }
        let existing = self.conn.query_row(
            "SELECT id FROM Collections WHERE name = ?",
            [name],
            |row| row.get(0),
        );
        match existing {
            Ok(id) => Ok(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                self.conn.execute(
                    "INSERT INTO Collections (name, description) VALUES (?, ?)",
                    params![name, description],
                )?;
                Ok(self.conn.last_insert_rowid())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Links
    // ========================================================================

    pub fn link_tag_to_media(&self, media_id: i64, tag_id: i64) -> Result<bool> {
        self.conn.execute(
            "INSERT OR IGNORE INTO MediaTags (media_id, tag_id) VALUES (?, ?)",
            params![media_id, tag_id],
        )?;
        Ok(true)
    }

    pub fn link_person_to_media(&self, media_id: i64, person_id: i64) -> Result<bool> {
        self.conn.execute(
            "INSERT OR IGNORE INTO MediaPeople (media_id, person_id) VALUES (?, ?)",
            params![media_id, person_id],
        )?;
        Ok(true)
    }

    pub fn unlink_tag_from_media(&self, media_id: i64, tag_id: i64) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM MediaTags WHERE media_id = ? AND tag_id = ?",
            params![media_id, tag_id],
        )?;
        Ok(removed > 0)
    }

    pub fn unlink_person_from_media(&self, media_id: i64, person_id: i64) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM MediaPeople WHERE media_id = ? AND person_id = ?",
            params![media_id, person_id],
        )?;
        Ok(removed > 0)
    }

    pub fn get_media_tags(&self, media_id: i64) -> Result<Vec<LookupEntry>> {
        self.linked_entries(
            r#"
            SELECT t.id, t.name
            FROM Tags t
            JOIN MediaTags mt ON mt.tag_id = t.id
            WHERE mt.media_id = ?
            ORDER BY t.name
            "#,
            media_id,
        )
    }

    pub fn get_media_people(&self, media_id: i64) -> Result<Vec<LookupEntry>> {
        self.linked_entries(
            r#"
            SELECT p.id, p.name
            FROM People p
            JOIN MediaPeople mp ON mp.person_id = p.id
            WHERE mp.media_id = ?
            ORDER BY p.name
            "#,
            media_id,
        )
    }

    fn linked_entries(&self, sql: &str, media_id: i64) -> Result<Vec<LookupEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let entries = stmt
            .query_map([media_id], |row| Ok(LookupEntry { id: row.get(0)?, name: row.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    // ========================================================================
    // Comments
    // ========================================================================

    pub fn add_comment(&self, media_id: i64, body: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO Comments (media_id, body) VALUES (?, ?)",
            params![media_id, body],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_comments(&self, media_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, media_id, body, created_at FROM Comments WHERE media_id = ? ORDER BY created_at, id",
        )?;
        let comments = stmt
            .query_map([media_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    media_id: row.get(1)?,
                    body: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(comments)
    }
}

fn row_to_media(row: &rusqlite::Row) -> rusqlite::Result<MediaRecord> {
    Ok(MediaRecord {
        id: row.get(0)?,
        file_name: row.get(1)?,
        file_path: row.get(2)?,
        thumbnail_path: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        media_type_id: row.get(6)?,
        source_type_id: row.get(7)?,
        capture_date: capture_date(row.get_ref(8)?),
        location: row.get(9)?,
        collection_id: row.get(10)?,
        created_at: row.get(11)?,
        media_type: row.get(12)?,
        source_type: row.get(13)?,
        collection_name: row.get(14)?,
    })
}

/// Lenient read of `capture_date`: a leading `YYYY-MM-DD` is enough, and
/// anything unreadable becomes `None` instead of failing the whole query.
fn capture_date(value: ValueRef<'_>) -> Option<NaiveDate> {
    let text = match value {
        ValueRef::Null => return None,
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes),
        other => {
            warn!("Ignoring capture_date stored as {}", other.data_type());
            return None;
        }
    };
    let date = text
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    if date.is_none() {
        warn!("Ignoring unreadable capture_date {:?}", text);
    }
    date
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn setup() -> SqliteDb {
        let db = SqliteDb::open_in_memory().unwrap();
        db.initialize_schema().unwrap();
        db.seed_defaults().unwrap();
        db
    }

    fn type_id(db: &SqliteDb, name: &str) -> i64 {
        db.get_media_types()
            .unwrap()
            .into_iter()
            .find(|t| t.name == name)
            .unwrap()
            .id
    }

    fn new_media(db: &SqliteDb, title: &str) -> NewMedia {
        NewMedia {
            file_name: format!("{title}.jpg"),
            file_path: format!("{title}_1700000000000_abc123.jpg"),
            title: title.to_string(),
            media_type_id: type_id(db, "Image"),
            ..Default::default()
        }
    }

    fn count(db: &SqliteDb, table: &str) -> i64 {
        db.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_seed_defaults() {
        let db = setup();

        let types: HashSet<String> = db.get_media_types().unwrap().into_iter().map(|t| t.name).collect();
        let expected: HashSet<String> = DEFAULT_MEDIA_TYPES.iter().map(|s| s.to_string()).collect();
        assert_eq!(types, expected);

        let sources: Vec<String> = db.get_source_types().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(sources.len(), 6);
        for name in DEFAULT_SOURCE_TYPES {
            assert!(sources.iter().any(|s| s == name));
        }

        let collections = db.get_collections().unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].name, "General");
    }

    #[test]
    fn test_seed_is_idempotent_and_completes_partial() {
        let db = SqliteDb::open_in_memory().unwrap();
        db.initialize_schema().unwrap();
        db.conn.execute("INSERT INTO MediaTypes (name) VALUES ('Image')", []).unwrap();

        db.seed_defaults().unwrap();
        db.seed_defaults().unwrap();
        db.initialize_schema().unwrap();

        assert_eq!(count(&db, "MediaTypes"), 1);
        assert_eq!(count(&db, "SourceTypes"), 6);
        assert_eq!(count(&db, "Collections"), 1);
    }

    #[test]
    fn test_lookups_are_name_sorted() {
        let db = setup();
        let names: Vec<String> = db.get_media_types().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Audio", "Document", "Image", "Video"]);
    }

    #[test]
    fn test_add_tag_and_person_get_or_create() {
        let db = setup();
        let first = db.add_tag("beach").unwrap();
        let second = db.add_tag("beach").unwrap();
        assert_eq!(first, second);
        assert_eq!(count(&db, "Tags"), 1);

        // Exact match only
        let upper = db.add_tag("Beach").unwrap();
        assert_ne!(first, upper);

        let alice = db.add_person("Alice").unwrap();
        assert_eq!(alice, db.add_person("Alice").unwrap());
        assert_eq!(db.get_people().unwrap().len(), 1);
    }

    #[test]
    fn test_blank_names_rejected() {
        let db = setup();
        let err = db.add_tag("   ").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::EmptyName { kind: "tag" })
        ));
        assert!(db.add_person("").is_err());
        assert!(db.add_collection("", None).is_err());
    }

    #[test]
    fn test_add_collection_dedupes() {
        let db = setup();
        let first = db.add_collection("Trips", Some("")).unwrap();
        let second = db.add_collection("Trips", Some("")).unwrap();
        assert_eq!(first, second);

        let trips: Vec<_> = db
            .get_collections()
            .unwrap()
            .into_iter()
            .filter(|c| c.name == "Trips")
            .collect();
        assert_eq!(trips.len(), 1);
    }

    #[test]
    fn test_add_then_get_round_trip() {
        let db = setup();
        let collection_id = db.add_collection("Trips", Some("Holidays")).unwrap();
        let source_id = db.get_source_types().unwrap()[0].id;
        let input = NewMedia {
            file_name: "photo_1700000000000_a1b2c3.jpg".to_string(),
            file_path: "photo_1700000000000_a1b2c3.jpg".to_string(),
            thumbnail_path: None,
            title: "Sunset".to_string(),
            description: Some("Over the bay".to_string()),
            media_type_id: type_id(&db, "Video"),
            source_type_id: Some(source_id),
            capture_date: NaiveDate::from_ymd_opt(2023, 7, 14),
            location: Some("Lisbon".to_string()),
            collection_id: Some(collection_id),
        };

        let id = db.add_media(&input).unwrap();
        let stored = db.get_media_by_id(id).unwrap().unwrap();

        assert_eq!(stored.file_name, input.file_name);
        assert_eq!(stored.file_path, input.file_path);
        assert_eq!(stored.title, input.title);
        assert_eq!(stored.description, input.description);
        assert_eq!(stored.media_type_id, input.media_type_id);
        assert_eq!(stored.source_type_id, input.source_type_id);
        assert_eq!(stored.capture_date, input.capture_date);
        assert_eq!(stored.location, input.location);
        assert_eq!(stored.collection_id, input.collection_id);
        assert_eq!(stored.media_type.as_deref(), Some("Video"));
        assert_eq!(stored.collection_name.as_deref(), Some("Trips"));
        assert!(stored.source_type.is_some());
        assert!(!stored.created_at.is_empty());
    }

    #[test]
    fn test_get_missing_media_is_none() {
        let db = setup();
        assert!(db.get_media_by_id(42).unwrap().is_none());
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let db = setup();
        let mut media = new_media(&db, "orphan");
        media.media_type_id = 999;
        assert!(db.add_media(&media).is_err());

        let mut media = new_media(&db, "orphan");
        media.collection_id = Some(999);
        assert!(db.add_media(&media).is_err());
        assert_eq!(count(&db, "Media"), 0);
    }

    #[test]
    fn test_link_twice_keeps_one_row() {
        let db = setup();
        let media_id = db.add_media(&new_media(&db, "a")).unwrap();
        let tag_id = db.add_tag("family").unwrap();
        let person_id = db.add_person("Bob").unwrap();

        assert!(db.link_tag_to_media(media_id, tag_id).unwrap());
        assert!(db.link_tag_to_media(media_id, tag_id).unwrap());
        assert!(db.link_person_to_media(media_id, person_id).unwrap());
        assert!(db.link_person_to_media(media_id, person_id).unwrap());

        assert_eq!(count(&db, "MediaTags"), 1);
        assert_eq!(count(&db, "MediaPeople"), 1);
        assert_eq!(db.get_media_tags(media_id).unwrap()[0].name, "family");
    }

    #[test]
    fn test_link_to_missing_media_fails() {
        let db = setup();
        let tag_id = db.add_tag("family").unwrap();
        assert!(db.link_tag_to_media(77, tag_id).is_err());
    }

    #[test]
    fn test_unlink() {
        let db = setup();
        let media_id = db.add_media(&new_media(&db, "a")).unwrap();
        let tag_id = db.add_tag("family").unwrap();
        db.link_tag_to_media(media_id, tag_id).unwrap();

        assert!(db.unlink_tag_from_media(media_id, tag_id).unwrap());
        assert!(!db.unlink_tag_from_media(media_id, tag_id).unwrap());
        assert!(db.get_media_tags(media_id).unwrap().is_empty());
    }

    #[test]
    fn test_update_media() {
        let db = setup();
        let id = db.add_media(&new_media(&db, "before")).unwrap();
        let update = MediaUpdate {
            title: "after".to_string(),
            description: Some("edited".to_string()),
            media_type_id: type_id(&db, "Document"),
            capture_date: NaiveDate::from_ymd_opt(2020, 2, 29),
            location: Some("Porto".to_string()),
            ..Default::default()
        };

        assert!(db.update_media(id, &update).unwrap());
        let stored = db.get_media_by_id(id).unwrap().unwrap();
        assert_eq!(stored.title, "after");
        assert_eq!(stored.media_type.as_deref(), Some("Document"));
        assert_eq!(stored.capture_date, NaiveDate::from_ymd_opt(2020, 2, 29));
        assert_eq!(stored.location.as_deref(), Some("Porto"));

        assert!(!db.update_media(id + 100, &update).unwrap());
    }

    #[test]
    fn test_delete_media_cascades() {
        let db = setup();
        let keep = db.add_media(&new_media(&db, "keep")).unwrap();
        let gone = db.add_media(&new_media(&db, "gone")).unwrap();

        for name in ["a", "b", "c"] {
            let tag = db.add_tag(name).unwrap();
            db.link_tag_to_media(gone, tag).unwrap();
            db.link_tag_to_media(keep, tag).unwrap();
        }
        for name in ["Ann", "Ben"] {
            let person = db.add_person(name).unwrap();
            db.link_person_to_media(gone, person).unwrap();
        }
        db.add_comment(gone, "nice").unwrap();
        db.add_comment(gone, "again").unwrap();
        db.add_comment(keep, "stays").unwrap();

        assert!(db.delete_media(gone).unwrap());

        assert_eq!(count(&db, "Media"), 1);
        assert_eq!(count(&db, "MediaTags"), 3);
        assert_eq!(count(&db, "MediaPeople"), 0);
        assert_eq!(count(&db, "Comments"), 1);
        // Lookup rows are never garbage collected
        assert_eq!(count(&db, "Tags"), 3);
        assert_eq!(count(&db, "People"), 2);

        assert!(!db.delete_media(gone).unwrap());
    }

    #[test]
    fn test_delete_media_rolls_back_on_failure() {
        let db = setup();
        let id = db.add_media(&new_media(&db, "locked")).unwrap();
        let tag = db.add_tag("t").unwrap();
        let person = db.add_person("p").unwrap();
        db.link_tag_to_media(id, tag).unwrap();
        db.link_person_to_media(id, person).unwrap();
        db.add_comment(id, "c").unwrap();

        db.conn
            .execute_batch(
                "CREATE TRIGGER block_media_delete BEFORE DELETE ON Media
                 BEGIN SELECT RAISE(ABORT, 'blocked'); END;",
            )
            .unwrap();

        assert!(db.delete_media(id).is_err());
        assert_eq!(count(&db, "Media"), 1);
        assert_eq!(count(&db, "MediaTags"), 1);
        assert_eq!(count(&db, "MediaPeople"), 1);
        assert_eq!(count(&db, "Comments"), 1);
    }

    #[test]
    fn test_get_all_media_newest_first() {
        let db = setup();
        let first = db.add_media(&new_media(&db, "first")).unwrap();
        let second = db.add_media(&new_media(&db, "second")).unwrap();
        db.conn
            .execute("UPDATE Media SET created_at = '2020-01-01 00:00:00' WHERE id = ?", [second])
            .unwrap();
        let third = db.add_media(&new_media(&db, "third")).unwrap();

        let ids: Vec<i64> = db.get_all_media().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![third, first, second]);
    }

    #[test]
    fn test_search_requires_all_tags() {
        let db = setup();
        let both = db.add_media(&new_media(&db, "both")).unwrap();
        let only_one = db.add_media(&new_media(&db, "one")).unwrap();
        let t1 = db.add_tag("t1").unwrap();
        let t2 = db.add_tag("t2").unwrap();
        db.link_tag_to_media(both, t1).unwrap();
        db.link_tag_to_media(both, t2).unwrap();
        db.link_tag_to_media(only_one, t1).unwrap();

        let criteria = SearchCriteria { tag_ids: vec![t1, t2], ..Default::default() };
        let ids: Vec<i64> = db.search_media(&criteria).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![both]);

        let criteria = SearchCriteria { tag_ids: vec![t1], ..Default::default() };
        assert_eq!(db.search_media(&criteria).unwrap().len(), 2);
    }

    #[test]
    fn test_search_requires_all_people() {
        let db = setup();
        let group = db.add_media(&new_media(&db, "group")).unwrap();
        let solo = db.add_media(&new_media(&db, "solo")).unwrap();
        let ann = db.add_person("Ann").unwrap();
        let ben = db.add_person("Ben").unwrap();
        db.link_person_to_media(group, ann).unwrap();
        db.link_person_to_media(group, ben).unwrap();
        db.link_person_to_media(solo, ben).unwrap();

        let criteria = SearchCriteria { person_ids: vec![ann, ben], ..Default::default() };
        let ids: Vec<i64> = db.search_media(&criteria).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![group]);
    }

    #[test]
    fn test_empty_search_matches_get_all() {
        let db = setup();
        for title in ["a", "b", "c"] {
            db.add_media(&new_media(&db, title)).unwrap();
        }
        assert_eq!(
            db.search_media(&SearchCriteria::default()).unwrap(),
            db.get_all_media().unwrap()
        );
    }

    #[test]
    fn test_search_text_and_filters() {
        let db = setup();
        let mut beach = new_media(&db, "Beach day");
        beach.capture_date = NaiveDate::from_ymd_opt(2022, 8, 1);
        let beach = db.add_media(&beach).unwrap();

        let mut city = new_media(&db, "Downtown");
        city.location = Some("Old BEACH road".to_string());
        city.media_type_id = type_id(&db, "Video");
        city.capture_date = NaiveDate::from_ymd_opt(2023, 1, 5);
        let city = db.add_media(&city).unwrap();

        let mut other = new_media(&db, "Garden");
        other.description = Some("100% roses".to_string());
        let other = db.add_media(&other).unwrap();

        let hits = |criteria: SearchCriteria| -> Vec<i64> {
            let mut ids: Vec<i64> = db.search_media(&criteria).unwrap().into_iter().map(|m| m.id).collect();
            ids.sort();
            ids
        };

        assert_eq!(hits(SearchCriteria { text: Some("beach".into()), ..Default::default() }), vec![beach, city]);
        assert_eq!(
            hits(SearchCriteria {
                text: Some("beach".into()),
                media_type_id: Some(type_id(&db, "Video")),
                ..Default::default()
            }),
            vec![city]
        );
        assert_eq!(
            hits(SearchCriteria {
                date_from: NaiveDate::from_ymd_opt(2023, 1, 1),
                ..Default::default()
            }),
            vec![city]
        );
        assert_eq!(hits(SearchCriteria { text: Some("0%".into()), ..Default::default() }), vec![other]);
        assert_eq!(hits(SearchCriteria { location: Some("road".into()), ..Default::default() }), vec![city]);
    }

    #[test]
    fn test_bad_capture_date_does_not_hide_catalog() {
        let db = setup();
        let mut good = new_media(&db, "good");
        good.capture_date = NaiveDate::from_ymd_opt(2022, 3, 4);
        let good = db.add_media(&good).unwrap();
        let stamped = db.add_media(&new_media(&db, "stamped")).unwrap();
        let garbled = db.add_media(&new_media(&db, "garbled")).unwrap();
        db.conn
            .execute("UPDATE Media SET capture_date = '2023-05-01T10:00:00' WHERE id = ?", [stamped])
            .unwrap();
        db.conn
            .execute("UPDATE Media SET capture_date = 'last summer' WHERE id = ?", [garbled])
            .unwrap();

        let all = db.get_all_media().unwrap();
        assert_eq!(all.len(), 3);
        let date_of = |id: i64| all.iter().find(|m| m.id == id).unwrap().capture_date;
        assert_eq!(date_of(good), NaiveDate::from_ymd_opt(2022, 3, 4));
        assert_eq!(date_of(stamped), NaiveDate::from_ymd_opt(2023, 5, 1));
        assert_eq!(date_of(garbled), None);
        assert_eq!(db.search_media(&SearchCriteria::default()).unwrap().len(), 3);
    }

    #[test]
    fn test_search_text_folds_non_ascii_case() {
        let db = setup();
        let paris = db.add_media(&new_media(&db, "Été à Paris")).unwrap();
        db.add_media(&new_media(&db, "Winter")).unwrap();

        for text in ["été", "ÉTÉ", "à paris"] {
            let criteria = SearchCriteria { text: Some(text.into()), ..Default::default() };
            let ids: Vec<i64> = db.search_media(&criteria).unwrap().into_iter().map(|m| m.id).collect();
            assert_eq!(ids, vec![paris], "query {text:?}");
        }
    }

    #[test]
    fn test_add_media_with_links_is_atomic() {
        let db = setup();
        let tag = db.add_tag("beach").unwrap();
        let person = db.add_person("Ann").unwrap();

        let id = db.add_media_with_links(&new_media(&db, "ok"), &[tag, tag], &[person]).unwrap();
        assert_eq!(db.get_media_tags(id).unwrap().len(), 1);
        assert_eq!(db.get_media_people(id).unwrap()[0].id, person);

        assert!(db.add_media_with_links(&new_media(&db, "bad"), &[tag, 999], &[]).is_err());
        assert!(db.add_media_with_links(&new_media(&db, "bad"), &[], &[999]).is_err());
        assert_eq!(count(&db, "Media"), 1);
        assert_eq!(count(&db, "MediaTags"), 1);
        assert_eq!(count(&db, "MediaPeople"), 1);
    }

    #[test]
    fn test_search_pagination() {
        let db = setup();
        let ids: Vec<i64> = (0..5)
            .map(|i| db.add_media(&new_media(&db, &format!("m{i}"))).unwrap())
            .collect();

        let page = SearchCriteria { limit: Some(2), offset: Some(1), ..Default::default() };
        let got: Vec<i64> = db.search_media(&page).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(got, vec![ids[3], ids[2]]);

        let tail = SearchCriteria { offset: Some(4), ..Default::default() };
        assert_eq!(db.search_media(&tail).unwrap().len(), 1);
    }

    #[test]
    fn test_initialize_schema_from_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("create-database.sql");
        std::fs::write(&script, "CREATE TABLE Extra (id INTEGER PRIMARY KEY);").unwrap();

        let db = SqliteDb::open(&dir.path().join("catalog.db")).unwrap();
        db.initialize_schema_from(&script).unwrap();
        db.seed_defaults().unwrap();

        assert_eq!(count(&db, "Extra"), 0);
        assert_eq!(count(&db, "MediaTypes"), 4);

        // Missing script falls back to the built-in schema
        let db = SqliteDb::open_in_memory().unwrap();
        db.initialize_schema_from(&dir.path().join("missing.sql")).unwrap();
        assert_eq!(count(&db, "Media"), 0);
    }

    #[test]
    fn test_comments_round_trip() {
        let db = setup();
        let id = db.add_media(&new_media(&db, "a")).unwrap();
        db.add_comment(id, "first").unwrap();
        db.add_comment(id, "second").unwrap();
        let bodies: Vec<String> = db.get_comments(id).unwrap().into_iter().map(|c| c.body).collect();
        assert_eq!(bodies, vec!["first", "second"]);
    }
}
