pub const SCHEMA: &str = r#"
-- Lookup: kind of media (Image, Video, ...)
CREATE TABLE IF NOT EXISTS MediaTypes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- Lookup: where the media came from (Phone, Scanned Photo, ...)
CREATE TABLE IF NOT EXISTS SourceTypes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS Collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS Tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS People (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- One row per archived file
CREATE TABLE IF NOT EXISTS Media (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name TEXT NOT NULL,
    file_path TEXT NOT NULL,           -- relative to the archive directory
    thumbnail_path TEXT,
    title TEXT NOT NULL,
    description TEXT,
    media_type_id INTEGER NOT NULL,
    source_type_id INTEGER,
    capture_date TEXT,                 -- YYYY-MM-DD
    location TEXT,
    collection_id INTEGER,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (media_type_id) REFERENCES MediaTypes(id),
    FOREIGN KEY (source_type_id) REFERENCES SourceTypes(id),
    FOREIGN KEY (collection_id) REFERENCES Collections(id)
);

CREATE INDEX IF NOT EXISTS idx_media_created_at ON Media(created_at);
CREATE INDEX IF NOT EXISTS idx_media_capture_date ON Media(capture_date);
CREATE INDEX IF NOT EXISTS idx_media_collection ON Media(collection_id);

-- Join tables carry no ON DELETE CASCADE; delete_media clears them explicitly
CREATE TABLE IF NOT EXISTS MediaTags (
    media_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (media_id, tag_id),
    FOREIGN KEY (media_id) REFERENCES Media(id),
    FOREIGN KEY (tag_id) REFERENCES Tags(id)
);

CREATE INDEX IF NOT EXISTS idx_media_tags_tag ON MediaTags(tag_id);

CREATE TABLE IF NOT EXISTS MediaPeople (
    media_id INTEGER NOT NULL,
    person_id INTEGER NOT NULL,
    PRIMARY KEY (media_id, person_id),
    FOREIGN KEY (media_id) REFERENCES Media(id),
    FOREIGN KEY (person_id) REFERENCES People(id)
);

CREATE INDEX IF NOT EXISTS idx_media_people_person ON MediaPeople(person_id);

CREATE TABLE IF NOT EXISTS Comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    media_id INTEGER NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (media_id) REFERENCES Media(id)
);

CREATE INDEX IF NOT EXISTS idx_comments_media ON Comments(media_id);
"#;

pub const DEFAULT_MEDIA_TYPES: &[&str] = &["Image", "Video", "Document", "Audio"];

pub const DEFAULT_SOURCE_TYPES: &[&str] = &[
    "Digital Camera",
    "Phone",
    "Scanned Photo",
    "Scanned Document",
    "Internet",
    "Other",
];

pub const DEFAULT_COLLECTION: &str = "General";
pub const DEFAULT_COLLECTION_DESCRIPTION: &str = "Default collection";
