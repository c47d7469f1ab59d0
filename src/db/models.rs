//! Row and request types for the catalog.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A `{id, name}` lookup row (media type, source type, tag, person).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A Media row joined with the display names of its lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: i64,
    pub file_name: String,
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub media_type_id: i64,
    pub source_type_id: Option<i64>,
    pub capture_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub collection_id: Option<i64>,
    pub created_at: String,
    pub media_type: Option<String>,
    pub source_type: Option<String>,
    pub collection_name: Option<String>,
}

/// Everything needed to insert a Media row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMedia {
    pub file_name: String,
    /// Path relative to the archive directory.
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub media_type_id: i64,
    pub source_type_id: Option<i64>,
    pub capture_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub collection_id: Option<i64>,
}

/// The mutable subset of a Media row. Every field is written on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUpdate {
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
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub media_id: i64,
    pub body: String,
    pub created_at: String,
}

/// A reference to a tag, person or collection chosen in the UI.
///
/// `Pending` entries have no row yet; the data layer creates (or finds) them
/// when the owning media is saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntityRef {
    Existing {
        id: i64,
    },
    Pending {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl EntityRef {
    pub fn existing(id: i64) -> Self {
        EntityRef::Existing { id }
    }

    pub fn pending(name: impl Into<String>) -> Self {
        EntityRef::Pending { name: name.into(), description: None }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    Title,
    Type,
}

/// Filters for `search_media`. Absent or empty fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchCriteria {
    /// Substring matched against title, description and location.
    pub text: Option<String>,
    /// Substring matched against location only.
    pub location: Option<String>,
    pub media_type_id: Option<i64>,
    pub source_type_id: Option<i64>,
    pub collection_id: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Media must be linked to every one of these tags.
    pub tag_ids: Vec<i64>,
    /// Media must be linked to every one of these people.
    pub person_ids: Vec<i64>,
    pub sort: SortOrder,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}
