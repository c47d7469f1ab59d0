//! Builder for the media search query.
//!
//! Predicates are accumulated as SQL fragments over fixed column names, with
//! every user-supplied value carried as a bound parameter.

use rusqlite::types::Value;

use super::models::{SearchCriteria, SortOrder};

/// Unicode-aware lowercasing function registered on every connection.
pub(crate) const LOWER_FN: &str = "unicode_lower";

/// Base select shared by `get_all_media` and `search_media`.
pub(crate) const MEDIA_SELECT: &str = r#"
SELECT m.id, m.file_name, m.file_path, m.thumbnail_path, m.title, m.description,
       m.media_type_id, m.source_type_id, m.capture_date, m.location, m.collection_id,
       m.created_at,
       mt.name AS media_type, st.name AS source_type, c.name AS collection_name
FROM Media m
LEFT JOIN MediaTypes mt ON m.media_type_id = mt.id
LEFT JOIN SourceTypes st ON m.source_type_id = st.id
LEFT JOIN Collections c ON m.collection_id = c.id"#;

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    clauses: Vec<String>,
    params: Vec<Value>,
    sort: SortOrder,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_criteria(criteria: &SearchCriteria) -> Self {
        let mut query = Self::new().sort(criteria.sort);

        if let Some(text) = &criteria.text {
            query = query.text(text);
        }
        if let Some(location) = &criteria.location {
            query = query.location(location);
        }
        if let Some(id) = criteria.media_type_id {
            query = query.media_type(id);
        }
        if let Some(id) = criteria.source_type_id {
            query = query.source_type(id);
        }
        if let Some(id) = criteria.collection_id {
            query = query.collection(id);
        }
        if let Some(from) = criteria.date_from {
            query.push("m.capture_date >= ?", vec![date_value(from)]);
        }
        if let Some(to) = criteria.date_to {
            query.push("m.capture_date <= ?", vec![date_value(to)]);
        }

        query
            .with_all_tags(&criteria.tag_ids)
            .with_all_people(&criteria.person_ids)
            .page(criteria.limit, criteria.offset)
    }

    /// Case-insensitive substring over title, description and location.
    /// Case folding covers all of Unicode, not only ASCII.
    pub fn text(mut self, text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return self;
        }
        let pattern = Value::Text(like_pattern(&text.to_lowercase()));
        let clause = format!(
            "({} OR {} OR {})",
            folded_like("m.title"),
            folded_like("m.description"),
            folded_like("m.location")
        );
        self.push(&clause, vec![pattern.clone(), pattern.clone(), pattern]);
        self
    }

    pub fn location(mut self, location: &str) -> Self {
        let location = location.trim();
        if location.is_empty() {
            return self;
        }
        self.push(
            &folded_like("m.location"),
            vec![Value::Text(like_pattern(&location.to_lowercase()))],
        );
        self
    }

    pub fn media_type(mut self, id: i64) -> Self {
        self.push("m.media_type_id = ?", vec![Value::Integer(id)]);
        self
    }

    pub fn source_type(mut self, id: i64) -> Self {
        self.push("m.source_type_id = ?", vec![Value::Integer(id)]);
        self
    }

    pub fn collection(mut self, id: i64) -> Self {
        self.push("m.collection_id = ?", vec![Value::Integer(id)]);
        self
    }

    /// Restrict to media linked to every tag in `ids`.
    pub fn with_all_tags(mut self, ids: &[i64]) -> Self {
        self.all_linked("MediaTags", "tag_id", ids);
        self
    }

    /// Restrict to media linked to every person in `ids`.
    pub fn with_all_people(mut self, ids: &[i64]) -> Self {
        self.all_linked("MediaPeople", "person_id", ids);
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, limit: Option<u32>, offset: Option<u32>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Number of predicates added so far.
    pub fn predicate_count(&self) -> usize {
        self.clauses.len()
    }

    /// Render the SQL text and its parameters, in bind order.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut sql = String::from(MEDIA_SELECT);
        let mut params = self.params.clone();

        if !self.clauses.is_empty() {
            sql.push_str("\nWHERE ");
            sql.push_str(&self.clauses.join("\n  AND "));
        }

        sql.push_str("\nORDER BY ");
        sql.push_str(order_by(self.sort));

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str("\nLIMIT ? OFFSET ?");
                params.push(Value::Integer(limit.into()));
                params.push(Value::Integer(offset.into()));
            }
            (Some(limit), None) => {
                sql.push_str("\nLIMIT ?");
                params.push(Value::Integer(limit.into()));
            }
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded
            (None, Some(offset)) => {
                sql.push_str("\nLIMIT -1 OFFSET ?");
                params.push(Value::Integer(offset.into()));
            }
            (None, None) => {}
        }

        (sql, params)
    }

    fn push(&mut self, clause: &str, params: Vec<Value>) {
        self.clauses.push(clause.to_string());
        self.params.extend(params);
    }

    fn all_linked(&mut self, table: &'static str, column: &'static str, ids: &[i64]) {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return;
        }

        let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
        let clause = format!(
            "m.id IN (SELECT media_id FROM {table} WHERE {column} IN ({}) \
             GROUP BY media_id HAVING COUNT(DISTINCT {column}) = ?)",
            placeholders.join(", ")
        );
        let count = ids.len() as i64;
        let mut params: Vec<Value> = ids.into_iter().map(Value::Integer).collect();
        params.push(Value::Integer(count));
        self.push(&clause, params);
    }
}

fn order_by(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::Newest => "m.created_at DESC, m.id DESC",
        SortOrder::Oldest => "m.created_at ASC, m.id ASC",
        SortOrder::Title => "m.title COLLATE NOCASE ASC, m.id ASC",
        SortOrder::Type => "mt.name ASC, m.created_at DESC, m.id DESC",
    }
}

fn folded_like(column: &str) -> String {
    format!("{LOWER_FN}({column}) LIKE ? ESCAPE '\\'")
}

fn date_value(date: chrono::NaiveDate) -> Value {
    Value::Text(date.format("%Y-%m-%d").to_string())
}

/// Wrap `text` in `%...%`, escaping LIKE wildcards with a backslash.
fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
