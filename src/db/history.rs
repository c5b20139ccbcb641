//! Play history repository
//!
//! Every track announcement is recorded as a `played` row keyed by the
//! announcement message id, so a later reaction on that message can find
//! the track again. Favorites are separate `favorite` rows. Rows are never
//! updated or deleted.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DbPool;
use crate::{Error, Result};

/// Kind of history row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Played,
    Favorite,
}

impl HistoryKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Played => "played",
            Self::Favorite => "favorite",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "played" => Some(Self::Played),
            "favorite" => Some(Self::Favorite),
            _ => None,
        }
    }
}

/// A persisted track announcement or favorite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub id: String,
    pub channel_id: String,
    pub message_id: String,
    pub url: String,
    pub author_id: String,
    pub kind: HistoryKind,
    pub title: Option<String>,
    pub favorited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// A track announced in `channel_id` by message `message_id`
    #[must_use]
    pub fn played(
        channel_id: &str,
        message_id: &str,
        url: &str,
        author_id: &str,
        title: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            url: url.to_string(),
            author_id: author_id.to_string(),
            kind: HistoryKind::Played,
            title,
            favorited_at: None,
            created_at: Utc::now(),
        }
    }

    /// A favorite of the track announced by `source`, made by `author_id`
    #[must_use]
    pub fn favorite(source: &Self, author_id: &str, title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id: source.channel_id.clone(),
            message_id: source.message_id.clone(),
            url: source.url.clone(),
            author_id: author_id.to_string(),
            kind: HistoryKind::Favorite,
            title: title.or_else(|| source.title.clone()),
            favorited_at: Some(now),
            created_at: now,
        }
    }
}

/// Exact-match filter over history rows; `None` fields match anything
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub message_id: Option<String>,
    pub author_id: Option<String>,
    pub url: Option<String>,
    pub kind: Option<HistoryKind>,
}

impl HistoryQuery {
    /// Rows for the announcement message `message_id`
    #[must_use]
    pub fn message(message_id: &str) -> Self {
        Self {
            message_id: Some(message_id.to_string()),
            ..Self::default()
        }
    }

    /// Favorites made by `author_id`
    #[must_use]
    pub fn favorites_of(author_id: &str) -> Self {
        Self {
            author_id: Some(author_id.to_string()),
            kind: Some(HistoryKind::Favorite),
            ..Self::default()
        }
    }
}

/// History repository for one collection (an extension's name)
#[derive(Clone)]
pub struct HistoryStore {
    pool: DbPool,
    collection: String,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Create a history store for `collection`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the collection name is empty
    pub fn new(pool: DbPool, collection: &str) -> Result<Self> {
        if collection.trim().is_empty() {
            return Err(Error::Config(
                "extension must be named to use the database".to_string(),
            ));
        }

        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    /// Collection name
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Insert a record
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn insert(&self, record: &HistoryRecord) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO history (id, collection, channel_id, message_id, url, author_id, kind, title, favorited_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                record.id,
                self.collection,
                record.channel_id,
                record.message_id,
                record.url,
                record.author_id,
                record.kind.as_str(),
                record.title,
                record.favorited_at.map(|t| t.to_rfc3339()),
                record.created_at.to_rfc3339(),
            ],
        )?;

        tracing::debug!(
            collection = %self.collection,
            message_id = %record.message_id,
            kind = record.kind.as_str(),
            "history record inserted"
        );
        Ok(())
    }

    /// Find records matching every set field of `query`, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut sql = String::from(
            "SELECT id, channel_id, message_id, url, author_id, kind, title, favorited_at, created_at
             FROM history WHERE collection = ?1",
        );
        let mut values = vec![self.collection.clone()];

        let filters = [
            ("message_id", query.message_id.clone()),
            ("author_id", query.author_id.clone()),
            ("url", query.url.clone()),
            ("kind", query.kind.map(|k| k.as_str().to_string())),
        ];
        for (column, value) in filters {
            if let Some(value) = value {
                values.push(value);
                sql.push_str(&format!(" AND {column} = ?{}", values.len()));
            }
        }
        sql.push_str(" ORDER BY created_at ASC, rowid ASC");

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                let kind: String = row.get(5)?;
                Ok(HistoryRecord {
                    id: row.get(0)?,
                    channel_id: row.get(1)?,
                    message_id: row.get(2)?,
                    url: row.get(3)?,
                    author_id: row.get(4)?,
                    kind: HistoryKind::from_str(&kind).unwrap_or(HistoryKind::Played),
                    title: row.get(6)?,
                    favorited_at: row
                        .get::<_, Option<String>>(7)?
                        .map(|s| parse_datetime(&s)),
                    created_at: parse_datetime(&row.get::<_, String>(8)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// First record for the announcement message `message_id`
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_by_message(&self, message_id: &str) -> Result<Option<HistoryRecord>> {
        Ok(self.find(&HistoryQuery::message(message_id))?.into_iter().next())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn setup() -> HistoryStore {
        HistoryStore::new(init_memory().unwrap(), "MusicBot").unwrap()
    }

    #[test]
    fn test_unnamed_collection_is_rejected() {
        let pool = init_memory().unwrap();
        assert!(matches!(HistoryStore::new(pool, ""), Err(Error::Config(_))));
    }

    #[test]
    fn test_insert_and_find_by_message() {
        let store = setup();
        let record = HistoryRecord::played(
            "chan-1",
            "msg-1",
            "https://youtu.be/a",
            "user-1",
            Some("Track A".to_string()),
        );
        store.insert(&record).unwrap();

        let found = store.find_by_message("msg-1").unwrap().unwrap();
        assert_eq!(found.url, "https://youtu.be/a");
        assert_eq!(found.author_id, "user-1");
        assert_eq!(found.kind, HistoryKind::Played);
        assert_eq!(found.title.as_deref(), Some("Track A"));
        assert!(found.favorited_at.is_none());

        assert!(store.find_by_message("msg-2").unwrap().is_none());
    }

    #[test]
    fn test_favorites_of_filters_kind_and_author() {
        let store = setup();
        let played = HistoryRecord::played("c", "m1", "https://youtu.be/a", "dj", None);
        store.insert(&played).unwrap();
        store
            .insert(&HistoryRecord::favorite(&played, "fan", Some("Track A".to_string())))
            .unwrap();
        store
            .insert(&HistoryRecord::favorite(&played, "other", None))
            .unwrap();

        let favorites = store.find(&HistoryQuery::favorites_of("fan")).unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].kind, HistoryKind::Favorite);
        assert_eq!(favorites[0].message_id, "m1");
        assert!(favorites[0].favorited_at.is_some());

        // Both rows share the announcement id
        assert_eq!(store.find(&HistoryQuery::message("m1")).unwrap().len(), 3);
    }

    #[test]
    fn test_collections_are_isolated() {
        let pool = init_memory().unwrap();
        let music = HistoryStore::new(pool.clone(), "MusicBot").unwrap();
        let other = HistoryStore::new(pool, "Other").unwrap();

        music
            .insert(&HistoryRecord::played("c", "m1", "https://youtu.be/a", "u", None))
            .unwrap();

        assert!(music.find_by_message("m1").unwrap().is_some());
        assert!(other.find_by_message("m1").unwrap().is_none());
    }
}
