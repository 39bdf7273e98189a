// Mapping cache
//
// Persistent canonical-id -> content-source-id mappings. Entries are created
// lazily on the first successful resolution and deleted when they go stale.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

/// One resolved mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct IdMapping {
    pub canonical_id: String,
    pub content_source_id: String,
    pub media_type: String,
    pub title: Option<String>,
    pub match_score: Option<f64>,
}

impl IdMapping {
    pub fn new(canonical_id: &str, content_source_id: &str, media_type: &str) -> Self {
        Self {
            canonical_id: canonical_id.to_string(),
            content_source_id: content_source_id.to_string(),
            media_type: media_type.to_string(),
            title: None,
            match_score: None,
        }
    }

    pub fn with_match(mut self, title: &str, score: Option<f64>) -> Self {
        self.title = Some(title.to_string());
        self.match_score = score;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("DB error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Mapping cache lock poisoned")]
    Poisoned,
}

/// Storage for id mappings. Keys are `(canonical_id, media_type)` since anime
/// and manga ids live in separate canonical namespaces.
pub trait MappingCache: Send + Sync {
    fn get(
        &self,
        canonical_id: &str,
        media_type: &str,
    ) -> impl Future<Output = Result<Option<IdMapping>, CacheError>> + Send;

    fn save(&self, mapping: &IdMapping) -> impl Future<Output = Result<(), CacheError>> + Send;

    fn delete(&self, canonical_id: &str, media_type: &str) -> impl Future<Output = Result<(), CacheError>> + Send;
}

/// Process-local cache, mostly for tests and short-lived hosts
#[derive(Debug, Default)]
pub struct MemoryMappingCache {
    entries: Mutex<HashMap<(String, String), IdMapping>>,
}

impl MemoryMappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded cache
    pub fn with_mappings(mappings: impl IntoIterator<Item = IdMapping>) -> Self {
        let entries = mappings
            .into_iter()
            .map(|m| ((m.canonical_id.clone(), m.media_type.clone()), m))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MappingCache for MemoryMappingCache {
    async fn get(&self, canonical_id: &str, media_type: &str) -> Result<Option<IdMapping>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries
            .get(&(canonical_id.to_string(), media_type.to_string()))
            .cloned())
    }

    async fn save(&self, mapping: &IdMapping) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(
            (mapping.canonical_id.clone(), mapping.media_type.clone()),
            mapping.clone(),
        );
        Ok(())
    }

    async fn delete(&self, canonical_id: &str, media_type: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.remove(&(canonical_id.to_string(), media_type.to_string()));
        Ok(())
    }
}

/// SQLite-backed cache using the `id_mappings` table
#[derive(Debug, Clone)]
pub struct SqliteMappingCache {
    pool: SqlitePool,
}

impl SqliteMappingCache {
    /// Wrap a pool and make sure the table exists
    pub async fn init(pool: SqlitePool) -> Result<Self, CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS id_mappings (
                mal_id TEXT NOT NULL,
                allanime_id TEXT NOT NULL,
                media_type TEXT NOT NULL,
                title TEXT,
                match_score REAL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (mal_id, media_type)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl MappingCache for SqliteMappingCache {
    async fn get(&self, canonical_id: &str, media_type: &str) -> Result<Option<IdMapping>, CacheError> {
        let mapping = sqlx::query_as::<_, IdMapping>(
            r#"
            SELECT mal_id AS canonical_id, allanime_id AS content_source_id, media_type, title, match_score
            FROM id_mappings
            WHERE mal_id = ? AND media_type = ?
            "#,
        )
        .bind(canonical_id)
        .bind(media_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    async fn save(&self, mapping: &IdMapping) -> Result<(), CacheError> {
        sqlx::query(
            "INSERT OR REPLACE INTO id_mappings (mal_id, allanime_id, media_type, title, match_score) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&mapping.canonical_id)
        .bind(&mapping.content_source_id)
        .bind(&mapping.media_type)
        .bind(&mapping.title)
        .bind(mapping.match_score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, canonical_id: &str, media_type: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM id_mappings WHERE mal_id = ? AND media_type = ?")
            .bind(canonical_id)
            .bind(media_type)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
