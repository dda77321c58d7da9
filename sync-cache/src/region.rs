//! Versioned cache regions and their storage backends.
//!
//! A region is a named bucket of (request URL → stored response) pairs.
//! Region names embed a release version; activating a new version never
//! mutates an old region, it only deletes it. The trait keeps the cache
//! manager agnostic of where entries live: SQLite for the real thing, an
//! order-preserving in-memory map for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Errors surfaced by cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The underlying storage engine faulted.
    #[error("cache storage error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted entry no longer parses.
    #[error("corrupt cache entry {key}: {reason}")]
    Corrupt {
        /// Entry key that failed to parse.
        key: String,
        /// What failed.
        reason: String,
    },

    /// The network failed and no cached fallback exists.
    #[error("no cached fallback for {url}")]
    Unavailable {
        /// The request URL.
        url: String,
    },

    /// A fetch the strategy could not absorb failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] crate::fetcher::FetchError),
}

/// A response held in a cache region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content-Type header, when the origin sent one.
    pub content_type: Option<String>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl StoredResponse {
    /// Create a stored response.
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    /// The "accepted for later delivery" response handed to callers whose
    /// mutation was queued: 202 with `{"queued": true}`, deliberately
    /// distinct from a real success status.
    pub fn queued() -> Self {
        Self::new(202, Some("application/json"), br#"{"queued": true}"#.to_vec())
    }

    /// Whether the status is a 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for cache region storage backends.
///
/// Keys within a region keep insertion order: `keys()` returns oldest
/// first, which is what the bounded image region trims by. Re-putting an
/// existing key replaces the value without moving the entry.
#[async_trait]
pub trait RegionStore: Send + Sync {
    /// Insert or replace an entry.
    async fn put(
        &self,
        region: &str,
        key: &str,
        response: &StoredResponse,
    ) -> Result<(), CacheError>;

    /// Look up an entry.
    async fn get(&self, region: &str, key: &str) -> Result<Option<StoredResponse>, CacheError>;

    /// Remove an entry.
    ///
    /// Returns `Ok(true)` if removed, `Ok(false)` if not present.
    async fn delete(&self, region: &str, key: &str) -> Result<bool, CacheError>;

    /// All keys in a region, oldest insertion first.
    async fn keys(&self, region: &str) -> Result<Vec<String>, CacheError>;

    /// Number of entries in a region.
    async fn count(&self, region: &str) -> Result<u64, CacheError>;

    /// Drop a region and everything in it.
    async fn delete_region(&self, region: &str) -> Result<(), CacheError>;

    /// Names of all regions that currently hold entries.
    async fn region_names(&self) -> Result<Vec<String>, CacheError>;
}

/// SQLite-based region store.
///
/// Uses WAL mode for concurrent reads/writes; rowid order supplies the
/// per-region insertion order.
#[derive(Clone)]
pub struct SqliteRegionStore {
    pool: SqlitePool,
}

impl SqliteRegionStore {
    /// Open (creating on first use) the region store at the given path.
    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str(path.to_str().unwrap_or("offsync-cache.db"))
            .map_err(CacheError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(CacheError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory region store (for testing).
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(CacheError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(CacheError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                region TEXT NOT NULL,
                key TEXT NOT NULL,
                status INTEGER NOT NULL,
                content_type TEXT,
                body BLOB NOT NULL,
                PRIMARY KEY (region, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(CacheError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_region ON entries(region)")
            .execute(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        Ok(())
    }

    /// Close the store, releasing the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    status: i64,
    content_type: Option<String>,
    body: Vec<u8>,
}

#[async_trait]
impl RegionStore for SqliteRegionStore {
    async fn put(
        &self,
        region: &str,
        key: &str,
        response: &StoredResponse,
    ) -> Result<(), CacheError> {
        // ON CONFLICT UPDATE keeps the original rowid, so a refreshed
        // entry holds its place in insertion order.
        sqlx::query(
            r#"
            INSERT INTO entries (region, key, status, content_type, body)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(region, key) DO UPDATE SET
                status = excluded.status,
                content_type = excluded.content_type,
                body = excluded.body
            "#,
        )
        .bind(region)
        .bind(key)
        .bind(response.status as i64)
        .bind(&response.content_type)
        .bind(&response.body)
        .execute(&self.pool)
        .await
        .map_err(CacheError::Database)?;

        Ok(())
    }

    async fn get(&self, region: &str, key: &str) -> Result<Option<StoredResponse>, CacheError> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT status, content_type, body FROM entries WHERE region = ?1 AND key = ?2",
        )
        .bind(region)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(CacheError::Database)?;

        Ok(row.map(|r| StoredResponse {
            status: r.status as u16,
            content_type: r.content_type,
            body: r.body,
        }))
    }

    async fn delete(&self, region: &str, key: &str) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM entries WHERE region = ?1 AND key = ?2")
            .bind(region)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn keys(&self, region: &str) -> Result<Vec<String>, CacheError> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT key FROM entries WHERE region = ?1 ORDER BY rowid ASC")
                .bind(region)
                .fetch_all(&self.pool)
                .await
                .map_err(CacheError::Database)?;

        Ok(keys)
    }

    async fn count(&self, region: &str) -> Result<u64, CacheError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE region = ?1")
            .bind(region)
            .fetch_one(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        Ok(count as u64)
    }

    async fn delete_region(&self, region: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM entries WHERE region = ?1")
            .bind(region)
            .execute(&self.pool)
            .await
            .map_err(CacheError::Database)?;

        Ok(())
    }

    async fn region_names(&self) -> Result<Vec<String>, CacheError> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT region FROM entries ORDER BY region")
                .fetch_all(&self.pool)
                .await
                .map_err(CacheError::Database)?;

        Ok(names)
    }
}

/// In-memory region store for testing.
///
/// Preserves per-region insertion order. Not persistent - all entries are
/// lost when the store is dropped.
#[derive(Default, Clone)]
pub struct MemoryRegionStore {
    regions: Arc<Mutex<BTreeMap<String, Vec<(String, StoredResponse)>>>>,
}

impl MemoryRegionStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all regions.
    pub fn len(&self) -> usize {
        self.regions
            .lock()
            .unwrap()
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all regions.
    pub fn clear(&self) {
        self.regions.lock().unwrap().clear();
    }
}

#[async_trait]
impl RegionStore for MemoryRegionStore {
    async fn put(
        &self,
        region: &str,
        key: &str,
        response: &StoredResponse,
    ) -> Result<(), CacheError> {
        let mut regions = self.regions.lock().unwrap();
        let entries = regions.entry(region.to_string()).or_default();
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = response.clone(),
            None => entries.push((key.to_string(), response.clone())),
        }
        Ok(())
    }

    async fn get(&self, region: &str, key: &str) -> Result<Option<StoredResponse>, CacheError> {
        let regions = self.regions.lock().unwrap();
        Ok(regions.get(region).and_then(|entries| {
            entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, response)| response.clone())
        }))
    }

    async fn delete(&self, region: &str, key: &str) -> Result<bool, CacheError> {
        let mut regions = self.regions.lock().unwrap();
        match regions.get_mut(region) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|(k, _)| k != key);
                Ok(entries.len() < before)
            }
            None => Ok(false),
        }
    }

    async fn keys(&self, region: &str) -> Result<Vec<String>, CacheError> {
        let regions = self.regions.lock().unwrap();
        Ok(regions
            .get(region)
            .map(|entries| entries.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default())
    }

    async fn count(&self, region: &str) -> Result<u64, CacheError> {
        let regions = self.regions.lock().unwrap();
        Ok(regions.get(region).map(|entries| entries.len() as u64).unwrap_or(0))
    }

    async fn delete_region(&self, region: &str) -> Result<(), CacheError> {
        self.regions.lock().unwrap().remove(region);
        Ok(())
    }

    async fn region_names(&self) -> Result<Vec<String>, CacheError> {
        let regions = self.regions.lock().unwrap();
        Ok(regions.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(tag: &str) -> StoredResponse {
        StoredResponse::new(200, Some("text/plain"), tag.as_bytes().to_vec())
    }

    async fn stores() -> Vec<Box<dyn RegionStore>> {
        vec![
            Box::new(MemoryRegionStore::new()),
            Box::new(SqliteRegionStore::in_memory().await.unwrap()),
        ]
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        for store in stores().await {
            let value = response("hello");
            store.put("r1", "/a", &value).await.unwrap();

            assert_eq!(store.get("r1", "/a").await.unwrap(), Some(value));
            assert_eq!(store.get("r1", "/missing").await.unwrap(), None);
            assert_eq!(store.get("other", "/a").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn put_replaces_existing_entry() {
        for store in stores().await {
            store.put("r1", "/a", &response("v1")).await.unwrap();
            store.put("r1", "/a", &response("v2")).await.unwrap();

            let stored = store.get("r1", "/a").await.unwrap().unwrap();
            assert_eq!(stored.body, b"v2");
            assert_eq!(store.count("r1").await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn keys_are_insertion_ordered() {
        for store in stores().await {
            store.put("r1", "/c", &response("1")).await.unwrap();
            store.put("r1", "/a", &response("2")).await.unwrap();
            store.put("r1", "/b", &response("3")).await.unwrap();

            assert_eq!(store.keys("r1").await.unwrap(), vec!["/c", "/a", "/b"]);
        }
    }

    #[tokio::test]
    async fn replacing_an_entry_keeps_its_position() {
        for store in stores().await {
            store.put("r1", "/a", &response("1")).await.unwrap();
            store.put("r1", "/b", &response("2")).await.unwrap();
            store.put("r1", "/a", &response("1-refreshed")).await.unwrap();

            assert_eq!(store.keys("r1").await.unwrap(), vec!["/a", "/b"]);
        }
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        for store in stores().await {
            store.put("r1", "/a", &response("1")).await.unwrap();

            assert!(store.delete("r1", "/a").await.unwrap());
            assert!(!store.delete("r1", "/a").await.unwrap());
            assert_eq!(store.get("r1", "/a").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn regions_are_isolated_and_droppable() {
        for store in stores().await {
            store.put("old-v1", "/a", &response("1")).await.unwrap();
            store.put("new-v2", "/a", &response("2")).await.unwrap();

            store.delete_region("old-v1").await.unwrap();

            assert_eq!(store.get("old-v1", "/a").await.unwrap(), None);
            assert!(store.get("new-v2", "/a").await.unwrap().is_some());
            assert_eq!(store.region_names().await.unwrap(), vec!["new-v2"]);
        }
    }

    #[tokio::test]
    async fn count_tracks_entries() {
        for store in stores().await {
            assert_eq!(store.count("r1").await.unwrap(), 0);

            store.put("r1", "/a", &response("1")).await.unwrap();
            store.put("r1", "/b", &response("2")).await.unwrap();
            assert_eq!(store.count("r1").await.unwrap(), 2);

            store.delete("r1", "/a").await.unwrap();
            assert_eq!(store.count("r1").await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn sqlite_store_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cache.db");

        let store = SqliteRegionStore::open(&path).await.unwrap();
        store.put("r1", "/a", &response("persisted")).await.unwrap();
        store.close().await;

        let reopened = SqliteRegionStore::open(&path).await.unwrap();
        let stored = reopened.get("r1", "/a").await.unwrap().unwrap();
        assert_eq!(stored.body, b"persisted");
    }

    #[test]
    fn queued_response_shape() {
        let queued = StoredResponse::queued();
        // Success-shaped so the call site is not blocked, but distinct
        // from a real 200.
        assert_eq!(queued.status, 202);
        assert!(queued.is_success());
        let body: serde_json::Value = serde_json::from_slice(&queued.body).unwrap();
        assert_eq!(body["queued"], true);
    }
}
