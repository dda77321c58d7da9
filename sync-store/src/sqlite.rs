//! SQLite backend for the local durable store.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use sync_types::{CollectionId, DeviceId, Record, SyncCursor, SyncId, SyncStatus};

use crate::error::StoreError;
use crate::store::RecordStore;

/// Current schema version, written to `PRAGMA user_version`.
///
/// Migrations are additive only: a new version may create collections or
/// indexes, never drop existing ones.
const SCHEMA_VERSION: i64 = 1;

/// Statements for each schema version, applied stepwise on open.
const MIGRATIONS: &[&[&str]] = &[
    // v1: the records table partitioned by collection, with secondary
    // indexes on sync_status and last_modified, plus the meta table that
    // holds the device identity and the last_sync cursor.
    &[
        r#"
        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            sync_id TEXT NOT NULL,
            sync_status TEXT NOT NULL,
            last_modified TEXT NOT NULL,
            device_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (collection, sync_id)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_records_status ON records(collection, sync_status)",
        "CREATE INDEX IF NOT EXISTS idx_records_modified ON records(collection, last_modified)",
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    ],
];

/// SQLite-based record store.
///
/// Uses WAL mode for concurrent reads/writes. Opening is idempotent:
/// every open runs the same `IF NOT EXISTS` migrations under the engine's
/// own locking, so concurrent opens from several contexts serialize on the
/// database rather than corrupting each other.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    device_id: Arc<RwLock<DeviceId>>,
}

impl SqliteStore {
    /// Open (creating on first use) the store at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path.to_str().unwrap_or("offsync.db"))
            .map_err(StoreError::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        Self::finish_open(pool).await
    }

    /// Create an in-memory store (for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StoreError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        Self::finish_open(pool).await
    }

    async fn finish_open(pool: SqlitePool) -> Result<Self, StoreError> {
        run_migrations(&pool).await?;
        let device_id = load_or_create_device_id(&pool).await?;
        Ok(Self {
            pool,
            device_id: Arc::new(RwLock::new(device_id)),
        })
    }

    /// Close the store, releasing the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Discard the persisted device identity and generate a fresh one.
    ///
    /// Records written afterwards carry the new identifier; existing
    /// records keep the one they were stamped with.
    pub async fn reset_device_id(&self) -> Result<DeviceId, StoreError> {
        let fresh = DeviceId::random();
        sqlx::query(
            r#"
            INSERT INTO meta (key, value) VALUES ('device_id', ?1)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(fresh.to_string())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        *self.device_id.write().expect("device id lock poisoned") = fresh;
        Ok(fresh)
    }
}

/// Apply pending schema migrations, stepping `PRAGMA user_version`.
async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    let current: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(StoreError::Database)?;

    for version in (current + 1)..=SCHEMA_VERSION {
        let statements = MIGRATIONS[(version - 1) as usize];

        let mut tx = pool.begin().await.map_err(StoreError::Database)?;
        for statement in statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Database)?;
        }
        sqlx::query(&format!("PRAGMA user_version = {}", version))
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Database)?;
        tx.commit().await.map_err(StoreError::Database)?;

        tracing::debug!("applied store schema migration v{}", version);
    }

    Ok(())
}

/// Load the persisted device identity, creating it on first open.
async fn load_or_create_device_id(pool: &SqlitePool) -> Result<DeviceId, StoreError> {
    let generated = DeviceId::random();
    sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('device_id', ?1)")
        .bind(generated.to_string())
        .execute(pool)
        .await
        .map_err(StoreError::Database)?;

    // Re-read: another context may have won the insert.
    let stored: String = sqlx::query_scalar("SELECT value FROM meta WHERE key = 'device_id'")
        .fetch_one(pool)
        .await
        .map_err(StoreError::Database)?;

    DeviceId::parse(&stored).ok_or_else(|| StoreError::Corrupt {
        collection: "meta".to_string(),
        reason: "unparseable device_id".to_string(),
    })
}

/// Fixed-width RFC 3339 so the TEXT column orders lexicographically.
fn format_timestamp(stamp: DateTime<Utc>) -> String {
    stamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str, collection: CollectionId) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            collection: collection.to_string(),
            reason: format!("unparseable last_modified: {}", e),
        })
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct RecordRow {
    sync_id: String,
    sync_status: String,
    last_modified: String,
    device_id: String,
    payload: String,
}

fn row_to_record(collection: CollectionId, row: RecordRow) -> Result<Record, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        collection: collection.to_string(),
        reason,
    };

    let sync_id = SyncId::parse(&row.sync_id)
        .ok_or_else(|| corrupt(format!("unparseable sync_id: {}", row.sync_id)))?;
    let sync_status = match row.sync_status.as_str() {
        "pending" => SyncStatus::Pending,
        "synced" => SyncStatus::Synced,
        other => return Err(corrupt(format!("unknown sync_status: {}", other))),
    };
    let last_modified = parse_timestamp(&row.last_modified, collection)?;
    let device_id = DeviceId::parse(&row.device_id)
        .ok_or_else(|| corrupt(format!("unparseable device_id: {}", row.device_id)))?;
    let payload: Map<String, Value> = serde_json::from_str(&row.payload)
        .map_err(|e| corrupt(format!("unparseable payload: {}", e)))?;

    Ok(Record {
        sync_id,
        sync_status,
        last_modified,
        device_id,
        payload,
    })
}

/// Sync metadata keys are owned by the store; a caller-supplied value for
/// any of them is discarded and restamped rather than trusted.
const RESERVED_KEYS: [&str; 3] = ["sync_status", "last_modified", "device_id"];

#[async_trait]
impl RecordStore for SqliteStore {
    async fn save(&self, collection: CollectionId, payload: Value) -> Result<SyncId, StoreError> {
        let mut fields = match payload {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::InvalidInput {
                    reason: format!("record payload must be an object, got {}", kind_of(&other)),
                })
            }
        };

        let sync_id = match fields.remove("sync_id") {
            None | Some(Value::Null) => SyncId::new(),
            Some(Value::String(s)) => SyncId::parse(&s).ok_or_else(|| StoreError::InvalidInput {
                reason: format!("malformed sync_id: {}", s),
            })?,
            Some(other) => {
                return Err(StoreError::InvalidInput {
                    reason: format!("sync_id must be a string, got {}", kind_of(&other)),
                })
            }
        };
        for key in RESERVED_KEYS {
            fields.remove(key);
        }

        let device_id = self.device_id();
        let payload_text =
            serde_json::to_string(&fields).map_err(|e| StoreError::InvalidInput {
                reason: format!("unserializable payload: {}", e),
            })?;

        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;

        // last_modified never decreases for a record, even if the wall
        // clock stepped backwards between writes.
        let previous: Option<String> = sqlx::query_scalar(
            "SELECT last_modified FROM records WHERE collection = ?1 AND sync_id = ?2",
        )
        .bind(collection.as_str())
        .bind(sync_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::Database)?;

        let now = Utc::now();
        let stamp = match previous.as_deref() {
            Some(text) => {
                let prev = parse_timestamp(text, collection)?;
                if prev > now {
                    prev
                } else {
                    now
                }
            }
            None => now,
        };

        sqlx::query(
            r#"
            INSERT INTO records (collection, sync_id, sync_status, last_modified, device_id, payload)
            VALUES (?1, ?2, 'pending', ?3, ?4, ?5)
            ON CONFLICT(collection, sync_id) DO UPDATE SET
                sync_status = excluded.sync_status,
                last_modified = excluded.last_modified,
                device_id = excluded.device_id,
                payload = excluded.payload
            "#,
        )
        .bind(collection.as_str())
        .bind(sync_id.to_string())
        .bind(format_timestamp(stamp))
        .bind(device_id.to_string())
        .bind(payload_text)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Database)?;

        tx.commit().await.map_err(StoreError::Database)?;

        Ok(sync_id)
    }

    async fn get_all(&self, collection: CollectionId) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT sync_id, sync_status, last_modified, device_id, payload
            FROM records
            WHERE collection = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.into_iter()
            .map(|row| row_to_record(collection, row))
            .collect()
    }

    async fn get_pending(&self, collection: CollectionId) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT sync_id, sync_status, last_modified, device_id, payload
            FROM records
            WHERE collection = ?1 AND sync_status = 'pending'
            ORDER BY rowid ASC
            "#,
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.into_iter()
            .map(|row| row_to_record(collection, row))
            .collect()
    }

    async fn mark_synced(
        &self,
        collection: CollectionId,
        sync_id: &SyncId,
    ) -> Result<(), StoreError> {
        // Status flips in place; every other field is left untouched. A
        // missing record (concurrently deleted) is a successful no-op.
        sqlx::query(
            "UPDATE records SET sync_status = 'synced' WHERE collection = ?1 AND sync_id = ?2",
        )
        .bind(collection.as_str())
        .bind(sync_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }

    async fn load_cursor(&self) -> Result<Option<SyncCursor>, StoreError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM meta WHERE key = 'last_sync'")
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::Database)?;

        Ok(value.map(SyncCursor::new))
    }

    async fn store_cursor(&self, cursor: &SyncCursor) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO meta (key, value) VALUES ('last_sync', ?1)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(cursor.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }

    fn device_id(&self) -> DeviceId {
        *self.device_id.read().expect("device id lock poisoned")
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
