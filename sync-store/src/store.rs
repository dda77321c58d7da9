//! The record store contract.

use async_trait::async_trait;
use serde_json::Value;
use sync_types::{CollectionId, DeviceId, Record, SyncCursor, SyncId};

use crate::error::StoreError;

/// Trait for durable record storage backends.
///
/// The store exclusively owns record lifecycle: it assigns identifiers,
/// stamps sync metadata, and is the only component that writes records.
/// The sync engine only reads the pending set and flips `sync_status`
/// through [`mark_synced`](RecordStore::mark_synced) - it never deletes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Durably upsert a record into a collection.
    ///
    /// `payload` must be a JSON object; anything else fails with
    /// [`StoreError::InvalidInput`]. A `sync_id` field inside the payload is
    /// honored (resave, overwrite semantics); otherwise a fresh v4 id is
    /// assigned. The store forces `sync_status = pending`, stamps
    /// `last_modified` (never earlier than the stored value for that
    /// record) and `device_id`, then commits atomically. The write is
    /// durable before the call returns.
    async fn save(&self, collection: CollectionId, payload: Value) -> Result<SyncId, StoreError>;

    /// Full snapshot of a collection, in store-insertion order.
    ///
    /// A point-in-time read, not a live view.
    async fn get_all(&self, collection: CollectionId) -> Result<Vec<Record>, StoreError>;

    /// The `sync_status = pending` subset of a collection as of call time.
    async fn get_pending(&self, collection: CollectionId) -> Result<Vec<Record>, StoreError>;

    /// Flip a record's status to `synced`, preserving every other field.
    ///
    /// Resolves successfully without touching anything when the record no
    /// longer exists - a concurrently deleted record is not an error.
    async fn mark_synced(&self, collection: CollectionId, sync_id: &SyncId)
        -> Result<(), StoreError>;

    /// The persisted `last_sync` cursor, if any push has completed yet.
    async fn load_cursor(&self) -> Result<Option<SyncCursor>, StoreError>;

    /// Persist the server-issued cursor for the next push.
    async fn store_cursor(&self, cursor: &SyncCursor) -> Result<(), StoreError>;

    /// This client's stable device identifier.
    ///
    /// Generated once at first open and persisted; every record the store
    /// stamps carries it until an explicit reset.
    fn device_id(&self) -> DeviceId;
}
