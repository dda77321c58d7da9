//! Durable record model for offsync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::{DeviceId, SyncId};

/// Synchronization status of a record.
///
/// A record stays `Pending` until the remote authority acknowledges receipt.
/// It never regresses to `Pending` except through an explicit resave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Saved locally, not yet acknowledged by the server.
    Pending,
    /// Acknowledged by the server.
    Synced,
}

/// The closed set of collections the store declares at initialization.
///
/// Collection names arrive from callers as strings; they are validated at
/// the store boundary via [`FromStr`] rather than passed through to the
/// storage engine, so an unknown name fails with a typed error instead of
/// a late access-layer fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionId {
    /// Teacher attendance entries.
    Attendance,
    /// Student directory entries.
    Students,
    /// Staff directory entries.
    Staff,
    /// Exam result entries.
    Results,
}

impl CollectionId {
    /// Every declared collection, in declaration order.
    ///
    /// This set is fixed for the store's schema version; upgrades may add
    /// collections but never drop one.
    pub const ALL: [CollectionId; 4] = [
        CollectionId::Attendance,
        CollectionId::Students,
        CollectionId::Staff,
        CollectionId::Results,
    ];

    /// The collection's storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionId::Attendance => "teacher_attendances",
            CollectionId::Students => "students",
            CollectionId::Staff => "staffs",
            CollectionId::Results => "results",
        }
    }

    /// The singular model name used in change-set entries on the wire.
    pub fn model_name(&self) -> &'static str {
        match self {
            CollectionId::Attendance => "teacher_attendance",
            CollectionId::Students => "student",
            CollectionId::Staff => "staff",
            CollectionId::Results => "result",
        }
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a collection name is not in the declared set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown collection: {name}")]
pub struct UnknownCollection {
    /// The name that failed to resolve.
    pub name: String,
}

impl FromStr for CollectionId {
    type Err = UnknownCollection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectionId::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCollection {
                name: s.to_string(),
            })
    }
}

/// One unit of offline-created data.
///
/// The four named fields are the sync metadata the store owns; everything
/// else a model carries lives in `payload` and is opaque to the sync layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Client-generated primary key within the collection.
    pub sync_id: SyncId,
    /// Delivery status toward the remote authority.
    pub sync_status: SyncStatus,
    /// Set on every local write; never decreases for a given record.
    pub last_modified: DateTime<Utc>,
    /// The writing client's stable identifier.
    pub device_id: DeviceId,
    /// Model-specific fields, opaque to the sync layer.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}
