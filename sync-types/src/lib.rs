//! # sync-types
//!
//! Record, identity and wire format types for the offsync offline-first
//! synchronization protocol.
//!
//! This crate provides the foundational types used across all offsync crates:
//! - [`SyncId`], [`DeviceId`], [`SyncCursor`] - Identity and resumption types
//! - [`Record`], [`CollectionId`], [`SyncStatus`] - Durable record model
//! - [`PushRequest`], [`PushResponse`] - Sync push wire protocol
//! - [`WireError`] - Serialization error type

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod protocol;
mod record;

pub use error::WireError;
pub use ids::{DeviceId, SyncCursor, SyncId};
pub use protocol::{AckData, ChangeEntry, Operation, ProcessedChange, PushRequest, PushResponse};
pub use record::{CollectionId, Record, SyncStatus, UnknownCollection};
