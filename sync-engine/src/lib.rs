//! # sync-engine
//!
//! The offsync sync engine: tracks pending records in the local store,
//! batches them into change-sets, pushes them to the remote endpoint, and
//! marks acknowledged records synced.
//!
//! # Architecture
//!
//! The engine drives the pure cycle state machine from sync-core and
//! interprets its actions to perform actual I/O via the store and the
//! [`SyncTransport`] trait.
//!
//! ```text
//! Triggers → SyncService → SyncEngine → SyncTransport → Network
//!                              ↓
//!                     sync-core (pure state machine)
//!                              ↓
//!                          RecordStore
//! ```
//!
//! Cycles are self-triggered (startup, connectivity restored, periodic
//! timer) and never return errors to a caller: a failed cycle leaves every
//! record pending and surfaces only as a user-visible status message.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod service;
pub mod transport;

pub use config::{ConfigError, EngineConfig};
pub use engine::{CycleOutcome, EngineError, StatusMessage, SyncEngine};
pub use service::{Scheduler, SyncService};
pub use transport::{HttpTransport, MockTransport, SyncTransport, TransportError};
