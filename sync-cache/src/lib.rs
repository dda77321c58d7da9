//! # sync-cache
//!
//! Resource cache manager for offsync.
//!
//! Every outgoing request passes through the [`CacheManager`], which
//! classifies it by resource class and applies one of the named caching
//! strategies, each backed by a versioned, named cache region:
//!
//! - navigation: network-first with offline fallback
//! - static assets: cache-first
//! - images: cache-first with a bounded region
//! - API/JSON: stale-while-revalidate
//! - everything else: cache-first against the runtime region
//!
//! State-changing requests take a separate path: they are tried against
//! the network first, and on a connectivity failure are durably queued and
//! replayed when connectivity returns - the caller sees an immediate
//! "accepted for later delivery" response instead of an error.
//!
//! The manager is independent of the record store; the two share only the
//! pure classifier from sync-core.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod fetcher;
pub mod manager;
pub mod queue;
pub mod region;

pub use config::{CacheConfig, RegionKind};
pub use fetcher::{FetchError, Fetcher, HttpFetcher, MockFetcher, ResourceRequest};
pub use manager::CacheManager;
pub use queue::{MutationQueue, QueuedMutation};
pub use region::{
    CacheError, MemoryRegionStore, RegionStore, SqliteRegionStore, StoredResponse,
};
