//! Transport abstraction for the sync push endpoint.
//!
//! The engine talks to the remote authority through one operation: push a
//! batch, get an acknowledgement back. The trait keeps the engine testable
//! without a server and leaves the HTTP details in one place.
//!
//! No timeout is imposed here; the host network stack's own timeout is
//! relied upon, and a cycle superseded by a slow push simply completes
//! late - its effects stay valid because reconciliation is idempotent.

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

use async_trait::async_trait;
use sync_types::{PushRequest, PushResponse};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never produced a response (connectivity or DNS).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success HTTP status.
    #[error("server returned status {0}")]
    Status(u16),

    /// The response body did not parse as an acknowledgement.
    ///
    /// No partial acknowledgment is assumed from an unparseable body; the
    /// whole cycle aborts.
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

/// Trait for pushing change-set batches to the remote endpoint.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Send the full batch in one request and return the server's ack.
    async fn push(&self, request: &PushRequest) -> Result<PushResponse, TransportError>;
}
