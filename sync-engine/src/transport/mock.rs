//! Mock transport for testing.
//!
//! Allows queueing acknowledgements and capturing pushed batches for
//! verification.

use super::{SyncTransport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_types::{PushRequest, PushResponse};

/// Mock transport for testing.
///
/// Allows queueing acknowledgements and capturing pushed batches for
/// verification.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    pushed: Vec<PushRequest>,
    response_queue: VecDeque<PushResponse>,
    fail_next_push: Option<String>,
    fail_next_status: Option<u16>,
    push_delay: Option<Duration>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an acknowledgement to be returned by the next `push()` call.
    pub fn queue_response(&self, response: PushResponse) {
        let mut inner = self.inner.lock().unwrap();
        inner.response_queue.push_back(response);
    }

    /// Get all batches that were pushed.
    pub fn pushed(&self) -> Vec<PushRequest> {
        let inner = self.inner.lock().unwrap();
        inner.pushed.clone()
    }

    /// Number of push calls so far.
    pub fn push_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.pushed.len()
    }

    /// Get the last batch that was pushed.
    pub fn last_pushed(&self) -> Option<PushRequest> {
        let inner = self.inner.lock().unwrap();
        inner.pushed.last().cloned()
    }

    /// Cause the next push() to fail with a network error.
    pub fn fail_next_push(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_push = Some(error.to_string());
    }

    /// Cause the next push() to fail with an HTTP status error.
    pub fn fail_next_status(&self, status: u16) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_status = Some(status);
    }

    /// Delay every push() by the given duration (for overlap tests).
    pub fn set_push_delay(&self, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.push_delay = Some(delay);
    }

    /// Clear all state (captured batches, queue, failure injections).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn push(&self, request: &PushRequest) -> Result<PushResponse, TransportError> {
        // Decide the outcome under the lock, then release it before any
        // sleeping so concurrent pushes interleave.
        let (delay, outcome) = {
            let mut inner = self.inner.lock().unwrap();
            inner.pushed.push(request.clone());

            let outcome = if let Some(error) = inner.fail_next_push.take() {
                Err(TransportError::Network(error))
            } else if let Some(status) = inner.fail_next_status.take() {
                Err(TransportError::Status(status))
            } else {
                inner
                    .response_queue
                    .pop_front()
                    .ok_or_else(|| TransportError::Network("no queued response".to_string()))
            };

            (inner.push_delay, outcome)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        outcome
    }
}
