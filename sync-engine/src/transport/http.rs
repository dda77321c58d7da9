//! HTTP transport for the sync push endpoint.

use async_trait::async_trait;
use sync_types::{PushRequest, PushResponse};

use super::{SyncTransport, TransportError};

/// Pushes batches as JSON POSTs via reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a transport for the given push endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// The configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn push(&self, request: &PushRequest) -> Result<PushResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        PushResponse::from_bytes(&body).map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_kept_verbatim() {
        let transport = HttpTransport::new("https://example.test/sync/api/sync/");
        assert_eq!(transport.endpoint(), "https://example.test/sync/api/sync/");
    }

    #[test]
    fn error_display() {
        assert_eq!(
            TransportError::Status(503).to_string(),
            "server returned status 503"
        );
        assert_eq!(
            TransportError::Network("dns failure".into()).to_string(),
            "network error: dns failure"
        );
    }
}
