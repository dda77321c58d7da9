//! Error types for the local durable store.

use sync_types::UnknownCollection;

/// Errors surfaced by store operations.
///
/// The store attaches the underlying fault and leaves retry policy to the
/// caller - no operation here retries internally.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The caller handed the store something it refuses at the boundary:
    /// a non-object record payload or an undeclared collection name.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Why the input was rejected.
        reason: String,
    },

    /// The underlying storage engine faulted.
    #[error("storage error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted row no longer parses as a record.
    #[error("corrupt record in {collection}: {reason}")]
    Corrupt {
        /// Collection the row was read from.
        collection: String,
        /// What failed to parse.
        reason: String,
    },
}

impl From<UnknownCollection> for StoreError {
    fn from(err: UnknownCollection) -> Self {
        StoreError::InvalidInput {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::CollectionId;

    #[test]
    fn unknown_collection_becomes_invalid_input() {
        let err: StoreError = "invoices".parse::<CollectionId>().unwrap_err().into();
        assert!(matches!(err, StoreError::InvalidInput { .. }));
        assert_eq!(err.to_string(), "invalid input: unknown collection: invoices");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
    }
}
