//! Wire protocol for the sync push endpoint.
//!
//! One push request carries the device identity, the full batch of pending
//! changes, and the cursor returned by the previous push. The server's ack
//! enumerates the entries it processed; anything it silently drops stays
//! pending on the client and rides along in the next cycle.

use serde::{Deserialize, Serialize};

use crate::{DeviceId, Record, SyncCursor, SyncId, WireError};

/// The operation a change-set entry performs at the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create the record server-side (last write wins on collision).
    Create,
}

/// One pending record packaged for transmission.
///
/// Ephemeral - built fresh for each push, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Model name the server routes the record to.
    pub model: String,
    /// What to do with the record.
    pub operation: Operation,
    /// The record itself, payload fields flattened.
    pub data: Record,
}

/// Body of a sync push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Stable identifier of the pushing client.
    pub device_id: DeviceId,
    /// The full batch of pending changes.
    pub changes: Vec<ChangeEntry>,
    /// Cursor from the previous push, `None` on the first ever.
    pub last_sync: Option<SyncCursor>,
}

/// Identifying fields of a processed record, echoed back in the ack.
///
/// The server returns the whole record; only `sync_id` is read here, the
/// rest is ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckData {
    /// Primary key of the processed record.
    pub sync_id: SyncId,
}

/// One acknowledged change-set entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedChange {
    /// The processed record's identifying fields.
    pub data: AckData,
}

/// Server response to a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    /// `"success"` when the batch was accepted; anything else is a rejection.
    pub status: String,
    /// The entries the server processed.
    #[serde(default)]
    pub processed_changes: Vec<ProcessedChange>,
    /// Server-issued token to echo as `last_sync` next cycle.
    pub server_time: String,
}

impl PushRequest {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Serialization)
    }
}

impl PushResponse {
    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Deserialization)
    }

    /// Whether the server accepted the batch.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }

    /// The cursor carried by this response.
    pub fn cursor(&self) -> SyncCursor {
        SyncCursor::new(self.server_time.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectionId, SyncStatus};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Map, Value};

    fn sample_entry() -> ChangeEntry {
        let mut payload = Map::new();
        payload.insert("present".into(), Value::Bool(true));
        ChangeEntry {
            model: CollectionId::Attendance.model_name().to_string(),
            operation: Operation::Create,
            data: Record {
                sync_id: SyncId::new(),
                sync_status: SyncStatus::Pending,
                last_modified: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
                device_id: DeviceId::random(),
                payload,
            },
        }
    }

    #[test]
    fn push_request_wire_shape() {
        let entry = sample_entry();
        let request = PushRequest {
            device_id: entry.data.device_id,
            changes: vec![entry],
            last_sync: Some(SyncCursor::new("2024-02-29T23:59:00Z")),
        };

        let json: Value = serde_json::from_slice(&request.to_bytes().unwrap()).unwrap();
        assert!(json["device_id"].is_string());
        assert_eq!(json["last_sync"], "2024-02-29T23:59:00Z");
        assert_eq!(json["changes"][0]["model"], "teacher_attendance");
        assert_eq!(json["changes"][0]["operation"], "create");
        assert_eq!(json["changes"][0]["data"]["present"], true);
    }

    #[test]
    fn first_push_has_null_cursor() {
        let request = PushRequest {
            device_id: DeviceId::random(),
            changes: vec![],
            last_sync: None,
        };
        let json: Value = serde_json::from_slice(&request.to_bytes().unwrap()).unwrap();
        assert!(json["last_sync"].is_null());
    }

    #[test]
    fn response_parses_and_reports_success() {
        let id = SyncId::new();
        let body = json!({
            "status": "success",
            "processed_changes": [{"data": {"sync_id": id.to_string(), "name": "extra"}}],
            "server_time": "2024-03-01T10:00:05Z"
        });

        let response = PushResponse::from_bytes(body.to_string().as_bytes()).unwrap();
        assert!(response.is_success());
        assert_eq!(response.processed_changes.len(), 1);
        assert_eq!(response.processed_changes[0].data.sync_id, id);
        assert_eq!(response.cursor().as_str(), "2024-03-01T10:00:05Z");
    }

    #[test]
    fn non_success_status_is_rejection() {
        let body = json!({
            "status": "error",
            "processed_changes": [],
            "server_time": "2024-03-01T10:00:05Z"
        });
        let response = PushResponse::from_bytes(body.to_string().as_bytes()).unwrap();
        assert!(!response.is_success());
    }

    #[test]
    fn missing_processed_changes_defaults_empty() {
        let body = json!({
            "status": "success",
            "server_time": "2024-03-01T10:00:05Z"
        });
        let response = PushResponse::from_bytes(body.to_string().as_bytes()).unwrap();
        assert!(response.processed_changes.is_empty());
    }

    #[test]
    fn malformed_response_is_a_wire_error() {
        let result = PushResponse::from_bytes(b"not json at all");
        assert!(matches!(result, Err(WireError::Deserialization(_))));
    }
}
