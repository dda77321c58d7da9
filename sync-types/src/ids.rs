//! Identity and resumption types for offsync.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The client-generated primary key of a record within its collection.
///
/// UUID v4, generated at save time when the record carries none.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(uuid::Uuid);

impl SyncId {
    /// Create a new random SyncId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse a SyncId from its hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SyncId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncId({})", self.0)
    }
}

/// A stable identifier for the client device.
///
/// 32 bytes of random data, displayed and serialized as URL-safe base64.
/// Generated once per client and persisted by the store; every record the
/// client writes carries the same DeviceId until it is explicitly reset.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId([u8; 32]);

impl DeviceId {
    /// Create a new random DeviceId.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(bytes)
    }

    /// Create a DeviceId from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == 32 {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(bytes);
            Some(Self(arr))
        } else {
            None
        }
    }

    /// Parse a DeviceId from its base64 display form.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(s).ok()?;
        Self::from_bytes(&bytes)
    }

    /// Get the raw bytes of this DeviceId.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", &self.to_string()[..8])
    }
}

// The wire carries device identifiers as strings, so serde goes through
// the base64 form rather than a byte array.
impl Serialize for DeviceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).ok_or_else(|| serde::de::Error::custom("invalid device id"))
    }
}

/// An opaque resumption token issued by the sync server.
///
/// The server returns its own `server_time` with every successful push and
/// expects it back as `last_sync` on the next one. Clients persist and echo
/// the token; they never interpret it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCursor(String);

impl SyncCursor {
    /// Create a cursor from the server-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncCursor({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_id_is_uuid_v4() {
        let id = SyncId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn sync_id_parse_roundtrip() {
        let original = SyncId::new();
        let restored = SyncId::parse(&original.to_string()).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn sync_id_parse_rejects_garbage() {
        assert!(SyncId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn sync_id_serde_is_hyphenated_string() {
        let id = SyncId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn device_id_roundtrip() {
        let original = DeviceId::random();
        let bytes = original.as_bytes();
        let restored = DeviceId::from_bytes(bytes).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn device_id_base64_display() {
        let id = DeviceId::random();
        let display = id.to_string();
        assert_eq!(display.len(), 43); // 32 bytes = 43 base64 chars (no padding)
    }

    #[test]
    fn device_id_parse_display_form() {
        let original = DeviceId::random();
        let restored = DeviceId::parse(&original.to_string()).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn device_id_from_invalid_length_fails() {
        assert!(DeviceId::from_bytes(&[0u8; 16]).is_none());
        assert!(DeviceId::from_bytes(&[0u8; 64]).is_none());
    }

    #[test]
    fn device_id_serde_is_string() {
        let id = DeviceId::random();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let restored: DeviceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn device_id_deserialize_rejects_garbage() {
        let result: Result<DeviceId, _> = serde_json::from_str("\"short\"");
        assert!(result.is_err());
    }

    #[test]
    fn cursor_is_opaque_string() {
        let cursor = SyncCursor::new("2024-03-01T10:00:00Z");
        assert_eq!(cursor.as_str(), "2024-03-01T10:00:00Z");

        let json = serde_json::to_string(&cursor).unwrap();
        assert_eq!(json, "\"2024-03-01T10:00:00Z\"");
    }
}
