//! Configuration loading for the sync engine.
//!
//! Configuration is loaded from a TOML file (default: `offsync.toml`).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use sync_types::{CollectionId, UnknownCollection};

/// Root configuration for the sync engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Sync push configuration.
    pub sync: SyncSection,
    /// Local store configuration.
    pub storage: StorageSection,
}

/// Sync push configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    /// Push endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Periodic sync interval in seconds (default: 60).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Collections the engine drains, by storage name.
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,
}

/// Local store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

// Default value functions
fn default_endpoint() -> String {
    "http://127.0.0.1:8000/sync/api/sync/".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_collections() -> Vec<String> {
    vec![CollectionId::Attendance.as_str().to_string()]
}

fn default_database_path() -> PathBuf {
    PathBuf::from("offsync.db")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync: SyncSection {
                endpoint: default_endpoint(),
                interval_secs: default_interval_secs(),
                collections: default_collections(),
            },
            storage: StorageSection {
                database: default_database_path(),
            },
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// The configured collections as validated identifiers.
    ///
    /// An undeclared name fails here, at the boundary, instead of
    /// surfacing later as a storage-layer fault.
    pub fn collection_ids(&self) -> Result<Vec<CollectionId>, UnknownCollection> {
        self.sync
            .collections
            .iter()
            .map(|name| name.parse())
            .collect()
    }

    /// The periodic sync interval as a duration.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.sync.collections, vec!["teacher_attendances"]);
        assert_eq!(config.storage.database, PathBuf::from("offsync.db"));
        assert_eq!(config.sync_interval(), Duration::from_secs(60));
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[sync]
endpoint = "https://school.example/sync/api/sync/"
interval_secs = 120
collections = ["teacher_attendances", "students"]

[storage]
database = "/data/offsync.db"
"#;

        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.sync.endpoint, "https://school.example/sync/api/sync/");
        assert_eq!(config.sync.interval_secs, 120);
        assert_eq!(config.storage.database, PathBuf::from("/data/offsync.db"));
        assert_eq!(
            config.collection_ids().unwrap(),
            vec![CollectionId::Attendance, CollectionId::Students]
        );
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let toml = r#"
[sync]
[storage]
"#;

        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.storage.database, PathBuf::from("offsync.db"));
    }

    #[test]
    fn undeclared_collection_fails_validation() {
        let toml = r#"
[sync]
collections = ["teacher_attendances", "invoices"]
[storage]
"#;

        let config: EngineConfig = toml::from_str(toml).unwrap();
        let err = config.collection_ids().unwrap_err();
        assert_eq!(err.name, "invoices");
    }
}
