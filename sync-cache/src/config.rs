//! Cache manager configuration and region naming.

use serde::Deserialize;

/// The fixed reserved set of region kinds, one per strategy class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    /// API responses, the default fallback, and the mutation queue.
    Runtime,
    /// Navigation responses and the precached shell.
    Pages,
    /// Stylesheets, scripts, fonts.
    Static,
    /// Images (bounded).
    Images,
}

impl RegionKind {
    /// Every region kind.
    pub const ALL: [RegionKind; 4] = [
        RegionKind::Runtime,
        RegionKind::Pages,
        RegionKind::Static,
        RegionKind::Images,
    ];

    /// The kind's name segment inside a region name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionKind::Runtime => "runtime",
            RegionKind::Pages => "pages",
            RegionKind::Static => "static",
            RegionKind::Images => "images",
        }
    }
}

/// Configuration for the cache manager.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Application prefix baked into region names.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Release version baked into region names. Bumping it retires every
    /// old region at the next activation.
    #[serde(default = "default_version")]
    pub version: String,
    /// URL of the offline fallback page served when a navigation misses
    /// both network and cache.
    #[serde(default = "default_offline_url")]
    pub offline_url: String,
    /// Shell URLs precached best-effort at install.
    #[serde(default)]
    pub precache: Vec<String>,
    /// Maximum entries the image region may hold.
    #[serde(default = "default_image_max_entries")]
    pub image_max_entries: u64,
}

// Default value functions
fn default_prefix() -> String {
    "offsync".to_string()
}

fn default_version() -> String {
    "v1.0.0".to_string()
}

fn default_offline_url() -> String {
    "/offline/".to_string()
}

fn default_image_max_entries() -> u64 {
    80
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            version: default_version(),
            offline_url: default_offline_url(),
            precache: Vec::new(),
            image_max_entries: default_image_max_entries(),
        }
    }
}

impl CacheConfig {
    /// The versioned name of a region.
    pub fn region_name(&self, kind: RegionKind) -> String {
        format!("{}-{}-{}", self.prefix, kind.as_str(), self.version)
    }

    /// The four region names of the current version. At activation,
    /// every region outside this set is deleted.
    pub fn current_region_names(&self) -> Vec<String> {
        RegionKind::ALL
            .iter()
            .map(|&kind| self.region_name(kind))
            .collect()
    }
}
