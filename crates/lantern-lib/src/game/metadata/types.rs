use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Loader kind of an installation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    #[default]
    Vanilla,
    Fabric,
}

impl LoaderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderKind::Vanilla => "vanilla",
            LoaderKind::Fabric => "fabric",
        }
    }
}

impl std::fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoaderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vanilla" => Ok(LoaderKind::Vanilla),
            "fabric" => Ok(LoaderKind::Fabric),
            _ => Err(anyhow::anyhow!("Unknown loader kind: {}", s)),
        }
    }
}

// ============================================================================
// External API Response Types
// ============================================================================

/// Mojang `version_manifest_v2.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub latest: LatestVersions,
    pub versions: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    pub release_time: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn is_release(&self) -> bool {
        self.version_type == "release"
    }
}

/// On-disk wrapper for the cached manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedManifest {
    pub fetched_at: DateTime<Utc>,
    pub manifest: VersionManifest,
}

/// One Fabric loader build offered for a game version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderBuild {
    pub version: String,
    #[serde(default)]
    pub stable: bool,
}

/// Element of `/v2/versions/loader/<game version>`
#[derive(Debug, Deserialize)]
pub(crate) struct FabricGameLoaderEntry {
    pub loader: LoaderBuild,
}
