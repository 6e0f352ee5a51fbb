use super::types::{CachedManifest, VersionManifest};
use crate::game::installer::config::MANIFEST_CACHE_TTL_HOURS;
use crate::game::installer::types::InstallLayout;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

const MANIFEST_FILENAME: &str = "version_manifest_v2.json";

pub fn manifest_cache_path(layout: &InstallLayout) -> PathBuf {
    layout.cache_dir().join(MANIFEST_FILENAME)
}

impl CachedManifest {
    pub fn is_fresh(&self) -> bool {
        Utc::now() - self.fetched_at < Duration::hours(MANIFEST_CACHE_TTL_HOURS)
    }
}

/// Load the cached manifest, fresh or not
pub async fn load_cached_manifest(path: &Path) -> Result<CachedManifest> {
    let contents = fs::read_to_string(path)
        .await
        .context("Failed to read manifest cache")?;

    serde_json::from_str(&contents).context("Failed to parse manifest cache")
}

/// Save the manifest with the current time as `fetched_at`
pub async fn save_manifest(path: &Path, manifest: &VersionManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .context("Failed to create cache directory")?;
    }

    let cached = CachedManifest {
        fetched_at: Utc::now(),
        manifest: manifest.clone(),
    };
    let json = serde_json::to_string_pretty(&cached).context("Failed to serialize manifest")?;

    fs::write(path, json)
        .await
        .context("Failed to write manifest cache")?;

    log::debug!("Saved version manifest to {:?}", path);
    Ok(())
}
