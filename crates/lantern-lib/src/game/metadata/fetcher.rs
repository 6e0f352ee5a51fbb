use super::cache::{load_cached_manifest, manifest_cache_path, save_manifest};
use super::types::{FabricGameLoaderEntry, LoaderBuild, ManifestEntry, VersionManifest};
use crate::error::LauncherError;
use crate::game::installer::config::{json_cache_ttl, FABRIC_META_URL, VANILLA_MANIFEST_URL};
use crate::game::installer::core::downloader::DownloadEngine;
use crate::game::installer::types::InstallLayout;
use anyhow::{Context, Result};

/// Mojang version manifest, cached on disk for a few hours.
pub async fn fetch_version_manifest(
    engine: &DownloadEngine,
    layout: &InstallLayout,
) -> Result<VersionManifest> {
    fetch_version_manifest_from(engine, layout, VANILLA_MANIFEST_URL).await
}

/// [`fetch_version_manifest`] against a specific manifest URL.
///
/// A fresh cache is returned without a request. On network failure a stale
/// cache is used if one exists.
pub async fn fetch_version_manifest_from(
    engine: &DownloadEngine,
    layout: &InstallLayout,
    url: &str,
) -> Result<VersionManifest> {
    let cache_path = manifest_cache_path(layout);

    let cached = match load_cached_manifest(&cache_path).await {
        Ok(cached) => Some(cached),
        Err(e) => {
            if cache_path.exists() {
                log::warn!("Ignoring unreadable manifest cache: {:#}", e);
            }
            None
        }
    };

    if let Some(cached) = &cached {
        if cached.is_fresh() {
            log::info!(
                "Using cached version manifest (fetched {})",
                cached.fetched_at.to_rfc3339()
            );
            return Ok(cached.manifest.clone());
        }
        log::info!("Cached version manifest is stale, refreshing...");
    }

    match engine.fetch_json_as::<VersionManifest>(url, None).await {
        Ok(manifest) => {
            if let Err(e) = save_manifest(&cache_path, &manifest).await {
                log::warn!("Failed to save manifest to cache: {:#}", e);
            }
            log::info!("Fetched version manifest: {} versions", manifest.versions.len());
            Ok(manifest)
        }
        Err(e) => match cached {
            Some(cached) => {
                log::warn!("Manifest fetch failed ({:#}), using stale cache", e);
                Ok(cached.manifest)
            }
            None => Err(e).context("Failed to fetch version manifest and no cache exists"),
        },
    }
}

/// Releases only, newest first, at most `cap` entries.
pub fn release_versions(manifest: &VersionManifest, cap: usize) -> Vec<ManifestEntry> {
    let mut releases: Vec<ManifestEntry> = manifest
        .versions
        .iter()
        .filter(|v| v.is_release())
        .cloned()
        .collect();
    releases.sort_by(|a, b| b.release_time.cmp(&a.release_time));
    releases.truncate(cap);
    releases
}

/// Manifest entry for `version_id`, or `VersionNotFound`.
pub fn find_version<'a>(manifest: &'a VersionManifest, version_id: &str) -> Result<&'a ManifestEntry> {
    manifest
        .versions
        .iter()
        .find(|v| v.id == version_id)
        .ok_or_else(|| {
            LauncherError::VersionNotFound {
                version: version_id.to_string(),
            }
            .into()
        })
}

/// Fabric loader builds for a game version, in the order the meta service lists them.
pub async fn fetch_fabric_loaders(
    engine: &DownloadEngine,
    game_version: &str,
) -> Result<Vec<LoaderBuild>> {
    fetch_fabric_loaders_from(engine, FABRIC_META_URL, game_version).await
}

pub async fn fetch_fabric_loaders_from(
    engine: &DownloadEngine,
    meta_url: &str,
    game_version: &str,
) -> Result<Vec<LoaderBuild>> {
    let url = format!(
        "{}/versions/loader/{}",
        meta_url.trim_end_matches('/'),
        game_version
    );
    let entries: Vec<FabricGameLoaderEntry> = engine
        .fetch_json_as(&url, Some(json_cache_ttl()))
        .await
        .with_context(|| format!("Failed to fetch Fabric loaders for {}", game_version))?;

    log::info!("Fabric: {} - {} loaders", game_version, entries.len());
    Ok(entries.into_iter().map(|e| e.loader).collect())
}

/// First stable build, else the first build listed.
pub fn recommended_loader(builds: &[LoaderBuild]) -> Option<&LoaderBuild> {
    builds.iter().find(|b| b.stable).or_else(|| builds.first())
}
