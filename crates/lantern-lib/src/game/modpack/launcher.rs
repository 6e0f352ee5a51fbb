//! Install a modpack published by a launcher server.

use crate::game::installer::core::downloader::DownloadEngine;
use crate::game::installer::types::{InstallLayout, LoaderKind, ProgressSender};
use crate::game::installer::{install_version, installed_version_id, InstallRequest};
use crate::game::launcher::version_parser::list_installed_versions;
use crate::game::modpack::sync::ModpackSynchronizer;
use crate::game::modpack::types::{ModpackManifest, SyncReport};
use anyhow::{Context, Result};

/// A modpack that is installed and ready to launch.
#[derive(Debug, Clone)]
pub struct ServerModpack {
    pub base_url: String,
    pub manifest: ModpackManifest,
    /// Version to pass to the launcher
    pub version_id: String,
    pub sync: SyncReport,
}

/// `host:port` or a full url, normalised to `scheme://host[:port][/path]` with no
/// trailing slash.
pub fn normalize_server_url(input: &str) -> String {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed.trim_start_matches('/'))
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// Fetch `<server>/manifest`, install its game version and synchronize its files.
pub async fn launch_from_server(
    engine: &DownloadEngine,
    layout: &InstallLayout,
    server_url: &str,
    progress: &ProgressSender,
) -> Result<ServerModpack> {
    let base_url = normalize_server_url(server_url);
    let manifest_url = format!("{}/manifest", base_url);
    log::info!("Loading modpack manifest from {}", manifest_url);
    progress.stage("Loading modpack manifest", 0, 3);

    let manifest: ModpackManifest = engine
        .fetch_json_as(&manifest_url, None)
        .await
        .with_context(|| format!("Failed to load modpack manifest from {}", manifest_url))?;
    manifest.validate()?;
    log::info!(
        "Modpack {} v{}: Minecraft {}, loader {}{}, {} files",
        manifest.name,
        manifest.version,
        manifest.minecraft,
        manifest.loader,
        manifest
            .loader_version
            .as_deref()
            .map(|v| format!(" {}", v))
            .unwrap_or_default(),
        manifest.files.len()
    );

    progress.stage("Checking base version", 1, 3);
    let version_id = ensure_base_version(engine, layout, &manifest, progress).await?;

    progress.stage("Synchronizing modpack", 2, 3);
    let sync = ModpackSynchronizer::new(engine.clone(), layout.clone())
        .sync(&manifest, &base_url, progress)
        .await?;

    progress.stage("Modpack ready", 3, 3);
    Ok(ServerModpack {
        base_url,
        manifest,
        version_id,
        sync,
    })
}

async fn ensure_base_version(
    engine: &DownloadEngine,
    layout: &InstallLayout,
    manifest: &ModpackManifest,
    progress: &ProgressSender,
) -> Result<String> {
    // without a pinned loader build the id is only known after resolution
    let pinned = manifest.loader == LoaderKind::Vanilla || manifest.loader_version.is_some();
    if pinned {
        let expected = installed_version_id(
            manifest.loader,
            manifest.loader_version.as_deref(),
            &manifest.minecraft,
        );
        if list_installed_versions(layout).await?.contains(&expected) {
            log::info!("Version {} already installed", expected);
            return Ok(expected);
        }
    }

    let request = match manifest.loader {
        LoaderKind::Vanilla => InstallRequest::vanilla(&manifest.minecraft),
        LoaderKind::Fabric => {
            InstallRequest::fabric(&manifest.minecraft, manifest.loader_version.clone())
        }
    };
    let outcome = install_version(engine, layout, request, progress).await?;
    Ok(outcome.version_id)
}
