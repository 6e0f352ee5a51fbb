use crate::game::installer::core::downloader::{BatchReport, DownloadTask};
use crate::game::installer::core::traits::{InstallContext, LoaderInstaller};
use crate::game::installer::integrity::{asset_tasks, AssetIndexFile};
use crate::game::installer::types::ProgressSender;
use crate::game::launcher::classpath::library_tasks;
use crate::game::launcher::version_parser::{parse_version_json, VersionDescriptor};
use crate::game::metadata::{fetch_version_manifest_from, find_version};
use anyhow::{Context, Result};
use futures::future::BoxFuture;

/// The base game: descriptor, client jar, libraries and assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VanillaInstaller {
    pub version_id: String,
}

impl VanillaInstaller {
    pub fn new(version_id: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
        }
    }
}

impl LoaderInstaller for VanillaInstaller {
    fn id(&self) -> String {
        self.version_id.clone()
    }

    fn resolve<'a>(&'a self, ctx: &'a InstallContext) -> BoxFuture<'a, Result<VersionDescriptor>> {
        Box::pin(resolve_vanilla(ctx, &self.version_id))
    }

    fn download_libraries<'a>(
        &'a self,
        ctx: &'a InstallContext,
        descriptor: &'a VersionDescriptor,
        progress: &'a ProgressSender,
    ) -> BoxFuture<'a, Result<BatchReport>> {
        Box::pin(download_vanilla(ctx, descriptor, progress))
    }
}

/// Load `versions/<id>/<id>.json`, fetching it through the version manifest when
/// absent or unreadable.
async fn resolve_vanilla(ctx: &InstallContext, version_id: &str) -> Result<VersionDescriptor> {
    log::info!("Resolving vanilla Minecraft {}", version_id);
    let json_path = ctx.layout.version_json(version_id);

    if json_path.exists() {
        match parse_version_json(&json_path).await {
            Ok(descriptor) => {
                log::info!("Found local version JSON at {:?}", json_path);
                return Ok(descriptor);
            }
            Err(e) => log::warn!("Failed to parse local version JSON, re-fetching: {:#}", e),
        }
    }

    let manifest =
        fetch_version_manifest_from(&ctx.engine, &ctx.layout, &ctx.endpoints.version_manifest)
            .await?;
    let entry = find_version(&manifest, version_id)?;
    log::debug!("Found version entry: {}", entry.id);

    // a stale file would pass the "already valid" check without a hash
    if entry.sha1.is_none() && json_path.exists() {
        tokio::fs::remove_file(&json_path).await?;
    }
    let task = DownloadTask::new(&entry.url, &json_path)
        .with_sha1(entry.sha1.clone())
        .with_name(format!("{}.json", version_id));
    ctx.engine
        .download_task(&task)
        .await
        .with_context(|| format!("Failed to download version JSON for {}", version_id))?;

    parse_version_json(&json_path).await
}

async fn download_vanilla(
    ctx: &InstallContext,
    descriptor: &VersionDescriptor,
    progress: &ProgressSender,
) -> Result<BatchReport> {
    let layout = &ctx.layout;
    let mut tasks = Vec::new();

    let client = descriptor
        .client_artifact()
        .and_then(|c| c.url.as_ref().map(|url| (c, url)))
        .with_context(|| format!("No client download found for {}", descriptor.id))?;
    tasks.push(
        DownloadTask::new(client.1, layout.version_jar(&descriptor.id))
            .with_sha1(client.0.sha1.clone())
            .with_size(client.0.size)
            .with_name(format!("{}.jar", descriptor.id)),
    );

    tasks.extend(library_tasks(layout, descriptor, &ctx.rules)?);

    let index_path = descriptor
        .asset_index
        .as_ref()
        .map(|index| (index, layout.asset_index(&index.id)));
    if let Some((index, path)) = &index_path {
        if let Some(url) = &index.url {
            tasks.push(
                DownloadTask::new(url, path)
                    .with_sha1(index.sha1.clone())
                    .with_size(index.size)
                    .with_name(format!("asset index {}", index.id)),
            );
        }
    }

    log::info!("Downloading client, libraries and asset index for {}", descriptor.id);
    let mut report = ctx.engine.download_batch(tasks, progress).await;

    if let Some((index, path)) = index_path {
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: AssetIndexFile = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Failed to parse asset index {}", index.id))?;
                let assets = asset_tasks(layout, &file, &ctx.endpoints.resources);
                log::info!("Downloading {} assets", assets.len());
                report.absorb(ctx.engine.download_batch(assets, progress).await);
            }
            Err(e) => log::warn!("Asset index {} unavailable, skipping assets: {}", index.id, e),
        }
    }

    Ok(report)
}
