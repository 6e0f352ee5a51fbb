use crate::error::LauncherError;
use crate::game::installer::core::downloader::BatchReport;
use crate::game::installer::core::traits::{InstallContext, LoaderInstaller};
use crate::game::installer::types::ProgressSender;
use crate::game::launcher::classpath::library_tasks;
use crate::game::launcher::version_parser::{parse_version_json, VersionDescriptor};
use anyhow::{Context, Result};
use futures::future::BoxFuture;

/// A Fabric loader build layered on a base game version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricInstaller {
    pub game_version: String,
    pub loader_version: String,
}

impl FabricInstaller {
    pub fn new(game_version: impl Into<String>, loader_version: impl Into<String>) -> Self {
        Self {
            game_version: game_version.into(),
            loader_version: loader_version.into(),
        }
    }
}

impl LoaderInstaller for FabricInstaller {
    fn id(&self) -> String {
        format!("fabric-loader-{}-{}", self.loader_version, self.game_version)
    }

    fn resolve<'a>(&'a self, ctx: &'a InstallContext) -> BoxFuture<'a, Result<VersionDescriptor>> {
        Box::pin(resolve_fabric(ctx, self))
    }

    fn download_libraries<'a>(
        &'a self,
        ctx: &'a InstallContext,
        descriptor: &'a VersionDescriptor,
        progress: &'a ProgressSender,
    ) -> BoxFuture<'a, Result<BatchReport>> {
        Box::pin(async move {
            log::info!("Downloading Fabric libraries for {}", descriptor.id);
            // Fabric profiles list maven coordinates with a repository url
            let tasks = library_tasks(&ctx.layout, descriptor, &ctx.rules)?;
            Ok(ctx.engine.download_batch(tasks, progress).await)
        })
    }
}

/// Fetch the loader profile and store it as `versions/<id>/<id>.json`.
async fn resolve_fabric(ctx: &InstallContext, fabric: &FabricInstaller) -> Result<VersionDescriptor> {
    let id = fabric.id();
    let json_path = ctx.layout.version_json(&id);
    log::info!(
        "Installing Fabric {} for Minecraft {}",
        fabric.loader_version,
        fabric.game_version
    );

    if json_path.exists() {
        match parse_version_json(&json_path).await {
            Ok(descriptor) if descriptor.inherits_from.is_some() => {
                log::info!("Found local Fabric profile at {:?}", json_path);
                return Ok(descriptor);
            }
            Ok(_) => log::warn!("Local Fabric profile lacks inheritsFrom, re-fetching"),
            Err(e) => log::warn!("Failed to parse local Fabric profile, re-fetching: {:#}", e),
        }
    }

    let profile_url = format!(
        "{}/versions/loader/{}/{}/profile/json",
        ctx.endpoints.fabric_meta.trim_end_matches('/'),
        fabric.game_version,
        fabric.loader_version
    );

    let mut profile = match ctx.engine.fetch_json(&profile_url, None).await {
        Ok(profile) => profile,
        Err(e) => {
            let unknown = matches!(
                e.downcast_ref::<LauncherError>(),
                Some(LauncherError::Network { status, .. })
                    if status.starts_with("400") || status.starts_with("404")
            );
            if unknown {
                return Err(LauncherError::LoaderNotFound {
                    loader_version: fabric.loader_version.clone(),
                    game_version: fabric.game_version.clone(),
                }
                .into());
            }
            return Err(e).context("Failed to download Fabric profile");
        }
    };

    // the on-disk id and parent must match the directory layout
    if let Some(obj) = profile.as_object_mut() {
        obj.insert("id".to_string(), serde_json::Value::String(id.clone()));
        obj.entry("inheritsFrom")
            .or_insert_with(|| serde_json::Value::String(fabric.game_version.clone()));
    }

    let descriptor: VersionDescriptor =
        serde_json::from_value(profile.clone()).context("Unexpected Fabric profile shape")?;

    if let Some(parent) = json_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&json_path, serde_json::to_vec_pretty(&profile)?)
        .await
        .with_context(|| format!("Failed to write {:?}", json_path))?;

    log::debug!(
        "Fabric profile ID: {}, inherits: {:?}",
        descriptor.id,
        descriptor.inherits_from
    );
    Ok(descriptor)
}
