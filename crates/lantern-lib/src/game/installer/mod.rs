pub mod config;
pub mod core;
pub mod integrity;
pub mod modloaders;
pub mod types;
pub mod vanilla;

#[cfg(test)]
mod tests;

use anyhow::Result;
use types::{InstallLayout, LoaderKind, ProgressSender};

use crate::error::LauncherError;
use crate::game::installer::config::Endpoints;
use crate::game::installer::core::downloader::{BatchReport, DownloadEngine};
use crate::game::installer::core::jre_manager::{required_java_for, JavaManager, JavaRuntime};
use crate::game::installer::core::traits::{InstallContext, LoaderInstaller};
use crate::game::installer::integrity::{verify_and_repair, IntegrityReport};
use crate::game::installer::modloaders::fabric::FabricInstaller;
use crate::game::installer::vanilla::VanillaInstaller;
use crate::game::launcher::version_parser::resolve_version;
use crate::game::metadata::{fetch_fabric_loaders_from, recommended_loader};

/// What to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub game_version: String,
    pub loader: LoaderKind,
    /// Fabric only; the recommended build is used when unset
    pub loader_version: Option<String>,
    /// Also install the Java runtime the version needs
    pub install_java: bool,
    pub endpoints: Endpoints,
}

impl InstallRequest {
    pub fn vanilla(game_version: impl Into<String>) -> Self {
        Self {
            game_version: game_version.into(),
            loader: LoaderKind::Vanilla,
            loader_version: None,
            install_java: true,
            endpoints: Endpoints::default(),
        }
    }

    pub fn fabric(game_version: impl Into<String>, loader_version: Option<String>) -> Self {
        Self {
            loader: LoaderKind::Fabric,
            loader_version,
            ..Self::vanilla(game_version)
        }
    }

    pub fn without_java(mut self) -> Self {
        self.install_java = false;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    /// Id to launch, e.g. "fabric-loader-0.15.0-1.20.4"
    pub version_id: String,
    pub downloads: BatchReport,
    pub integrity: IntegrityReport,
    pub java: Option<JavaRuntime>,
}

/// Directory name under `versions/` for an installation.
pub fn installed_version_id(
    loader: LoaderKind,
    loader_version: Option<&str>,
    game_version: &str,
) -> String {
    match (loader, loader_version) {
        (LoaderKind::Fabric, Some(lv)) => format!("fabric-loader-{}-{}", lv, game_version),
        _ => game_version.to_string(),
    }
}

async fn install_layer(
    installer: &dyn LoaderInstaller,
    ctx: &InstallContext,
    progress: &ProgressSender,
) -> Result<BatchReport> {
    let descriptor = installer.resolve(ctx).await?;
    let report = installer.download_libraries(ctx, &descriptor, progress).await?;
    if !report.is_success() {
        // partial install; the integrity pass decides whether it is fatal
        log::warn!(
            "{}: {} of {} downloads failed",
            installer.id(),
            report.failed.len(),
            report.total
        );
    }
    Ok(report)
}

/// Install the base game, then the loader, verify everything, then ensure Java.
pub async fn install_version(
    engine: &DownloadEngine,
    layout: &InstallLayout,
    request: InstallRequest,
    progress: &ProgressSender,
) -> Result<InstallOutcome> {
    log::info!(
        "Starting installation: version={}, loader={}",
        request.game_version,
        request.loader
    );
    let ctx = InstallContext::new(engine.clone(), layout.clone())
        .with_endpoints(request.endpoints.clone());
    install_with_context(&ctx, request, progress).await
}

/// [`install_version`] with an explicit context, e.g. for a different rule platform.
pub async fn install_with_context(
    ctx: &InstallContext,
    request: InstallRequest,
    progress: &ProgressSender,
) -> Result<InstallOutcome> {
    tokio::fs::create_dir_all(ctx.layout.versions_dir()).await?;

    progress.stage("Installing game", 0, 4);
    let vanilla = VanillaInstaller::new(&request.game_version);
    let mut downloads = install_layer(&vanilla, ctx, progress).await?;

    progress.stage("Installing loader", 1, 4);
    let version_id = match request.loader {
        LoaderKind::Vanilla => vanilla.id(),
        LoaderKind::Fabric => {
            let loader_version = match request.loader_version.clone() {
                Some(v) => v,
                None => {
                    let builds = fetch_fabric_loaders_from(
                        &ctx.engine,
                        &ctx.endpoints.fabric_meta,
                        &request.game_version,
                    )
                    .await?;
                    recommended_loader(&builds)
                        .map(|b| b.version.clone())
                        .ok_or_else(|| LauncherError::LoaderNotFound {
                            loader_version: "recommended".to_string(),
                            game_version: request.game_version.clone(),
                        })?
                }
            };
            log::info!("Using Fabric loader version: {}", loader_version);
            let fabric = FabricInstaller::new(&request.game_version, loader_version);
            downloads.absorb(install_layer(&fabric, ctx, progress).await?);
            fabric.id()
        }
    };

    progress.stage("Verifying files", 2, 4);
    let integrity = verify_and_repair(&ctx.engine, &ctx.layout, &version_id, &ctx.rules, progress).await?;

    progress.stage("Installing Java", 3, 4);
    let java = if request.install_java {
        let descriptor = resolve_version(&ctx.layout, &version_id).await?;
        let major = required_java_for(&descriptor, &request.game_version);
        let manager = JavaManager::with_engine(ctx.layout.clone(), ctx.engine.clone());
        Some(manager.ensure_runtime(major, progress).await?)
    } else {
        None
    };

    progress.stage("Installation complete", 4, 4);
    log::info!("Installation completed successfully: {}", version_id);

    Ok(InstallOutcome {
        version_id,
        downloads,
        integrity,
        java,
    })
}

/// Whether `version_id` has a descriptor on disk
pub fn is_version_installed(layout: &InstallLayout, version_id: &str) -> bool {
    layout.version_json(version_id).is_file()
}
