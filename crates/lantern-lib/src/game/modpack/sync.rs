//! Reconciles a server-declared file list against the local install tree.

use crate::error::LauncherError;
use crate::game::installer::config::MODPACK_CONCURRENCY;
use crate::game::installer::core::downloader::{DownloadEngine, DownloadTask};
use crate::game::installer::integrity::{check_files, IntegrityReport};
use crate::game::installer::types::{InstallLayout, ProgressSender};
use crate::game::modpack::types::{
    is_protected_name, ModpackFileEntry, ModpackManifest, SyncReport, LOCAL_TOOLS_PREFIX,
    MANAGED_DIRS,
};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone)]
pub struct ModpackSynchronizer {
    engine: DownloadEngine,
    layout: InstallLayout,
}

impl ModpackSynchronizer {
    pub fn new(engine: DownloadEngine, layout: InstallLayout) -> Self {
        Self {
            engine: engine.with_concurrency(MODPACK_CONCURRENCY),
            layout,
        }
    }

    /// Check tasks for the entries that take part in synchronization.
    ///
    /// Local tools are always skipped; protected files only once they exist.
    fn tracked(&self, manifest: &ModpackManifest) -> Vec<DownloadTask> {
        let root = self.layout.root();
        manifest
            .files
            .iter()
            .filter_map(|entry| {
                if entry.is_local_tool() {
                    log::debug!("Skipping local tool {}", entry.path);
                    return None;
                }
                let path = entry.local_path(root);
                if entry.is_protected() && path.exists() {
                    log::debug!("Keeping user file {}", entry.path);
                    return None;
                }
                Some(
                    DownloadTask::new(entry.url.clone().unwrap_or_default(), path)
                        .with_sha1(Some(entry.sha1.clone()))
                        .with_size(Some(entry.size))
                        .with_name(entry.path.clone()),
                )
            })
            .collect()
    }

    /// Classify the manifest's files against disk.
    pub async fn check(&self, manifest: &ModpackManifest) -> Result<IntegrityReport> {
        manifest.validate()?;
        let report = check_files(&self.tracked(manifest)).await;
        log::info!(
            "Modpack check: {} valid, {} corrupted, {} missing",
            report.valid.len(),
            report.corrupted.len(),
            report.missing.len()
        );
        Ok(report)
    }

    /// Delete files under the managed directories that the manifest does not list.
    ///
    /// Returns the number of files removed.
    pub async fn cleanup(&self, manifest: &ModpackManifest) -> Result<usize> {
        manifest.validate()?;
        let root = self.layout.root();
        let listed: HashSet<PathBuf> = manifest.files.iter().map(|e| e.local_path(root)).collect();
        let tools_dir = root.join(LOCAL_TOOLS_PREFIX.trim_end_matches('/'));

        let mut deleted = 0;
        for dir in MANAGED_DIRS {
            let dir = root.join(dir);
            if !dir.is_dir() {
                continue;
            }
            for file in walk_files(&dir).await? {
                if file.starts_with(&tools_dir) || listed.contains(&file) {
                    continue;
                }
                let protected = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(is_protected_name)
                    .unwrap_or(false);
                if protected {
                    continue;
                }
                match tokio::fs::remove_file(&file).await {
                    Ok(()) => {
                        log::info!("Removed unlisted file {:?}", file);
                        deleted += 1;
                    }
                    Err(e) => log::warn!("Failed to remove {:?}: {}", file, e),
                }
            }
        }
        Ok(deleted)
    }

    /// Download tasks for every corrupted or missing entry in `report`.
    ///
    /// Entry urls resolve against `base_url/`; entries without one use their path.
    pub fn plan_downloads(
        &self,
        manifest: &ModpackManifest,
        report: &IntegrityReport,
        base_url: &str,
    ) -> Result<Vec<DownloadTask>> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .with_context(|| format!("Invalid modpack server url: {}", base_url))?;
        let by_name: HashMap<&str, &ModpackFileEntry> =
            manifest.files.iter().map(|e| (e.path.as_str(), e)).collect();

        let mut tasks = Vec::new();
        for problem in report.corrupted.iter().chain(report.missing.iter()) {
            let Some(entry) = problem.name.as_deref().and_then(|n| by_name.get(n)) else {
                log::warn!("No manifest entry for {:?}", problem.path);
                continue;
            };
            let relative = entry
                .url
                .as_deref()
                .unwrap_or_else(|| entry.path.trim_start_matches('/'));
            let url = base
                .join(relative)
                .with_context(|| format!("Invalid url for {}", entry.path))?;
            tasks.push(
                DownloadTask::new(url.as_str(), problem.path.clone())
                    .with_sha1(Some(entry.sha1.clone()))
                    .with_size(Some(entry.size))
                    .with_name(entry.path.clone()),
            );
        }
        Ok(tasks)
    }

    /// Check, remove extras, download what is wrong, then require a clean re-check.
    pub async fn sync(
        &self,
        manifest: &ModpackManifest,
        base_url: &str,
        progress: &ProgressSender,
    ) -> Result<SyncReport> {
        manifest.validate()?;
        log::info!(
            "Synchronizing modpack {} v{} ({} files)",
            manifest.name,
            manifest.version,
            manifest.files.len()
        );

        progress.stage("Checking modpack files", 0, 4);
        let report = self.check(manifest).await?;

        progress.stage("Removing extra files", 1, 4);
        let deleted = self.cleanup(manifest).await?;

        progress.stage("Downloading modpack files", 2, 4);
        let tasks = self.plan_downloads(manifest, &report, base_url)?;
        let batch = self.engine.download_batch(tasks, progress).await;
        for failed in &batch.failed {
            log::error!("Modpack download failed for {}: {}", failed.task.display_name(), failed.error);
        }

        progress.stage("Verifying modpack", 3, 4);
        let after = self.check(manifest).await?;
        if !after.is_clean() {
            return Err(LauncherError::ModpackSyncIncomplete {
                corrupted: after.corrupted.len(),
                missing: after.missing.len(),
            }
            .into());
        }

        progress.stage("Modpack synchronized", 4, 4);
        Ok(SyncReport {
            downloaded: batch.completed,
            deleted,
        })
    }

    /// Whether every tracked file is present and matches its hash.
    pub async fn is_installed(&self, manifest: &ModpackManifest) -> bool {
        match self.check(manifest).await {
            Ok(report) => report.is_clean(),
            Err(e) => {
                log::warn!("Modpack check failed: {:#}", e);
                false
            }
        }
    }
}

async fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .with_context(|| format!("Failed to read {:?}", current))?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}
