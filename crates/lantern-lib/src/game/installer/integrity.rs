/// Integrity verification and repair of installed files
use crate::error::LauncherError;
use crate::game::installer::config::RESOURCES_URL;
use crate::game::installer::core::downloader::{sha1_file, DownloadEngine, DownloadTask};
use crate::game::installer::types::{InstallLayout, ProgressSender};
use crate::game::launcher::classpath::library_tasks;
use crate::game::launcher::rules::RuleContext;
use crate::game::launcher::version_parser::{base_version_id, resolve_version, VersionDescriptor};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Parallel hashing limit for checks
const CHECK_CONCURRENCY: usize = 8;

/// `assets/indexes/<id>.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetIndexFile {
    #[serde(default)]
    pub objects: HashMap<String, AssetObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

/// Classification of a declared file set against disk.
///
/// The three lists are disjoint. A report reflects one moment; re-check rather
/// than reuse it after anything touches the tree.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub valid: Vec<PathBuf>,
    pub corrupted: Vec<DownloadTask>,
    pub missing: Vec<DownloadTask>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.corrupted.is_empty() && self.missing.is_empty()
    }

    /// Tasks that would fix every problem
    pub fn problems(&self) -> Vec<DownloadTask> {
        self.corrupted
            .iter()
            .chain(self.missing.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
enum FileState {
    Valid,
    Corrupted,
    Missing,
}

/// Download tasks for assets listed by an asset index, one per object hash.
pub fn asset_tasks(
    layout: &InstallLayout,
    index: &AssetIndexFile,
    resources_url: &str,
) -> Vec<DownloadTask> {
    let base = resources_url.trim_end_matches('/');
    let mut seen = HashSet::new();
    let mut objects: Vec<(&String, &AssetObject)> = index.objects.iter().collect();
    objects.sort_by(|a, b| a.0.cmp(b.0));

    objects
        .into_iter()
        .filter(|(_, obj)| obj.hash.len() > 2 && seen.insert(obj.hash.clone()))
        .map(|(name, obj)| {
            let url = format!("{}/{}/{}", base, &obj.hash[..2], obj.hash);
            DownloadTask::new(url, layout.asset_object(&obj.hash))
                .with_sha1(Some(obj.hash.clone()))
                .with_size(Some(obj.size))
                .with_name(name)
        })
        .collect()
}

/// Every file `descriptor` needs, with the client jar stored under `descriptor.id`.
pub async fn expected_files(
    layout: &InstallLayout,
    descriptor: &VersionDescriptor,
    ctx: &RuleContext,
) -> Result<Vec<DownloadTask>> {
    expected_files_for(layout, descriptor, &descriptor.id, ctx).await
}

/// Like [`expected_files`], with the client jar stored under `jar_version`.
///
/// Asset objects come from the asset index on disk; if it is absent only the
/// index itself is listed.
pub async fn expected_files_for(
    layout: &InstallLayout,
    descriptor: &VersionDescriptor,
    jar_version: &str,
    ctx: &RuleContext,
) -> Result<Vec<DownloadTask>> {
    let mut tasks = Vec::new();

    if let Some(client) = descriptor.client_artifact() {
        if let Some(url) = &client.url {
            tasks.push(
                DownloadTask::new(url, layout.version_jar(jar_version))
                    .with_sha1(client.sha1.clone())
                    .with_size(client.size)
                    .with_name(format!("{}.jar", jar_version)),
            );
        }
    }

    tasks.extend(library_tasks(layout, descriptor, ctx)?);

    if let Some(index_ref) = &descriptor.asset_index {
        let index_path = layout.asset_index(&index_ref.id);
        if let Some(url) = &index_ref.url {
            tasks.push(
                DownloadTask::new(url, &index_path)
                    .with_sha1(index_ref.sha1.clone())
                    .with_size(index_ref.size)
                    .with_name(format!("asset index {}", index_ref.id)),
            );
        }

        if let Ok(bytes) = tokio::fs::read(&index_path).await {
            match serde_json::from_slice::<AssetIndexFile>(&bytes) {
                Ok(index) => tasks.extend(asset_tasks(layout, &index, RESOURCES_URL)),
                Err(e) => log::warn!("Unreadable asset index {:?}: {}", index_path, e),
            }
        }
    }

    Ok(tasks)
}

async fn classify(task: &DownloadTask) -> FileState {
    let metadata = match tokio::fs::metadata(&task.path).await {
        Ok(m) if m.is_file() => m,
        _ => return FileState::Missing,
    };

    // size first, hashing is the expensive part
    if let Some(size) = task.size {
        if metadata.len() != size {
            return FileState::Corrupted;
        }
    }

    match &task.sha1 {
        Some(expected) => match sha1_file(&task.path).await {
            Ok(actual) if actual.eq_ignore_ascii_case(expected) => FileState::Valid,
            Ok(_) => FileState::Corrupted,
            Err(e) => {
                log::warn!("Failed to hash {:?}: {:#}", task.path, e);
                FileState::Corrupted
            }
        },
        None => FileState::Valid,
    }
}

/// Classify `tasks` against disk. Duplicate paths are checked once.
pub async fn check_files(tasks: &[DownloadTask]) -> IntegrityReport {
    let mut seen = HashSet::new();
    let unique: Vec<&DownloadTask> = tasks.iter().filter(|t| seen.insert(&t.path)).collect();

    let states: Vec<(&DownloadTask, FileState)> = stream::iter(unique)
        .map(|task| async move { (task, classify(task).await) })
        .buffer_unordered(CHECK_CONCURRENCY)
        .collect()
        .await;

    let mut report = IntegrityReport::default();
    for (task, state) in states {
        match state {
            FileState::Valid => report.valid.push(task.path.clone()),
            FileState::Corrupted => report.corrupted.push(task.clone()),
            FileState::Missing => report.missing.push(task.clone()),
        }
    }
    report.valid.sort();
    report.corrupted.sort_by(|a, b| a.path.cmp(&b.path));
    report.missing.sort_by(|a, b| a.path.cmp(&b.path));

    log::debug!(
        "Integrity: {} valid, {} corrupted, {} missing",
        report.valid.len(),
        report.corrupted.len(),
        report.missing.len()
    );
    report
}

/// Check every file an installed version needs.
pub async fn check_version(
    layout: &InstallLayout,
    version_id: &str,
    ctx: &RuleContext,
) -> Result<IntegrityReport> {
    let descriptor = resolve_version(layout, version_id).await?;
    let jar_version = base_version_id(layout, version_id)
        .await?
        .unwrap_or_else(|| version_id.to_string());
    let tasks = expected_files_for(layout, &descriptor, &jar_version, ctx).await?;
    Ok(check_files(&tasks).await)
}

/// One repair pass: re-download every corrupted or missing file, then re-check them.
pub async fn repair(
    engine: &DownloadEngine,
    report: IntegrityReport,
    progress: &ProgressSender,
) -> Result<IntegrityReport> {
    if report.is_clean() {
        return Ok(report);
    }

    log::info!(
        "Repairing {} corrupted and {} missing files",
        report.corrupted.len(),
        report.missing.len()
    );

    // without a hash the downloader would accept the damaged file as-is
    for task in &report.corrupted {
        if let Err(e) = tokio::fs::remove_file(&task.path).await {
            log::warn!("Failed to remove corrupted {:?}: {}", task.path, e);
        }
    }

    let problems = report.problems();
    let batch = engine.download_batch(problems.clone(), progress).await;
    for failed in &batch.failed {
        log::error!("Repair failed for {}: {}", failed.task.display_name(), failed.error);
    }

    let mut after = check_files(&problems).await;
    after.valid.extend(report.valid);
    after.valid.sort();
    Ok(after)
}

/// Check, repair once, and fail if anything is still wrong.
pub async fn verify_and_repair(
    engine: &DownloadEngine,
    layout: &InstallLayout,
    version_id: &str,
    ctx: &RuleContext,
    progress: &ProgressSender,
) -> Result<IntegrityReport> {
    progress.stage("Verifying files", 0, 1);
    let report = check_version(layout, version_id, ctx)
        .await
        .with_context(|| format!("Failed to verify {}", version_id))?;
    if report.is_clean() {
        log::info!("{}: all {} files valid", version_id, report.valid.len());
        progress.stage("Verifying files", 1, 1);
        return Ok(report);
    }

    let after = repair(engine, report, progress).await?;
    progress.stage("Verifying files", 1, 1);
    if !after.is_clean() {
        return Err(LauncherError::IntegrityUnrecoverable {
            corrupted: after.corrupted.len(),
            missing: after.missing.len(),
        }
        .into());
    }
    Ok(after)
}
