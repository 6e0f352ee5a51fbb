use crate::error::LauncherError;
use crate::game::installer::config;
use crate::game::installer::types::ProgressSender;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use rand::Rng;
use reqwest::{Client, StatusCode};
use sha1::{Digest, Sha1};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::{create_dir_all, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

/// One file to materialize on disk.
///
/// `urls` is an ordered candidate list; the first entry is the primary source and
/// the rest are mirrors tried on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub urls: Vec<String>,
    pub path: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
    pub name: Option<String>,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            urls: vec![url.into()],
            path: path.into(),
            sha1: None,
            size: None,
            name: None,
        }
    }

    pub fn with_sha1(mut self, sha1: Option<String>) -> Self {
        self.sha1 = sha1.map(|s| s.to_lowercase());
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_mirrors<I, S>(mut self, mirrors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls.extend(mirrors.into_iter().map(Into::into));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path.display().to_string())
        })
    }
}

#[derive(Debug, Clone)]
pub struct FailedTask {
    pub task: DownloadTask,
    pub error: String,
}

/// Outcome of a batch. Callers decide whether any failure is fatal.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub completed: usize,
    pub total: usize,
    pub failed: Vec<FailedTask>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Fold another batch into this one.
    pub fn absorb(&mut self, other: BatchReport) {
        self.completed += other.completed;
        self.total += other.total;
        self.failed.extend(other.failed);
    }
}

type JsonCache = HashMap<String, (Instant, serde_json::Value)>;

/// Bounded-concurrency downloader with retry, mirror fallback and a small JSON cache.
#[derive(Clone)]
pub struct DownloadEngine {
    client: Client,
    concurrency: usize,
    max_attempts: u32,
    retry_delay: Duration,
    json_cache: Arc<Mutex<JsonCache>>,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("concurrency", &self.concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    pub fn new(concurrency: usize) -> Self {
        let client = build_client().unwrap_or_else(|e| {
            log::warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        });
        Self::with_client(client, concurrency, config::MAX_DOWNLOAD_ATTEMPTS)
    }

    /// Use a caller-provided client. The engine follows redirects itself, so the
    /// client should be built with `redirect::Policy::none()`.
    pub fn with_client(client: Client, concurrency: usize, max_attempts: u32) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            max_attempts: max_attempts.max(1),
            retry_delay: Duration::from_millis(config::RETRY_DELAY_MS),
            json_cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Same client and cache, different worker count.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Download every task with at most `concurrency` in flight.
    pub async fn download_batch(
        &self,
        tasks: Vec<DownloadTask>,
        progress: &ProgressSender,
    ) -> BatchReport {
        // Deduplicate by path to avoid concurrent writes to the same file
        let mut unique = Vec::with_capacity(tasks.len());
        let mut seen_paths = HashSet::new();
        for task in tasks {
            if seen_paths.insert(task.path.clone()) {
                unique.push(task);
            }
        }

        let total = unique.len();
        let mut report = BatchReport {
            total,
            ..Default::default()
        };
        if total == 0 {
            return report;
        }

        log::info!(
            "Downloading {} files with concurrency {}",
            total,
            self.concurrency
        );
        let done = Arc::new(AtomicUsize::new(0));
        progress.stage("Downloading", 0, total as u32);

        let results: Vec<(DownloadTask, Result<bool>)> = stream::iter(unique)
            .map(|task| {
                let done = done.clone();
                async move {
                    let result = self.download_task(&task).await;
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    progress.stage("Downloading", finished as u32, total as u32);
                    (task, result)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (task, result) in results {
            match result {
                Ok(_) => report.completed += 1,
                Err(e) => {
                    log::error!("Download failed for {}: {:#}", task.display_name(), e);
                    report.failed.push(FailedTask {
                        task,
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        log::info!(
            "Batch finished: {}/{} completed, {} failed",
            report.completed,
            report.total,
            report.failed.len()
        );
        report
    }

    /// Download one task. Returns `Ok(false)` when the file was already valid.
    pub async fn download_task(&self, task: &DownloadTask) -> Result<bool> {
        if is_already_valid(task).await {
            return Ok(false);
        }

        if task.urls.is_empty() {
            anyhow::bail!("No source URL for {}", task.display_name());
        }

        if let Some(parent) = task.path.parent() {
            create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        // every candidate gets at least one attempt
        let attempts = self.max_attempts.max(task.urls.len() as u32);
        let mut last_error = None;
        for attempt in 0..attempts {
            let url = &task.urls[attempt as usize % task.urls.len()];
            match self.fetch_to_path(url, task).await {
                Ok(()) => {
                    log::debug!("Download complete: {:?}", task.path);
                    return Ok(true);
                }
                Err(e) => {
                    log::warn!(
                        "Download failed (attempt {}/{}) for {}: {:#}",
                        attempt + 1,
                        attempts,
                        url,
                        e
                    );
                    last_error = Some(e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.backoff(attempt + 1)).await;
                    }
                }
            }
        }

        let err = last_error.unwrap_or_else(|| anyhow::anyhow!("no attempts made"));
        Err(err).with_context(|| {
            format!(
                "Failed to download {} after {} attempts",
                task.display_name(),
                attempts
            )
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry_delay.as_millis() as u64 * attempt as u64;
        let jitter = rand::rng().random_range(0..=self.retry_delay.as_millis() as u64 / 4);
        Duration::from_millis(base + jitter)
    }

    async fn fetch_to_path(&self, url: &str, task: &DownloadTask) -> Result<()> {
        let start = Instant::now();
        let response = self.get(url).await?;

        // Write to a temporary file first, then rename into place so a failed
        // download never leaves a partial file at the destination.
        let tmp_name = format!(
            "{}.part",
            task.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("download")
        );
        let tmp_path = task.path.with_file_name(tmp_name);
        let mut file = File::create(&tmp_path).await?;
        let mut downloaded: u64 = 0;
        let mut hasher = Sha1::new();

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    return Err(e).context("Connection dropped mid-transfer");
                }
            };
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = &task.sha1 {
            let computed = hex(&hasher.finalize());
            if !computed.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                anyhow::bail!(
                    "SHA1 mismatch for {}: expected {}, got {}",
                    url,
                    expected,
                    computed
                );
            }
        } else if let Some(size) = task.size {
            if size != downloaded {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                anyhow::bail!("Size mismatch for {}: expected {}, got {}", url, size, downloaded);
            }
        }

        tokio::fs::rename(&tmp_path, &task.path).await?;

        let secs = start.elapsed().as_secs_f64();
        log::debug!(
            "Download stats: url={}, size={} bytes, time={:.2}s, throughput={:.2} MB/s",
            url,
            downloaded,
            secs,
            (downloaded as f64 / 1024.0 / 1024.0) / secs.max(0.001)
        );
        Ok(())
    }

    /// GET following 301/302/307/308 up to `MAX_REDIRECTS` hops. Non-success
    /// statuses become `LauncherError::Network`.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let mut current = url.to_string();
        for _ in 0..=config::MAX_REDIRECTS {
            let response = self
                .client
                .get(&current)
                .send()
                .await
                .map_err(|e| LauncherError::Network {
                    url: current.clone(),
                    status: e.to_string(),
                })?;

            let status = response.status();
            if is_redirect(status) {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| anyhow::anyhow!("Redirect without Location from {}", current))?;
                let next = url::Url::parse(&current)
                    .and_then(|base| base.join(location))
                    .with_context(|| format!("Bad redirect target {:?}", location))?;
                log::debug!("Redirect {} -> {}", current, next);
                current = next.to_string();
                continue;
            }

            if !status.is_success() {
                return Err(LauncherError::Network {
                    url: current,
                    status: status.to_string(),
                }
                .into());
            }
            return Ok(response);
        }

        anyhow::bail!("Too many redirects starting at {}", url)
    }

    /// Fetch a JSON document. With `ttl`, a fresh cached copy is returned without
    /// touching the network.
    pub async fn fetch_json(&self, url: &str, ttl: Option<Duration>) -> Result<serde_json::Value> {
        if let Some(ttl) = ttl {
            let cache = self.json_cache.lock().await;
            if let Some((fetched_at, value)) = cache.get(url) {
                if fetched_at.elapsed() < ttl {
                    log::debug!("JSON cache hit: {}", url);
                    return Ok(value.clone());
                }
            }
        }

        log::debug!("Downloading JSON: {}", url);
        let value: serde_json::Value = self
            .get(url)
            .await?
            .json()
            .await
            .with_context(|| format!("Invalid JSON from {}", url))?;

        if ttl.is_some() {
            self.json_cache
                .lock()
                .await
                .insert(url.to_string(), (Instant::now(), value.clone()));
        }
        Ok(value)
    }

    pub async fn fetch_json_as<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        ttl: Option<Duration>,
    ) -> Result<T> {
        let value = self.fetch_json(url, ttl).await?;
        serde_json::from_value(value).with_context(|| format!("Unexpected JSON shape from {}", url))
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self.get(url).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(config::request_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(format!(
            "{}/{}",
            config::LAUNCHER_NAME,
            config::LAUNCHER_VERSION
        ))
        .build()
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

async fn is_already_valid(task: &DownloadTask) -> bool {
    if !tokio::fs::try_exists(&task.path).await.unwrap_or(false) {
        return false;
    }

    let Some(expected) = &task.sha1 else {
        log::debug!("File exists and no hash provided, skipping: {:?}", task.path);
        return true;
    };

    match sha1_file(&task.path).await {
        Ok(computed) if computed.eq_ignore_ascii_case(expected) => {
            log::debug!("File exists and hash matches, skipping: {:?}", task.path);
            true
        }
        Ok(computed) => {
            log::info!(
                "File exists but hash mismatches ({} != {}), re-downloading: {:?}",
                computed,
                expected,
                task.path
            );
            false
        }
        Err(e) => {
            log::warn!("Failed to hash existing file {:?}: {}", task.path, e);
            false
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn sha1_bytes(bytes: &[u8]) -> String {
    hex(&Sha1::digest(bytes))
}

/// Stream a file through SHA-1.
pub async fn sha1_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open {:?} for hashing", path))?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

/// Extract a zip archive to a directory, returning the number of files written.
/// Entries whose path would escape `dest_dir` are skipped.
pub async fn extract_zip(zip_bytes: Vec<u8>, dest_dir: &Path) -> Result<usize> {
    log::debug!("Extracting zip to: {:?}", dest_dir);
    create_dir_all(dest_dir).await?;

    let dest = dest_dir.to_path_buf();
    let written = tokio::task::spawn_blocking(move || unpack_zip(&zip_bytes, &dest))
        .await
        .context("Zip extraction task panicked")??;

    log::debug!("Zip extraction complete: {} files", written);
    Ok(written)
}

fn unpack_zip(zip_bytes: &[u8], dest_dir: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes))?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(relative) = file.enclosed_name() else {
            log::warn!("Skipping unsafe zip entry: {}", file.name());
            continue;
        };
        let outpath = dest_dir.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(p) = outpath.parent() {
            std::fs::create_dir_all(p)?;
        }
        let mut outfile = std::fs::File::create(&outpath)?;
        std::io::copy(&mut file, &mut outfile)?;
        written += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(written)
}
