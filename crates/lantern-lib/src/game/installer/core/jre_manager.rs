use super::downloader::{extract_zip, DownloadEngine, DownloadTask};
use crate::error::LauncherError;
use crate::game::installer::config;
use crate::game::installer::types::{Arch, InstallLayout, OsType, ProgressSender};
use crate::game::launcher::version_parser::VersionDescriptor;
use crate::utils::process::LanternCommandExt;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

static VERSION_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"version\s+"([^"]+)""#).ok());

/// Pinned Temurin builds, used as the last mirror where one exists.
const TEMURIN_WINDOWS_X64: &[(u32, &str)] = &[
    (8, "https://github.com/adoptium/temurin8-binaries/releases/download/jdk8u472-b08/OpenJDK8U-jdk_x64_windows_hotspot_8u472b08.zip"),
    (17, "https://github.com/adoptium/temurin17-binaries/releases/download/jdk-17.0.17%2B10/OpenJDK17U-jdk_x64_windows_hotspot_17.0.17_10.zip"),
    (21, "https://github.com/adoptium/temurin21-binaries/releases/download/jdk-21.0.9%2B10/OpenJDK21U-jdk_x64_windows_hotspot_21.0.9_10.zip"),
];

/// An installed, usable Java runtime
#[derive(Debug, Clone, PartialEq)]
pub struct JavaRuntime {
    pub major: u32,
    pub home: PathBuf,
    pub executable: PathBuf,
    /// As reported by `java -version`; best-effort
    pub version: Option<String>,
    pub vendor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZuluPackage {
    download_url: String,
}

/// Required Java major version for a game version.
///
/// 1.17.x is the only band that needs Java 16.
pub fn required_java_major(game_version: &str) -> u32 {
    let core = game_version.split(['-', ' ']).next().unwrap_or(game_version);
    let mut parts = core.split('.');

    let (Some("1"), Some(minor)) = (parts.next(), parts.next()) else {
        return 21;
    };
    let Ok(minor) = minor.parse::<u32>() else {
        return 21;
    };
    let patch = parts.next().and_then(|p| p.parse::<u32>().ok()).unwrap_or(0);

    match (minor, patch) {
        (..=16, _) => 8,
        (17, _) => 16,
        (18..=19, _) => 17,
        (20, ..=4) => 17,
        _ => 21,
    }
}

/// Prefer the descriptor's own `javaVersion`, else the range table.
pub fn required_java_for(descriptor: &VersionDescriptor, game_version: &str) -> u32 {
    descriptor
        .java_version
        .as_ref()
        .map(|j| j.major_version)
        .unwrap_or_else(|| required_java_major(game_version))
}

fn archive_ext(os: OsType) -> &'static str {
    if os.is_windows() {
        "zip"
    } else {
        "tar.gz"
    }
}

/// Ordered download sources for a runtime; the first that works wins.
pub fn runtime_mirrors(major: u32, os: OsType, arch: Arch) -> Vec<String> {
    let adoptium_os = match os {
        OsType::Windows | OsType::WindowsArm64 => "windows",
        OsType::MacOS | OsType::MacOSArm64 => "mac",
        OsType::Linux | OsType::LinuxArm32 | OsType::LinuxArm64 => "linux",
    };
    let adoptium_arch = match arch {
        Arch::X64 => "x64",
        Arch::X86 => "x32",
        Arch::Arm64 => "aarch64",
        Arch::Arm32 => "arm",
    };

    let zulu_os = match os {
        OsType::Windows | OsType::WindowsArm64 => "windows",
        OsType::MacOS | OsType::MacOSArm64 => "macos",
        OsType::Linux | OsType::LinuxArm32 | OsType::LinuxArm64 => "linux",
    };
    let zulu_arch = if arch.is_arm() { "arm" } else { "x86" };
    let ext = archive_ext(os);

    let mut mirrors = vec![
        format!(
            "{}/{}/ga/{}/{}/jre/hotspot/normal/eclipse",
            config::ADOPTIUM_API_URL,
            major,
            adoptium_os,
            adoptium_arch
        ),
        format!(
            "{}/?os={}&arch={}&hw_bitness={}&bundle_type=jre&javafx_bundled=false&java_version={}&ext={}&archive_type={}&latest=true&release_status=ga&availability_types=CA&page=1&page_size=1",
            config::ZULU_API_URL,
            zulu_os,
            zulu_arch,
            arch.bits(),
            major,
            ext,
            ext
        ),
    ];

    if os == OsType::Windows && arch == Arch::X64 {
        if let Some((_, url)) = TEMURIN_WINDOWS_X64.iter().find(|(m, _)| *m == major) {
            mirrors.push(url.to_string());
        }
    }

    mirrors
}

/// Locates and installs Java runtimes under `java/java-<major>`.
pub struct JavaManager {
    layout: InstallLayout,
    engine: DownloadEngine,
    os: OsType,
    arch: Arch,
    mirrors_override: Option<Vec<String>>,
}

impl JavaManager {
    pub fn new(layout: InstallLayout) -> Self {
        Self::with_engine(layout, DownloadEngine::new(1))
    }

    pub fn with_engine(layout: InstallLayout, engine: DownloadEngine) -> Self {
        Self {
            layout,
            engine,
            os: OsType::current(),
            arch: Arch::current(),
            mirrors_override: None,
        }
    }

    /// Replace the mirror list, e.g. with an internal artifact server.
    pub fn with_mirrors(mut self, mirrors: Vec<String>) -> Self {
        self.mirrors_override = Some(mirrors);
        self
    }

    pub fn runtime_home(&self, major: u32) -> PathBuf {
        self.layout.java_dir().join(format!("java-{}", major))
    }

    pub fn executable_path(&self, major: u32) -> PathBuf {
        self.runtime_home(major)
            .join("bin")
            .join(self.os.java_executable_name())
    }

    /// The executable of an installed runtime, if present.
    pub fn find_installed(&self, major: u32) -> Option<PathBuf> {
        let exe = self.executable_path(major);
        exe.is_file().then_some(exe)
    }

    /// Return an installed runtime for `major`, downloading it if needed.
    pub async fn ensure_runtime(&self, major: u32, progress: &ProgressSender) -> Result<JavaRuntime> {
        log::info!("Ensuring Java {} is available", major);

        if let Some(executable) = self.find_installed(major) {
            log::info!("Found existing Java installation: {:?}", executable);
            return Ok(self.describe(major, executable).await);
        }

        let mirrors = self
            .mirrors_override
            .clone()
            .unwrap_or_else(|| runtime_mirrors(major, self.os, self.arch));
        let total = mirrors.len() as u32;

        for (i, mirror) in mirrors.iter().enumerate() {
            progress.stage(&format!("Installing Java {}", major), i as u32, total);
            match self.install_from(major, mirror).await {
                Ok(executable) => {
                    progress.stage(&format!("Installing Java {}", major), total, total);
                    log::info!("Java {} installed from {}", major, mirror);
                    return Ok(self.describe(major, executable).await);
                }
                Err(e) => log::warn!("Java {} mirror {} failed: {:#}", major, mirror, e),
            }
        }

        Err(LauncherError::RuntimeUnavailable {
            major,
            attempts: mirrors.len(),
        }
        .into())
    }

    async fn describe(&self, major: u32, executable: PathBuf) -> JavaRuntime {
        let (version, vendor) = probe_runtime(&executable).await.unwrap_or((None, None));
        JavaRuntime {
            major,
            home: self.runtime_home(major),
            executable,
            version,
            vendor,
        }
    }

    async fn resolve_mirror(&self, mirror: &str) -> Result<String> {
        if !mirror.starts_with(config::ZULU_API_URL) {
            return Ok(mirror.to_string());
        }
        let packages: Vec<ZuluPackage> = self.engine.fetch_json_as(mirror, None).await?;
        packages
            .into_iter()
            .next()
            .map(|p| p.download_url)
            .context("No Zulu package found for this platform")
    }

    async fn install_from(&self, major: u32, mirror: &str) -> Result<PathBuf> {
        let url = self.resolve_mirror(mirror).await?;

        let java_dir = self.layout.java_dir();
        tokio::fs::create_dir_all(&java_dir).await?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&java_dir)
            .context("Failed to create staging directory")?;

        let archive_path = staging.path().join("runtime-archive");
        self.engine
            .download_task(&DownloadTask::new(&url, &archive_path).with_name(format!("Java {}", major)))
            .await?;

        let bytes = tokio::fs::read(&archive_path).await?;
        let extract_dir = staging.path().join("extract");
        tokio::fs::create_dir_all(&extract_dir).await?;
        if bytes.starts_with(b"PK") {
            extract_zip(bytes, &extract_dir).await?;
        } else {
            let dest = extract_dir.clone();
            tokio::task::spawn_blocking(move || extract_tar_gz(&bytes, &dest))
                .await
                .context("Runtime extraction task panicked")??;
        }

        let java_path = find_java_executable(&extract_dir, self.os.java_executable_name())
            .context("Could not find java executable after extraction")?;
        // bin/java -> runtime home
        let runtime_root = java_path
            .parent()
            .and_then(Path::parent)
            .context("Unexpected runtime layout")?
            .to_path_buf();

        let home = self.runtime_home(major);
        if tokio::fs::try_exists(&home).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&home).await?;
        }
        tokio::fs::rename(&runtime_root, &home)
            .await
            .with_context(|| format!("Failed to move runtime into {:?}", home))?;

        let executable = self.executable_path(major);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&executable)?.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&executable, perms)?;
        }

        Ok(executable)
    }
}

/// Extract a tar.gz archive
fn extract_tar_gz(data: &[u8], dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use std::io::Cursor;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));
    archive.unpack(dest).context("Failed to unpack tar.gz")?;
    Ok(())
}

/// Find the java executable in an extracted runtime.
///
/// Handles `bin/java` at the root, one nested `jdk*`/`jre*`/`zulu*` directory,
/// and the macOS `Contents/Home` bundle layout.
pub fn find_java_executable(dir: &Path, executable_name: &str) -> Option<PathBuf> {
    let direct = dir.join("bin").join(executable_name);
    if direct.is_file() {
        return Some(direct);
    }

    let macos = dir.join("Contents/Home/bin").join(executable_name);
    if macos.is_file() {
        return Some(macos);
    }

    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let nested = entry.path().join("bin").join(executable_name);
        if nested.is_file() {
            return Some(nested);
        }
        let macos = entry.path().join("Contents/Home/bin").join(executable_name);
        if macos.is_file() {
            return Some(macos);
        }
    }

    None
}

/// Parse version and vendor from `java -version` output.
pub fn parse_version_output(output: &str) -> (Option<String>, Option<String>) {
    let version = VERSION_RE
        .as_ref()
        .and_then(|re| re.captures(output))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let vendor = output
        .lines()
        .nth(1)
        .map(|l| l.split(" (build").next().unwrap_or(l).trim().to_string())
        .filter(|l| !l.is_empty());

    (version, vendor)
}

/// Run `java -version`. Best-effort: a runtime that fails the probe is still usable.
pub async fn probe_runtime(executable: &Path) -> Result<(Option<String>, Option<String>)> {
    let output = tokio::process::Command::new(executable)
        .arg("-version")
        .suppress_console()
        .output()
        .await
        .with_context(|| format!("Failed to run {:?} -version", executable))?;

    // java -version reports on stderr
    let text = String::from_utf8_lossy(&output.stderr);
    let parsed = parse_version_output(&text);
    if parsed.0.is_none() {
        log::warn!("Could not parse Java version from: {}", text.trim());
    }
    Ok(parsed)
}
