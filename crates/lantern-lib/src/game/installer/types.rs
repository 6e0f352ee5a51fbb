use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// One advisory progress update. Never consulted for control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: String,
    pub current: u32,
    pub total: u32,
    pub percent: u8,
}

/// Cloneable sender half of a progress stream.
///
/// Operations take a `ProgressSender` instead of a callback; the receiver can be
/// dropped at any time without affecting the operation.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    /// Create a sender together with the receiving end of the stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that drops every event.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    pub fn stage(&self, stage: &str, current: u32, total: u32) {
        let percent = if total > 0 {
            ((current as f32 / total as f32) * 100.0).round().min(100.0) as u8
        } else {
            0
        };
        self.send(ProgressEvent {
            stage: stage.to_string(),
            current,
            total,
            percent,
        });
    }

    pub fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // receiver gone means nobody is listening
            let _ = tx.send(event);
        }
    }
}

/// On-disk layout of one install root.
///
/// The layout is shared with externally produced hash manifests, so these
/// relative paths must not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    pub root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn version_dir(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id)
    }

    /// `versions/<id>/<id>.json`
    pub fn version_json(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{}.json", id))
    }

    /// `versions/<id>/<id>.jar`
    pub fn version_jar(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{}.jar", id))
    }

    pub fn natives_dir(&self, id: &str) -> PathBuf {
        self.version_dir(id).join("natives")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn asset_index(&self, index_id: &str) -> PathBuf {
        self.assets_dir()
            .join("indexes")
            .join(format!("{}.json", index_id))
    }

    /// `assets/objects/<hash[0:2]>/<hash>`
    pub fn asset_object(&self, hash: &str) -> PathBuf {
        let prefix = hash.get(..2).unwrap_or(hash);
        self.assets_dir().join("objects").join(prefix).join(hash)
    }

    pub fn java_dir(&self) -> PathBuf {
        self.root.join("java")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

// Re-export LoaderKind from metadata module for consistency
pub use crate::game::metadata::LoaderKind;

/// Operating system types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsType {
    Windows,
    WindowsArm64,
    MacOS,
    MacOSArm64,
    Linux,
    LinuxArm32,
    LinuxArm64,
}

impl OsType {
    /// Detect the current OS
    pub fn current() -> Self {
        match (std::env::consts::OS, std::env::consts::ARCH) {
            ("windows", "aarch64") => OsType::WindowsArm64,
            ("windows", _) => OsType::Windows,
            ("macos", "aarch64") => OsType::MacOSArm64,
            ("macos", _) => OsType::MacOS,
            (_, "aarch64") => OsType::LinuxArm64,
            (_, "arm") => OsType::LinuxArm32,
            _ => OsType::Linux,
        }
    }

    /// Get the OS name as a string (for rule matching)
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::Windows | OsType::WindowsArm64 => "windows",
            OsType::Linux | OsType::LinuxArm32 | OsType::LinuxArm64 => "linux",
            OsType::MacOS | OsType::MacOSArm64 => "osx",
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, OsType::Windows | OsType::WindowsArm64)
    }

    /// Filename tags that mark a native archive for this OS, e.g. `natives-macos`.
    pub fn native_tags(&self) -> &'static [&'static str] {
        match self {
            OsType::Windows | OsType::WindowsArm64 => &["windows"],
            OsType::MacOS | OsType::MacOSArm64 => &["macos", "osx"],
            OsType::Linux | OsType::LinuxArm32 | OsType::LinuxArm64 => &["linux"],
        }
    }

    /// Get the classpath separator for this OS
    pub fn classpath_separator(&self) -> &'static str {
        match self {
            OsType::Windows | OsType::WindowsArm64 => ";",
            _ => ":",
        }
    }

    pub fn java_executable_name(&self) -> &'static str {
        if self.is_windows() {
            "java.exe"
        } else {
            "java"
        }
    }
}

/// Architecture types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
    X86,
    Arm64,
    Arm32,
}

impl Arch {
    /// Detect the current architecture
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86" => Arch::X86,
            "aarch64" => Arch::Arm64,
            "arm" => Arch::Arm32,
            _ => Arch::X64,
        }
    }

    /// Pointer width as used by descriptor rules and `${arch}` classifiers.
    pub fn bits(&self) -> &'static str {
        match self {
            Arch::X64 | Arch::Arm64 => "64",
            Arch::X86 | Arch::Arm32 => "32",
        }
    }

    pub fn is_arm(&self) -> bool {
        matches!(self, Arch::Arm64 | Arch::Arm32)
    }
}
