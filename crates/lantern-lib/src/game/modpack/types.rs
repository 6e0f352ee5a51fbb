use crate::error::LauncherError;
use crate::game::installer::types::LoaderKind;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths under this prefix belong to the user's own tools and are never synced.
pub const LOCAL_TOOLS_PREFIX: &str = "apps/";

/// Manifest paths starting with this are placed at the install root.
pub const ROOT_PLACEMENT_PREFIX: &str = "file/";

/// User-editable files: downloaded when absent, never replaced or deleted once present.
pub const PROTECTED_FILES: [&str; 5] = [
    "options.txt",
    "launcher_profiles.json",
    "servers.dat",
    "servers.dat_old",
    "usercache.json",
];

/// Directories whose contents are owned by the modpack.
pub const MANAGED_DIRS: [&str; 1] = ["mods"];

/// Server-declared modpack (`<server>/manifest`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModpackManifest {
    pub minecraft: String,
    #[serde(default)]
    pub loader: LoaderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader_version: Option<String>,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub files: Vec<ModpackFileEntry>,
}

fn default_name() -> String {
    "Custom Modpack".to_string()
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModpackFileEntry {
    /// Relative path as declared by the server, e.g. "mods/example.jar"
    pub path: String,
    pub sha1: String,
    pub size: u64,
    /// Download location, relative to the server base or absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ModpackManifest {
    /// Reject any entry that could escape the install root.
    ///
    /// Runs before anything touches the disk.
    pub fn validate(&self) -> Result<()> {
        for entry in &self.files {
            entry.validate()?;
        }
        Ok(())
    }
}

impl ModpackFileEntry {
    pub fn validate(&self) -> Result<()> {
        if is_unsafe_path(&self.path) {
            return Err(LauncherError::InvalidManifestPath {
                path: self.path.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Path relative to the install root, with the root-placement prefix removed.
    pub fn relative_path(&self) -> &str {
        self.path
            .strip_prefix(ROOT_PLACEMENT_PREFIX)
            .unwrap_or(&self.path)
    }

    pub fn local_path(&self, root: &Path) -> PathBuf {
        self.relative_path()
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(root.to_path_buf(), |path, part| path.join(part))
    }

    pub fn file_name(&self) -> &str {
        self.relative_path()
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    pub fn is_local_tool(&self) -> bool {
        self.path.starts_with(LOCAL_TOOLS_PREFIX)
    }

    pub fn is_protected(&self) -> bool {
        is_protected_name(self.file_name())
    }
}

pub fn is_protected_name(name: &str) -> bool {
    PROTECTED_FILES.contains(&name)
}

fn is_unsafe_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return true;
    }
    // "/etc", "\\server\share", "C:\..." and "C:/..."
    if path.starts_with('/') || path.starts_with('\\') || Path::new(path).is_absolute() {
        return true;
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }
    let relative = path.strip_prefix(ROOT_PLACEMENT_PREFIX).unwrap_or(path);
    if relative.trim_matches(|c| c == '/' || c == '\\').is_empty() {
        return true;
    }
    relative.split(['/', '\\']).any(|part| part == "..")
}

/// Result of a completed synchronization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub downloaded: usize,
    pub deleted: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> ModpackFileEntry {
        ModpackFileEntry {
            path: path.to_string(),
            sha1: "0".repeat(40),
            size: 1,
            url: None,
        }
    }

    #[test]
    fn manifest_defaults() {
        let manifest: ModpackManifest =
            serde_json::from_str(r#"{"minecraft": "1.20.4", "files": []}"#).unwrap();
        assert_eq!(manifest.loader, LoaderKind::Vanilla);
        assert_eq!(manifest.name, "Custom Modpack");
        assert_eq!(manifest.version, "1.0");
        assert!(manifest.loader_version.is_none());

        let fabric: ModpackManifest = serde_json::from_str(
            r#"{"minecraft": "1.20.4", "loader": "fabric", "loader_version": "0.15.0",
                "files": [{"path": "mods/a.jar", "sha1": "abc", "size": 3, "url": "a.jar"}]}"#,
        )
        .unwrap();
        assert_eq!(fabric.loader, LoaderKind::Fabric);
        assert_eq!(fabric.files[0].url.as_deref(), Some("a.jar"));
    }

    #[test]
    fn rejects_escaping_paths() {
        for path in [
            "",
            "  ",
            "/etc/passwd",
            "\\\\server\\share",
            "C:\\Windows\\x.dll",
            "c:/x",
            "../outside.jar",
            "mods/../../outside.jar",
            "mods\\..\\..\\outside.jar",
            "file/",
        ] {
            let err = entry(path).validate().unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<LauncherError>(),
                    Some(LauncherError::InvalidManifestPath { .. })
                ),
                "{:?} should be rejected",
                path
            );
        }
    }

    #[test]
    fn accepts_nested_paths() {
        for path in ["mods/example.jar", "config/sodium/options.json", "file/options.txt", "mods/a..b.jar"] {
            entry(path).validate().unwrap();
        }
    }

    #[test]
    fn root_placement_prefix_is_stripped() {
        let e = entry("file/options.txt");
        assert_eq!(e.relative_path(), "options.txt");
        assert_eq!(e.local_path(Path::new("/root")), Path::new("/root/options.txt"));
        assert!(e.is_protected());

        let e = entry("mods/example.jar");
        assert_eq!(e.local_path(Path::new("/root")), Path::new("/root/mods/example.jar"));
        assert!(!e.is_protected());
        assert!(entry("apps/tool.exe").is_local_tool());
    }
}
