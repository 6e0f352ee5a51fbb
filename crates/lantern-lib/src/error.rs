use std::path::PathBuf;

/// Fatal launcher conditions that callers need to tell apart.
///
/// These are raised inside `anyhow::Error`; use `err.downcast_ref::<LauncherError>()`
/// to recover the cause.
#[derive(Debug, thiserror::Error)]
pub enum LauncherError {
    #[error("Version {child} inherits from {parent}, which is not installed")]
    MissingParentVersion { child: String, parent: String },

    #[error("Base game jar for {version} not found: {}", path.display())]
    MissingBaseJar { version: String, path: PathBuf },

    #[error("Java runtime not found: {}", path.display())]
    RuntimeNotFound { path: PathBuf },

    #[error("Java {major} could not be installed from any mirror ({attempts} tried)")]
    RuntimeUnavailable { major: u32, attempts: usize },

    #[error("Network request failed for {url}: {status}")]
    Network { url: String, status: String },

    #[error("Installation is still damaged after repair: {corrupted} corrupted, {missing} missing")]
    IntegrityUnrecoverable { corrupted: usize, missing: usize },

    #[error("Failed to start {}: {source}", executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest declares an unsafe path: {path}")]
    InvalidManifestPath { path: String },

    #[error("Modpack synchronization incomplete: {corrupted} corrupted, {missing} missing")]
    ModpackSyncIncomplete { corrupted: usize, missing: usize },

    #[error("Version {version} not found in the version manifest")]
    VersionNotFound { version: String },

    #[error("Fabric loader {loader_version} is not available for {game_version}")]
    LoaderNotFound {
        loader_version: String,
        game_version: String,
    },

    #[error("Invalid Maven coordinates: {coords}")]
    InvalidCoordinate { coords: String },
}
