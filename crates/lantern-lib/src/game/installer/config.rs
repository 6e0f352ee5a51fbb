//! Centralized installer and launcher settings.
//! Static constants; per-user values (player name, memory) arrive through `LaunchSpec`.

use std::time::Duration;

// Network
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const MAX_DOWNLOAD_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY_MS: u64 = 1000;
pub const MAX_REDIRECTS: usize = 10;

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const MODPACK_CONCURRENCY: usize = 6;

/// In-memory TTL for `DownloadEngine::fetch_json`.
pub const JSON_CACHE_TTL_SECS: u64 = 5 * 60;
/// On-disk TTL for the cached version manifest.
pub const MANIFEST_CACHE_TTL_HOURS: i64 = 6;
/// How many releases are offered by default.
pub const RELEASE_LIST_CAP: usize = 30;

pub const NATIVES_FINGERPRINT_FILE: &str = ".natives-cache";
pub const LAUNCHER_ERROR_LOG: &str = "launcher-error.log";
/// stderr lines kept for the error log
pub const STDERR_TAIL_LINES: usize = 500;

pub const LAUNCHER_NAME: &str = "Lantern";
pub const LAUNCHER_VERSION: &str = env!("CARGO_PKG_VERSION");

// URL Constants
pub const VANILLA_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";
pub const MOJANG_LIBRARIES_URL: &str = "https://libraries.minecraft.net/";
pub const RESOURCES_URL: &str = "https://resources.download.minecraft.net/";
pub const FABRIC_META_URL: &str = "https://meta.fabricmc.net/v2";
pub const FABRIC_MAVEN_URL: &str = "https://maven.fabricmc.net/";
pub const ADOPTIUM_API_URL: &str = "https://api.adoptium.net/v3/binary/latest";
pub const ZULU_API_URL: &str = "https://api.azul.com/metadata/v1/zulu/packages";

pub fn request_timeout() -> Duration {
    Duration::from_secs(REQUEST_TIMEOUT_SECS)
}

pub fn json_cache_ttl() -> Duration {
    Duration::from_secs(JSON_CACHE_TTL_SECS)
}

/// Remote endpoints used by installers and metadata lookups.
///
/// `Default` points at the public services; tests point them at a local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub version_manifest: String,
    pub resources: String,
    pub fabric_meta: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            version_manifest: VANILLA_MANIFEST_URL.to_string(),
            resources: RESOURCES_URL.to_string(),
            fabric_meta: FABRIC_META_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// All endpoints under one base URL, laid out like the public services.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            version_manifest: format!("{}/mc/game/version_manifest_v2.json", base),
            resources: format!("{}/resources/", base),
            fabric_meta: format!("{}/fabric/v2", base),
        }
    }
}
