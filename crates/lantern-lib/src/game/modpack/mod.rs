//! Server-published modpacks: manifest types, file synchronization and the
//! fetch-install-sync entry point.

pub mod launcher;
pub mod sync;
pub mod types;

pub use launcher::{launch_from_server, normalize_server_url, ServerModpack};
pub use sync::ModpackSynchronizer;
pub use types::{ModpackFileEntry, ModpackManifest, SyncReport};
