pub mod installer;
pub mod launcher;
pub mod metadata;
pub mod modpack;

pub use installer::{install_version, InstallOutcome, InstallRequest};
pub use launcher::{launch_game, LaunchHandle, LaunchSpec};
pub use modpack::launch_from_server;
