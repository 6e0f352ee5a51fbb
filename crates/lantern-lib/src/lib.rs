//! Launcher core: resolves layered version descriptors, installs and verifies
//! the files they declare, and launches the game runtime.

pub mod error;
pub mod game;
pub mod utils;

pub use error::LauncherError;
