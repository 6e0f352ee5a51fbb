pub mod downloader;
pub mod jre_manager;
pub mod traits;

pub use downloader::{BatchReport, DownloadEngine, DownloadTask, FailedTask};
pub use jre_manager::{JavaManager, JavaRuntime};
pub use traits::{InstallContext, LoaderInstaller};
