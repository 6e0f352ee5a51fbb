use crate::game::installer::config::Endpoints;
use crate::game::installer::core::downloader::{BatchReport, DownloadEngine};
use crate::game::installer::types::{InstallLayout, ProgressSender};
use crate::game::launcher::rules::RuleContext;
use crate::game::launcher::version_parser::VersionDescriptor;
use anyhow::Result;
use futures::future::BoxFuture;

/// Shared state for one installation run
#[derive(Debug, Clone)]
pub struct InstallContext {
    pub engine: DownloadEngine,
    pub layout: InstallLayout,
    pub endpoints: Endpoints,
    pub rules: RuleContext,
}

impl InstallContext {
    pub fn new(engine: DownloadEngine, layout: InstallLayout) -> Self {
        Self {
            engine,
            layout,
            endpoints: Endpoints::default(),
            rules: RuleContext::current(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_rules(mut self, rules: RuleContext) -> Self {
        self.rules = rules;
        self
    }
}

/// One installable layer (the base game or a loader on top of it).
///
/// Implementations share helpers from `core`, not state.
pub trait LoaderInstaller: Send + Sync {
    /// Installed version id, the directory name under `versions/`
    fn id(&self) -> String;

    /// Make this layer's descriptor available on disk and return it unmerged.
    fn resolve<'a>(&'a self, ctx: &'a InstallContext) -> BoxFuture<'a, Result<VersionDescriptor>>;

    /// Download everything the layer's own descriptor declares.
    fn download_libraries<'a>(
        &'a self,
        ctx: &'a InstallContext,
        descriptor: &'a VersionDescriptor,
        progress: &'a ProgressSender,
    ) -> BoxFuture<'a, Result<BatchReport>>;
}
