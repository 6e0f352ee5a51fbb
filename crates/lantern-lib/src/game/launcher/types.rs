/// Core types for game launching
use crate::game::installer::types::InstallLayout;
use crate::game::launcher::arguments::MemoryBudget;
use crate::game::launcher::registry::ProcessRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Specification for launching an installed version
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Install tree; also the game's working directory
    pub layout: InstallLayout,

    /// Installed version ID (e.g., "1.20.4" or "fabric-loader-0.15.0-1.20.4")
    pub version_id: String,

    /// Offline player name
    pub player_name: String,

    pub memory: MemoryBudget,

    /// Java executable. When unset, the managed runtime for the version's
    /// required major under `java/` is used.
    pub java_path: Option<PathBuf>,

    /// Window size (optional)
    pub resolution: Option<(u32, u32)>,

    /// Appended after the generated JVM arguments
    pub extra_jvm_args: Vec<String>,

    /// Appended after the generated game arguments
    pub extra_game_args: Vec<String>,

    /// Registry the started process is recorded in until it exits
    pub registry: Option<ProcessRegistry>,
}

impl LaunchSpec {
    pub fn new(
        layout: InstallLayout,
        version_id: impl Into<String>,
        player_name: impl Into<String>,
    ) -> Self {
        Self {
            layout,
            version_id: version_id.into(),
            player_name: player_name.into(),
            memory: MemoryBudget::default(),
            java_path: None,
            resolution: None,
            extra_jvm_args: Vec::new(),
            extra_game_args: Vec::new(),
            registry: None,
        }
    }

    pub fn with_memory(mut self, memory: MemoryBudget) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_java(mut self, java_path: impl Into<PathBuf>) -> Self {
        self.java_path = Some(java_path.into());
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some((width, height));
        self
    }

    pub fn with_registry(mut self, registry: ProcessRegistry) -> Self {
        self.registry = Some(registry);
        self
    }
}

/// Observable transitions of a launched game process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchEvent {
    Started { pid: u32 },
    /// `code` is `None` when the process was ended by a signal
    Exited { code: Option<i32> },
}

/// Returned as soon as the process has a PID
#[derive(Debug)]
pub struct LaunchHandle {
    pub pid: u32,
    pub version_id: String,
    pub events: mpsc::Receiver<LaunchEvent>,
}

/// A running game tracked by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningGame {
    pub pid: u32,
    pub version_id: String,
    pub started_at: DateTime<Utc>,
}
