/// Process registry for tracking running games
use crate::game::launcher::types::RunningGame;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, ProcessStatus, System};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

/// Running games keyed by PID.
///
/// Cheap to clone; clones share the same table. The running count is published on
/// a `watch` channel so a host can react when the last game exits.
#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    games: Arc<RwLock<HashMap<u32, RunningGame>>>,
    count: Arc<watch::Sender<usize>>,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            games: Arc::new(RwLock::new(HashMap::new())),
            count: Arc::new(count),
        }
    }

    /// Record a started game
    pub async fn add(&self, pid: u32, version_id: &str) {
        log::info!("Registering {} (PID {})", version_id, pid);
        let mut games = self.games.write().await;
        games.insert(
            pid,
            RunningGame {
                pid,
                version_id: version_id.to_string(),
                started_at: Utc::now(),
            },
        );
        self.count.send_replace(games.len());
    }

    pub async fn remove(&self, pid: u32) -> Option<RunningGame> {
        let mut games = self.games.write().await;
        let removed = games.remove(&pid);
        if removed.is_some() {
            log::info!("Unregistered PID {}", pid);
        }
        self.count.send_replace(games.len());
        removed
    }

    /// Snapshot ordered by start time
    pub async fn list(&self) -> Vec<RunningGame> {
        let games = self.games.read().await;
        let mut list: Vec<RunningGame> = games.values().cloned().collect();
        list.sort_by_key(|g| (g.started_at, g.pid));
        list
    }

    pub async fn contains(&self, pid: u32) -> bool {
        self.games.read().await.contains_key(&pid)
    }

    /// Receiver for the number of running games
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }

    /// Poll the OS every `interval` and drop PIDs that are gone.
    pub fn spawn_monitor(&self, interval: Duration) -> JoinHandle<()> {
        let registry = self.clone();

        tokio::spawn(async move {
            let mut system = System::new();
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;

                let pids: Vec<u32> = registry.games.read().await.keys().copied().collect();
                if pids.is_empty() {
                    continue;
                }

                system.refresh_all();
                for pid in pids {
                    if !is_alive(&system, pid) {
                        log::info!("PID {} has exited", pid);
                        registry.remove(pid).await;
                    }
                }
            }
        })
    }
}

fn is_alive(system: &System, pid: u32) -> bool {
    match system.process(Pid::from_u32(pid)) {
        Some(process) => !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead),
        None => false,
    }
}

/// One-off liveness check
pub fn process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_all();
    is_alive(&system, pid)
}
