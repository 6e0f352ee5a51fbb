/// Process management and game launch orchestration
use crate::error::LauncherError;
use crate::game::installer::config::{LAUNCHER_ERROR_LOG, STDERR_TAIL_LINES};
use crate::game::installer::core::jre_manager::{required_java_for, JavaManager};
use crate::game::launcher::{
    arguments::{build_game_arguments, build_jvm_arguments, unresolved_tokens, ArgumentContext},
    classpath::{build_classpath, MissingLibrary},
    natives::extract_natives,
    registry::{process_alive, ProcessRegistry},
    rules::RuleContext,
    types::{LaunchEvent, LaunchHandle, LaunchSpec},
    version_parser::{base_version_id, resolve_version},
};
use crate::utils::process::LanternCommandExt;
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

const GAME_LOG_TARGET: &str = "lantern::game";

/// Everything needed to start the game, before spawning
#[derive(Debug, Clone)]
pub struct PreparedLaunch {
    pub java: PathBuf,
    /// JVM arguments, main class, then game arguments
    pub args: Vec<String>,
    pub main_class: String,
    /// Classpath entries that were not on disk
    pub missing: Vec<MissingLibrary>,
}

impl PreparedLaunch {
    /// Human-readable command line for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.java.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|a| quote_arg(&a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Resolve, extract natives, build the classpath, locate Java and render arguments.
pub async fn prepare_launch(spec: &LaunchSpec, rule_ctx: &RuleContext) -> Result<PreparedLaunch> {
    let layout = &spec.layout;

    // 1. Resolve version chain
    let descriptor = resolve_version(layout, &spec.version_id)
        .await
        .with_context(|| format!("Failed to resolve version {}", spec.version_id))?;
    let base = base_version_id(layout, &spec.version_id).await?;
    let main_class = descriptor
        .main_class
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Version {} declares no main class", spec.version_id))?;

    // 2. Natives
    let natives = extract_natives(layout, &descriptor, &spec.version_id, rule_ctx).await?;

    // 3. Classpath
    let classpath = build_classpath(layout, &descriptor, base.as_deref(), rule_ctx)?;
    if !classpath.is_launch_ready() {
        log::warn!(
            "Launching {} with {} missing classpath entries; the game may fail to start",
            spec.version_id,
            classpath.missing.len()
        );
    }

    // 4. Java
    let java = match &spec.java_path {
        Some(path) => path.clone(),
        None => {
            let game_version = base.as_deref().unwrap_or(&spec.version_id);
            let major = required_java_for(&descriptor, game_version);
            JavaManager::new(layout.clone()).executable_path(major)
        }
    };
    if !tokio::fs::try_exists(&java).await.unwrap_or(false) {
        return Err(LauncherError::RuntimeNotFound { path: java }.into());
    }

    // 5. Arguments
    let mut ctx = ArgumentContext::new(
        layout,
        &descriptor,
        &spec.player_name,
        classpath.classpath.clone(),
        &natives.dir,
        rule_ctx,
    )
    .layered(base.is_some());
    if let Some((w, h)) = spec.resolution {
        ctx = ctx.with_resolution(w, h);
    }

    let mut args = build_jvm_arguments(&descriptor, &ctx, spec.memory, rule_ctx);
    args.extend(spec.extra_jvm_args.iter().cloned());
    args.push(main_class.clone());
    args.extend(build_game_arguments(&descriptor, &ctx, rule_ctx));
    args.extend(spec.extra_game_args.iter().cloned());

    let leftover = unresolved_tokens(&args);
    if !leftover.is_empty() {
        log::warn!("Unresolved argument tokens: {:?}", leftover);
    }

    Ok(PreparedLaunch {
        java,
        args,
        main_class,
        missing: classpath.missing,
    })
}

/// Launch the game.
///
/// Returns once the process has a PID; the exit is reported on `LaunchHandle::events`.
pub async fn launch_game(spec: LaunchSpec) -> Result<LaunchHandle> {
    log::info!("Launching {}", spec.version_id);
    let rule_ctx = RuleContext::current();
    let prepared = prepare_launch(&spec, &rule_ctx).await?;

    let root = spec.layout.root().to_path_buf();
    tokio::fs::create_dir_all(&root).await?;

    log::info!("Exec command: {}", prepared.command_line());
    log::debug!("Working directory: {:?}", root);

    let mut command = tokio::process::Command::new(&prepared.java);
    command
        .args(&prepared.args)
        .current_dir(&root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .detach();

    let mut child = command.spawn().map_err(|source| LauncherError::Spawn {
        executable: prepared.java.clone(),
        source,
    })?;
    let pid = child
        .id()
        .ok_or_else(|| anyhow::anyhow!("Failed to get process ID"))?;
    log::info!("Game process started with PID: {}", pid);

    if let Some(registry) = &spec.registry {
        registry.add(pid, &spec.version_id).await;
    }

    let (tx, events) = mpsc::channel(4);
    let _ = tx.send(LaunchEvent::Started { pid }).await;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, log::Level::Debug));
    }
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(forward_lines(stderr, log::Level::Warn)));

    let log_path = spec.layout.logs_dir().join(LAUNCHER_ERROR_LOG);
    let registry = spec.registry.clone();
    let version_id = spec.version_id.clone();

    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => {
                if status.success() {
                    log::info!("{} (PID {}) exited successfully", version_id, pid);
                } else {
                    log::error!("{} (PID {}) exited with error: {}", version_id, pid, status);
                }
                status.code()
            }
            Err(e) => {
                log::error!("Failed to wait for {} (PID {}): {}", version_id, pid, e);
                None
            }
        };

        let stderr_lines = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => VecDeque::new(),
        };
        if code != Some(0) {
            if let Err(e) = write_error_log(&log_path, &version_id, code, &stderr_lines).await {
                log::warn!("Failed to write {:?}: {:#}", log_path, e);
            }
        }

        if let Some(registry) = registry {
            registry.remove(pid).await;
        }
        let _ = tx.send(LaunchEvent::Exited { code }).await;
    });

    Ok(LaunchHandle {
        pid,
        version_id: spec.version_id,
        events,
    })
}

/// Forward each line to the log. Warn-level streams also keep their last
/// `STDERR_TAIL_LINES` lines.
async fn forward_lines<R>(stream: R, level: log::Level) -> VecDeque<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    let mut tail = VecDeque::new();
    while let Ok(Some(line)) = lines.next_line().await {
        log::log!(target: GAME_LOG_TARGET, level, "{}", line);
        if level == log::Level::Warn {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
    tail
}

async fn write_error_log(
    path: &Path,
    version_id: &str,
    code: Option<i32>,
    stderr: &VecDeque<String>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
    let mut contents = format!(
        "[{}] {} exited with code {}\n",
        chrono::Utc::now().to_rfc3339(),
        version_id,
        code
    );
    for line in stderr {
        contents.push_str(line);
        contents.push('\n');
    }
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write {:?}", path))
}

/// Stop a running game and drop it from `registry`.
///
/// Unix gets SIGTERM and, after 5 seconds, SIGKILL. Windows uses `taskkill /T /F`.
pub async fn kill_process(registry: &ProcessRegistry, pid: u32) -> Result<()> {
    log::info!("Killing PID {}", pid);

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let target = Pid::from_raw(pid as i32);
        kill(target, Signal::SIGTERM).context("Failed to send SIGTERM")?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while process_alive(pid) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        if process_alive(pid) {
            log::warn!("PID {} ignored SIGTERM, sending SIGKILL", pid);
            kill(target, Signal::SIGKILL).context("Failed to send SIGKILL")?;
        }
    }

    #[cfg(windows)]
    {
        let output = tokio::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .suppress_console()
            .output()
            .await
            .context("Failed to execute taskkill")?;

        if !output.status.success() && process_alive(pid) {
            anyhow::bail!(
                "Failed to kill process: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
    }

    registry.remove(pid).await;
    Ok(())
}

/// Quote an argument for a copy-pasteable command line.
pub fn quote_arg(s: &str) -> String {
    if s.is_empty() {
        return "\"\"".to_string();
    }
    if s.chars().any(|c| c.is_whitespace() || c == '"') {
        let esc = s.replace('\\', "\\\\").replace('"', "\\\"");
        return format!("\"{}\"", esc);
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::installer::types::{Arch, InstallLayout, OsType};
    use tempfile::TempDir;

    fn write_version(layout: &InstallLayout, id: &str, json: serde_json::Value) {
        let path = layout.version_json(id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec(&json).unwrap()).unwrap();
    }

    fn install_vanilla(layout: &InstallLayout) {
        write_version(
            layout,
            "1.20.4",
            serde_json::json!({
                "id": "1.20.4",
                "type": "release",
                "mainClass": "net.minecraft.client.main.Main",
                "assetIndex": {"id": "12", "sha1": "x", "size": 1, "totalSize": 1, "url": "http://x"},
                "arguments": {
                    "game": [
                        "--username", "${auth_player_name}",
                        "--version", "${version_name}",
                        "--gameDir", "${game_directory}",
                        "--assetsDir", "${assets_root}",
                        "--assetIndex", "${assets_index_name}",
                        "--uuid", "${auth_uuid}",
                        "--accessToken", "${auth_access_token}",
                        {"rules": [{"action": "allow", "features": {"is_quick_play_singleplayer": true}}],
                         "value": ["--quickPlaySingleplayer", "${quickPlaySingleplayer}"]}
                    ],
                    "jvm": ["-Djava.library.path=${natives_directory}", "-cp", "${classpath}"]
                }
            }),
        );
        std::fs::write(layout.version_jar("1.20.4"), b"jar").unwrap();
    }

    fn fake_java(dir: &Path) -> PathBuf {
        let java = dir.join("java");
        std::fs::write(&java, b"").unwrap();
        java
    }

    #[test]
    fn quote_arg_quotes_paths_with_spaces() {
        let p = r"C:\Program Files\Some Libs";
        let out = quote_arg(p);
        assert!(out.starts_with('"') && out.ends_with('"'));
        assert!(out.contains("Program Files"));

        assert_eq!(quote_arg("no_spaces_here"), "no_spaces_here");
        assert_eq!(quote_arg(""), "\"\"");
    }

    #[tokio::test]
    async fn prepared_arguments_have_no_placeholders() {
        let temp = TempDir::new().unwrap();
        let layout = InstallLayout::new(temp.path().join("game"));
        install_vanilla(&layout);
        let java = fake_java(temp.path());

        for os in [OsType::Windows, OsType::Linux] {
            let spec = LaunchSpec::new(layout.clone(), "1.20.4", "Steve").with_java(&java);
            let ctx = RuleContext::new(os, Arch::X64);
            let prepared = prepare_launch(&spec, &ctx).await.unwrap();

            assert!(unresolved_tokens(&prepared.args).is_empty());
            assert!(!prepared.args.iter().any(|a| a.contains("quickPlay")));
            assert!(prepared.missing.is_empty());

            let cp_index = prepared.args.iter().position(|a| a == "-cp").unwrap();
            let main_index = prepared
                .args
                .iter()
                .position(|a| a == "net.minecraft.client.main.Main")
                .unwrap();
            assert!(cp_index < main_index);
            assert!(prepared.args[main_index + 1..].contains(&"Steve".to_string()));
            assert_eq!(prepared.args[0], "-Xmx4G");
            assert_eq!(prepared.args[1], "-Xms2G");
        }
    }

    #[tokio::test]
    async fn missing_runtime_is_reported() {
        let temp = TempDir::new().unwrap();
        let layout = InstallLayout::new(temp.path());
        install_vanilla(&layout);

        let spec = LaunchSpec::new(layout.clone(), "1.20.4", "Steve");
        let err = prepare_launch(&spec, &RuleContext::current())
            .await
            .unwrap_err();
        match err.downcast_ref::<LauncherError>() {
            Some(LauncherError::RuntimeNotFound { path }) => {
                assert!(path.starts_with(layout.java_dir().join("java-17")));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_parent_is_reported_before_spawn() {
        let temp = TempDir::new().unwrap();
        let layout = InstallLayout::new(temp.path());
        write_version(
            &layout,
            "fabric-loader-0.15.0-1.20.4",
            serde_json::json!({"id": "fabric-loader-0.15.0-1.20.4", "inheritsFrom": "1.20.4"}),
        );
        let java = fake_java(temp.path());

        let spec = LaunchSpec::new(layout, "fabric-loader-0.15.0-1.20.4", "Steve").with_java(java);
        let err = launch_game(spec).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LauncherError>(),
            Some(LauncherError::MissingParentVersion { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launch_reports_exit_and_persists_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let _ = env_logger::builder().is_test(true).try_init();
        let temp = TempDir::new().unwrap();
        let layout = InstallLayout::new(temp.path().join("game"));
        install_vanilla(&layout);

        let java = temp.path().join("java.sh");
        std::fs::write(&java, "#!/bin/sh\necho \"Could not reserve heap\" >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();

        let registry = ProcessRegistry::new();
        let spec = LaunchSpec::new(layout.clone(), "1.20.4", "Steve")
            .with_java(&java)
            .with_registry(registry.clone());

        let mut handle = launch_game(spec).await.unwrap();
        assert_eq!(
            handle.events.recv().await,
            Some(LaunchEvent::Started { pid: handle.pid })
        );

        let exited = tokio::time::timeout(Duration::from_secs(10), handle.events.recv())
            .await
            .unwrap();
        assert_eq!(exited, Some(LaunchEvent::Exited { code: Some(3) }));
        assert!(!registry.contains(handle.pid).await);

        let log = std::fs::read_to_string(layout.logs_dir().join(LAUNCHER_ERROR_LOG)).unwrap();
        assert!(log.contains("exited with code 3"));
        assert!(log.contains("Could not reserve heap"));
    }

    #[tokio::test]
    async fn stderr_keeps_only_the_tail() {
        let output: String = (0..STDERR_TAIL_LINES + 100)
            .map(|i| format!("line {}\n", i))
            .collect();

        let tail = forward_lines(output.as_bytes(), log::Level::Warn).await;
        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        assert_eq!(tail.front().map(String::as_str), Some("line 100"));
        let last = format!("line {}", STDERR_TAIL_LINES + 99);
        assert_eq!(tail.back(), Some(&last));

        let stdout = forward_lines(output.as_bytes(), log::Level::Debug).await;
        assert!(stdout.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_process_terminates_and_unregisters() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let registry = ProcessRegistry::new();
        registry.add(pid, "1.20.4").await;

        let reaper = tokio::spawn(async move { child.wait().await });
        kill_process(&registry, pid).await.unwrap();

        let status = reaper.await.unwrap().unwrap();
        assert!(!status.success());
        assert!(!registry.contains(pid).await);
    }
}
