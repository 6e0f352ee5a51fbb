/// Argument builder for Minecraft launcher
use crate::game::installer::config;
use crate::game::installer::types::InstallLayout;
use crate::game::launcher::rules::{evaluate_rules, RuleContext};
use crate::game::launcher::version_parser::{Argument, VersionDescriptor};
use dunce::canonicalize;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

/// Game flags for quick-play, which this launcher does not offer.
const QUICK_PLAY_FLAGS: &[&str] = &[
    "--quickPlayPath",
    "--quickPlaySingleplayer",
    "--quickPlayMultiplayer",
    "--quickPlayRealms",
];

const QUICK_PLAY_VARS: &[&str] = &[
    "quickPlayPath",
    "quickPlaySingleplayer",
    "quickPlayMultiplayer",
    "quickPlayRealms",
];

static PLACEHOLDER_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\$\{[^}]*\}").ok());

/// Heap budget in whole gigabytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    pub max_gb: u32,
}

impl MemoryBudget {
    pub fn new(max_gb: u32) -> Self {
        Self {
            max_gb: max_gb.max(1),
        }
    }

    pub fn min_gb(&self) -> u32 {
        (self.max_gb / 2).max(1)
    }

    pub fn max_heap(&self) -> String {
        format!("-Xmx{}G", self.max_gb)
    }

    pub fn min_heap(&self) -> String {
        format!("-Xms{}G", self.min_gb())
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Values substituted into `${...}` placeholders
#[derive(Debug, Clone)]
pub struct ArgumentContext {
    pub player_name: String,
    pub uuid: String,
    pub access_token: String,
    pub version_name: String,
    pub version_type: String,
    pub game_directory: String,
    pub assets_root: String,
    pub assets_index_name: String,
    pub natives_directory: String,
    pub library_directory: String,
    pub classpath: String,
    pub classpath_separator: String,
    pub launcher_name: String,
    pub launcher_version: String,
    pub clientid: String,
    pub auth_xuid: String,
    pub user_type: String,
    pub user_properties: String,
    pub resolution: Option<(u32, u32)>,
    /// Version is a loader build layered on a base game version
    pub layered: bool,
}

impl ArgumentContext {
    /// Offline context for `descriptor` rooted at `layout`.
    pub fn new(
        layout: &InstallLayout,
        descriptor: &VersionDescriptor,
        player_name: &str,
        classpath: String,
        natives_dir: &Path,
        rule_ctx: &RuleContext,
    ) -> Self {
        Self {
            player_name: player_name.to_string(),
            uuid: generate_offline_uuid(),
            access_token: "null".to_string(),
            version_name: descriptor.id.clone(),
            version_type: descriptor
                .version_type
                .clone()
                .unwrap_or_else(|| "release".to_string()),
            game_directory: display_path(layout.root()),
            assets_root: display_path(&layout.assets_dir()),
            assets_index_name: descriptor.assets_index_name(),
            natives_directory: display_path(natives_dir),
            library_directory: display_path(&layout.libraries_dir()),
            classpath,
            classpath_separator: rule_ctx.os.classpath_separator().to_string(),
            launcher_name: config::LAUNCHER_NAME.to_string(),
            launcher_version: config::LAUNCHER_VERSION.to_string(),
            clientid: "null".to_string(),
            auth_xuid: "null".to_string(),
            user_type: "legacy".to_string(),
            user_properties: "{}".to_string(),
            resolution: None,
            layered: false,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some((width, height));
        self
    }

    pub fn layered(mut self, layered: bool) -> Self {
        self.layered = layered;
        self
    }

    /// Placeholder map. Quick-play variables map to empty strings so their
    /// tokens are dropped.
    pub fn variables(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        let mut put = |k: &str, v: &str| {
            vars.insert(k.to_string(), v.to_string());
        };

        put("auth_player_name", &self.player_name);
        put("player_name", &self.player_name);
        put("auth_uuid", &self.uuid);
        put("uuid", &self.uuid);
        put("auth_access_token", &self.access_token);
        put("accessToken", &self.access_token);
        put("auth_session", &self.access_token);
        put("user_type", &self.user_type);
        put("user_properties", &self.user_properties);
        put("clientid", &self.clientid);
        put("auth_xuid", &self.auth_xuid);

        put("version_name", &self.version_name);
        put("version_type", &self.version_type);
        put("game_directory", &self.game_directory);
        put("assets_root", &self.assets_root);
        put("game_assets", &self.assets_root);
        put("assets_index_name", &self.assets_index_name);

        put("natives_directory", &self.natives_directory);
        put("library_directory", &self.library_directory);
        put("classpath", &self.classpath);
        put("classpath_separator", &self.classpath_separator);
        put("launcher_name", &self.launcher_name);
        put("launcher_version", &self.launcher_version);

        if let Some((w, h)) = self.resolution {
            put("resolution_width", &w.to_string());
            put("resolution_height", &h.to_string());
        }
        for qp in QUICK_PLAY_VARS {
            put(qp, "");
        }

        vars
    }
}

fn display_path(path: &Path) -> String {
    // Prefer canonicalized paths, falling back to the path as given
    canonicalize(path)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned())
}

/// Random offline player UUID
pub fn generate_offline_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Replace `${key}` tokens found in `vars`; unknown tokens are left in place.
pub fn substitute(template: &str, vars: &HashMap<String, String>) -> String {
    let Some(re) = PLACEHOLDER_RE.as_ref() else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &regex::Captures| {
        let token = &caps[0];
        let key = &token[2..token.len() - 1];
        vars.get(key).cloned().unwrap_or_else(|| token.to_string())
    })
    .into_owned()
}

/// Placeholders still present in a rendered argument list.
pub fn unresolved_tokens(args: &[String]) -> Vec<String> {
    let Some(re) = PLACEHOLDER_RE.as_ref() else {
        return Vec::new();
    };
    args.iter()
        .flat_map(|a| re.find_iter(a).map(|m| m.as_str().to_string()))
        .collect()
}

/// True when `text` references a placeholder that is missing or empty.
fn contains_empty_placeholder(text: &str, vars: &HashMap<String, String>) -> bool {
    let Some(re) = PLACEHOLDER_RE.as_ref() else {
        return false;
    };
    re.find_iter(text).any(|m| {
        let token = m.as_str();
        let key = &token[2..token.len() - 1];
        vars.get(key).map(|v| v.trim().is_empty()).unwrap_or(true)
    })
}

/// Render one template token; `None` means drop it.
fn render(template: &str, vars: &HashMap<String, String>) -> Option<String> {
    if contains_empty_placeholder(template, vars) {
        return None;
    }
    let rendered = substitute(template, vars);
    if rendered.trim().is_empty() || QUICK_PLAY_FLAGS.contains(&rendered.as_str()) {
        return None;
    }
    Some(rendered)
}

/// Expand a descriptor argument list against rules and variables.
fn expand(args: &[Argument], vars: &HashMap<String, String>, rule_ctx: &RuleContext) -> Vec<String> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Argument::Plain(s) => out.extend(render(s, vars)),
            Argument::Conditional { rules, value } => {
                if !evaluate_rules(rules, rule_ctx) {
                    continue;
                }
                // A group with any unusable part is dropped whole so no flag is orphaned
                let parts: Option<Vec<String>> =
                    value.values().into_iter().map(|v| render(v, vars)).collect();
                out.extend(parts.unwrap_or_default());
            }
        }
    }
    out
}

/// Build JVM arguments for launching the game
pub fn build_jvm_arguments(
    descriptor: &VersionDescriptor,
    ctx: &ArgumentContext,
    memory: MemoryBudget,
    rule_ctx: &RuleContext,
) -> Vec<String> {
    let vars = ctx.variables();
    let natives = &ctx.natives_directory;

    let mut args = vec![memory.max_heap(), memory.min_heap()];

    args.push(format!("-Djava.library.path={}", natives));
    if ctx.layered {
        args.push(format!("-Dorg.lwjgl.librarypath={}", natives));
        args.push(format!("-Djna.tmpdir={}", natives));
        args.push(format!("-Dorg.lwjgl.system.SharedLibraryExtractPath={}", natives));
        args.push(format!("-Dio.netty.native.workdir={}", natives));
    }

    args.push("-Dlog4j2.formatMsgNoLookups=true".to_string());

    if rule_ctx.os.is_windows() {
        args.push(
            "-XX:HeapDumpPath=MojangTricksIntelDriversForPerformance_javaw.exe_minecraft.exe.heapdump"
                .to_string(),
        );
    }

    let descriptor_args: Vec<String> = descriptor
        .arguments
        .as_ref()
        .map(|a| expand(&a.jvm, &vars, rule_ctx))
        .unwrap_or_default()
        .into_iter()
        // already set above
        .filter(|a| !a.contains("java.library.path"))
        .collect();

    if ctx.layered && !descriptor_args.iter().any(|a| a.starts_with("-DFabricMcEmu=")) {
        args.push("-DFabricMcEmu= net.minecraft.client.main.Main ".to_string());
    }

    args.extend(descriptor_args);

    if !args.iter().any(|a| a.starts_with("-Dminecraft.launcher.brand=")) {
        args.push(format!("-Dminecraft.launcher.brand={}", ctx.launcher_name));
    }
    if !args.iter().any(|a| a.starts_with("-Dminecraft.launcher.version=")) {
        args.push(format!("-Dminecraft.launcher.version={}", ctx.launcher_version));
    }

    if !args.iter().any(|a| a == "-cp" || a == "-classpath") {
        args.push("-cp".to_string());
        args.push(ctx.classpath.clone());
    }

    args
}

/// Build game arguments for launching the game
pub fn build_game_arguments(
    descriptor: &VersionDescriptor,
    ctx: &ArgumentContext,
    rule_ctx: &RuleContext,
) -> Vec<String> {
    let vars = ctx.variables();

    let modern = descriptor
        .arguments
        .as_ref()
        .map(|a| expand(&a.game, &vars, rule_ctx))
        .unwrap_or_default();
    if !modern.is_empty() {
        return modern;
    }

    // Legacy format (pre-1.13)
    descriptor
        .minecraft_arguments
        .as_deref()
        .map(|legacy| {
            legacy
                .split_whitespace()
                .filter_map(|t| render(t, &vars))
                .collect()
        })
        .unwrap_or_default()
}
