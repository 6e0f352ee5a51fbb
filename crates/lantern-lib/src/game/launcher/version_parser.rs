/// Version descriptor parsing and `inheritsFrom` resolution
use crate::error::LauncherError;
use crate::game::installer::types::InstallLayout;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A version descriptor as stored in `versions/<id>/<id>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    /// Version ID (e.g., "1.20.4" or "fabric-loader-0.15.0-1.20.4")
    pub id: String,

    /// Parent version to inherit from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,

    /// Modern (1.13+) argument lists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,

    /// Legacy single-string game arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,

    #[serde(default)]
    pub libraries: Vec<Library>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndexRef>,

    /// Assets id (legacy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersionRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<ClientDownloads>,

    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub version_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

/// Game and JVM arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<Argument>,

    #[serde(default)]
    pub jvm: Vec<Argument>,
}

/// Argument that can be plain or guarded by rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    Plain(String),
    Conditional {
        #[serde(default)]
        rules: Vec<Rule>,
        value: ArgumentValue,
    },
}

/// Argument value can be a single string or array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Single(String),
    Many(Vec<String>),
}

impl ArgumentValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            ArgumentValue::Single(s) => vec![s.as_str()],
            ArgumentValue::Many(v) => v.iter().map(|s| s.as_str()).collect(),
        }
    }
}

/// Rule for conditional arguments/libraries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<HashMap<String, bool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// Library entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    /// Maven coordinates
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,

    /// Maven repository base for loader libraries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,

    /// OS name -> classifier, e.g. `"windows": "natives-windows-${arch}"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natives: Option<HashMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRules>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<HashMap<String, Artifact>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub major_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<Artifact>,
}

impl VersionDescriptor {
    /// Asset index id, falling back to the legacy `assets` field.
    pub fn assets_index_name(&self) -> String {
        self.asset_index
            .as_ref()
            .map(|a| a.id.clone())
            .or_else(|| self.assets.clone())
            .unwrap_or_else(|| "legacy".to_string())
    }

    pub fn client_artifact(&self) -> Option<&Artifact> {
        self.downloads.as_ref().and_then(|d| d.client.as_ref())
    }
}

/// Parse a descriptor file
pub async fn parse_version_json(path: &std::path::Path) -> Result<VersionDescriptor> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read version descriptor at {:?}", path))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse version descriptor at {:?}", path))
}

/// Load `versions/<id>/<id>.json` without following `inheritsFrom`.
pub async fn load_descriptor(layout: &InstallLayout, id: &str) -> Result<VersionDescriptor> {
    let path = layout.version_json(id);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        anyhow::bail!("Version descriptor not found: {:?}", path);
    }
    parse_version_json(&path).await
}

/// Resolve a version into a single effective descriptor by walking its
/// `inheritsFrom` chain and merging each child over its parent.
pub async fn resolve_version(layout: &InstallLayout, id: &str) -> Result<VersionDescriptor> {
    let chain = load_chain(layout, id).await?;

    let mut iter = chain.into_iter().rev();
    let mut merged = iter
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty version chain for {}", id))?;
    for child in iter {
        merged = merge_descriptors(child, merged);
    }

    log::debug!(
        "Resolved {}: main class {:?}, {} libraries",
        id,
        merged.main_class,
        merged.libraries.len()
    );
    Ok(merged)
}

/// The root of the `inheritsFrom` chain, when `id` is layered on another version.
pub async fn base_version_id(layout: &InstallLayout, id: &str) -> Result<Option<String>> {
    let chain = load_chain(layout, id).await?;
    Ok(chain
        .last()
        .filter(|root| root.id != id && chain.len() > 1)
        .map(|root| root.id.clone()))
}

/// Descriptors from `id` up to its root, child first.
async fn load_chain(layout: &InstallLayout, id: &str) -> Result<Vec<VersionDescriptor>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = load_descriptor(layout, id).await?;
    seen.insert(id.to_string());

    while let Some(parent_id) = current.inherits_from.clone() {
        if !seen.insert(parent_id.clone()) {
            anyhow::bail!("Cyclic inheritsFrom chain at {}", parent_id);
        }
        if !tokio::fs::try_exists(layout.version_json(&parent_id))
            .await
            .unwrap_or(false)
        {
            return Err(LauncherError::MissingParentVersion {
                child: current.id.clone(),
                parent: parent_id,
            }
            .into());
        }
        let parent = load_descriptor(layout, &parent_id).await?;
        chain.push(current);
        current = parent;
    }
    chain.push(current);

    Ok(chain)
}

/// Merge a child descriptor over its parent.
///
/// Libraries: child entries first, then parent entries whose dedup key is not
/// already taken. A key repeated inside the child keeps its first position and
/// the later entry. Arguments: child tokens before parent tokens. Scalars: child
/// value if present, else parent. Re-merging the result with the same parent is a
/// no-op.
pub fn merge_descriptors(child: VersionDescriptor, parent: VersionDescriptor) -> VersionDescriptor {
    let mut libraries: Vec<Library> = Vec::with_capacity(child.libraries.len() + parent.libraries.len());
    let mut slots: HashMap<String, usize> = HashMap::new();

    for lib in child.libraries {
        let key = dedup_key(&lib.name);
        if let Some(&i) = slots.get(&key) {
            libraries[i] = lib;
            continue;
        }
        slots.insert(key, libraries.len());
        libraries.push(lib);
    }

    let mut added_from_parent = 0;
    for lib in parent.libraries {
        let key = dedup_key(&lib.name);
        if slots.contains_key(&key) {
            log::debug!("Parent library {} overridden by {}", lib.name, child.id);
            continue;
        }
        slots.insert(key, libraries.len());
        libraries.push(lib);
        added_from_parent += 1;
    }
    log::debug!(
        "Merged {} over {}: {} libraries ({} from parent)",
        child.id,
        parent.id,
        libraries.len(),
        added_from_parent
    );

    let arguments = match (child.arguments, parent.arguments) {
        (Some(c), Some(p)) => Some(Arguments {
            game: concat_args(c.game, &p.game),
            jvm: concat_args(c.jvm, &p.jvm),
        }),
        (c, p) => c.or(p),
    };

    VersionDescriptor {
        id: child.id,
        inherits_from: None,
        main_class: child.main_class.or(parent.main_class),
        arguments,
        minecraft_arguments: child.minecraft_arguments.or(parent.minecraft_arguments),
        libraries,
        asset_index: child.asset_index.or(parent.asset_index),
        assets: child.assets.or(parent.assets),
        java_version: child.java_version.or(parent.java_version),
        downloads: child.downloads.or(parent.downloads),
        version_type: child.version_type.or(parent.version_type),
        release_time: child.release_time.or(parent.release_time),
        time: child.time.or(parent.time),
    }
}

fn concat_args(mut child: Vec<Argument>, parent: &[Argument]) -> Vec<Argument> {
    if parent.is_empty() || child.ends_with(parent) {
        return child;
    }
    child.extend_from_slice(parent);
    child
}

/// Version-agnostic identity of a library: `group:artifact`. Classifier entries
/// share the key of their main artifact.
pub fn dedup_key(name: &str) -> String {
    let mut parts = name.split(':');
    match (parts.next(), parts.next()) {
        (Some(group), Some(artifact)) => format!("{}:{}", group, artifact),
        _ => name.to_string(),
    }
}

/// Ids under `versions/` that have a descriptor on disk, sorted.
pub async fn list_installed_versions(layout: &InstallLayout) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut entries = match tokio::fs::read_dir(layout.versions_dir()).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(e).context("Failed to read versions directory"),
    };

    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if tokio::fs::try_exists(layout.version_json(&name))
            .await
            .unwrap_or(false)
        {
            ids.push(name);
        }
    }

    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lib(name: &str) -> Library {
        Library {
            name: name.to_string(),
            downloads: None,
            url: None,
            rules: None,
            natives: None,
            extract: None,
        }
    }

    fn descriptor(id: &str, inherits: Option<&str>, libs: &[&str]) -> VersionDescriptor {
        VersionDescriptor {
            id: id.to_string(),
            inherits_from: inherits.map(str::to_string),
            main_class: None,
            arguments: None,
            minecraft_arguments: None,
            libraries: libs.iter().map(|n| lib(n)).collect(),
            asset_index: None,
            assets: None,
            java_version: None,
            downloads: None,
            version_type: None,
            release_time: None,
            time: None,
        }
    }

    #[test]
    fn parses_plain_and_conditional_arguments() {
        let json = r#"["--username", {"rules":[{"action":"allow","features":{"is_demo_user":true}}],"value":"--demo"},
            {"rules":[{"action":"allow","os":{"name":"osx"}}],"value":["-XstartOnFirstThread"]}]"#;
        let args: Vec<Argument> = serde_json::from_str(json).unwrap();
        assert_eq!(args[0], Argument::Plain("--username".to_string()));
        match &args[1] {
            Argument::Conditional { rules, value } => {
                assert_eq!(rules[0].action, RuleAction::Allow);
                assert_eq!(value.values(), vec!["--demo"]);
            }
            other => panic!("expected conditional, got {:?}", other),
        }
        assert!(matches!(&args[2], Argument::Conditional { value: ArgumentValue::Many(v), .. } if v.len() == 1));
    }

    #[test]
    fn dedup_key_is_group_and_artifact() {
        assert_eq!(dedup_key("org.ow2.asm:asm:9.6"), "org.ow2.asm:asm");
        assert_eq!(dedup_key("org.ow2.asm:asm:9.3"), "org.ow2.asm:asm");
        assert_eq!(dedup_key("org.lwjgl:lwjgl:3.3.3:natives-linux"), "org.lwjgl:lwjgl");
        assert_eq!(dedup_key("broken"), "broken");
    }

    #[test]
    fn child_override_drops_parent_classifier_siblings() {
        let child = descriptor("fabric", Some("1.20.4"), &["org.lwjgl:lwjgl:3.3.3"]);
        let parent = descriptor(
            "1.20.4",
            None,
            &[
                "org.lwjgl:lwjgl:3.3.2",
                "org.lwjgl:lwjgl:3.3.2:natives-linux",
                "com.mojang:brigadier:1.2.9",
            ],
        );

        let merged = merge_descriptors(child, parent);
        let names: Vec<&str> = merged.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["org.lwjgl:lwjgl:3.3.3", "com.mojang:brigadier:1.2.9"]);
    }

    #[test]
    fn duplicates_inside_one_descriptor_collapse() {
        let child = descriptor("child", Some("base"), &["a:b:1", "c:d:1", "a:b:2"]);
        let parent = descriptor("base", None, &["e:f:1", "e:f:1:natives-linux"]);

        let merged = merge_descriptors(child, parent);
        let names: Vec<&str> = merged.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a:b:2", "c:d:1", "e:f:1"]);
    }

    #[test]
    fn child_library_wins_on_shared_key() {
        let mut child = descriptor("fabric", Some("1.20.4"), &["org.ow2.asm:asm:9.6"]);
        child.main_class = Some("net.fabricmc.loader.impl.launch.knot.KnotClient".into());
        let mut parent = descriptor(
            "1.20.4",
            None,
            &["org.ow2.asm:asm:9.3", "com.mojang:brigadier:1.2.9"],
        );
        parent.main_class = Some("net.minecraft.client.main.Main".into());

        let merged = merge_descriptors(child, parent);
        let names: Vec<&str> = merged.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["org.ow2.asm:asm:9.6", "com.mojang:brigadier:1.2.9"]);
        assert_eq!(
            merged.main_class.as_deref(),
            Some("net.fabricmc.loader.impl.launch.knot.KnotClient")
        );
        assert!(merged.inherits_from.is_none());
        assert_eq!(merged.id, "fabric");
    }

    #[test]
    fn merge_is_idempotent() {
        let mut child = descriptor("child", Some("base"), &["a:b:2", "x:y:1"]);
        child.arguments = Some(Arguments {
            game: vec![],
            jvm: vec![Argument::Plain("-DFabricMcEmu= net.minecraft.client.main.Main ".into())],
        });
        let mut parent = descriptor("base", None, &["a:b:1", "c:d:1"]);
        parent.arguments = Some(Arguments {
            game: vec![Argument::Plain("--username".into()), Argument::Plain("${auth_player_name}".into())],
            jvm: vec![Argument::Plain("-cp".into()), Argument::Plain("${classpath}".into())],
        });
        parent.main_class = Some("Main".into());
        parent.assets = Some("12".into());

        let once = merge_descriptors(child, parent.clone());
        let twice = merge_descriptors(once.clone(), parent);
        assert_eq!(once, twice);

        let args = once.arguments.unwrap();
        assert_eq!(args.jvm.len(), 3);
        assert_eq!(
            args.jvm[0],
            Argument::Plain("-DFabricMcEmu= net.minecraft.client.main.Main ".into())
        );
        assert_eq!(args.game.len(), 2);
    }

    #[tokio::test]
    async fn missing_parent_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(tmp.path());
        let child = descriptor("fabric-loader-0.15.0-1.20.4", Some("1.20.4"), &[]);
        let path = layout.version_json(&child.id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_string(&child).unwrap()).unwrap();

        let err = resolve_version(&layout, &child.id).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LauncherError>(),
            Some(LauncherError::MissingParentVersion { parent, .. }) if parent == "1.20.4"
        ));
    }

    #[tokio::test]
    async fn cyclic_chain_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(tmp.path());
        for (id, parent) in [("a", "b"), ("b", "a")] {
            let d = descriptor(id, Some(parent), &[]);
            let path = layout.version_json(id);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, serde_json::to_string(&d).unwrap()).unwrap();
        }
        assert!(resolve_version(&layout, "a").await.is_err());
    }

    #[tokio::test]
    async fn lists_only_versions_with_descriptors() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(tmp.path());
        for id in ["1.20.4", "1.19.2"] {
            let path = layout.version_json(id);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, serde_json::to_string(&descriptor(id, None, &[])).unwrap())
                .unwrap();
        }
        std::fs::create_dir_all(layout.version_dir("half-installed")).unwrap();

        let ids = list_installed_versions(&layout).await.unwrap();
        assert_eq!(ids, vec!["1.19.2".to_string(), "1.20.4".to_string()]);
    }
}
