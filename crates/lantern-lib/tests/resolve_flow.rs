use lantern_lib::game::installer::types::{Arch, InstallLayout, OsType};
use lantern_lib::game::launcher::classpath::build_classpath;
use lantern_lib::game::launcher::natives::extract_natives;
use lantern_lib::game::launcher::rules::RuleContext;
use lantern_lib::game::launcher::version_parser::{dedup_key, load_descriptor, resolve_version};
use lantern_lib::LauncherError;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn write_version(root: &Path, id: &str, json: serde_json::Value) {
    let dir = root.join("versions").join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(format!("{}.json", id)),
        serde_json::to_vec_pretty(&json).unwrap(),
    )
    .unwrap();
}

fn vanilla_json() -> serde_json::Value {
    serde_json::json!({
        "id": "1.20.4",
        "type": "release",
        "mainClass": "net.minecraft.client.main.Main",
        "assetIndex": {"id": "12", "sha1": "a", "size": 1, "totalSize": 1, "url": "https://example.invalid/12.json"},
        "assets": "12",
        "javaVersion": {"component": "java-runtime-gamma", "majorVersion": 17},
        "arguments": {
            "game": ["--username", "${auth_player_name}", "--version", "${version_name}"],
            "jvm": ["-Djava.library.path=${natives_directory}", "-cp", "${classpath}"]
        },
        "libraries": [
            {"name": "org.ow2.asm:asm:9.3", "downloads": {"artifact": {
                "path": "org/ow2/asm/asm/9.3/asm-9.3.jar", "url": "https://example.invalid/asm-9.3.jar"}}},
            {"name": "org.lwjgl:lwjgl:3.3.3", "downloads": {"artifact": {
                "path": "org/lwjgl/lwjgl/3.3.3/lwjgl-3.3.3.jar", "url": "https://example.invalid/lwjgl.jar"}}},
            {"name": "org.lwjgl:lwjgl:3.3.3:natives-linux", "rules": [{"action": "allow", "os": {"name": "linux"}}],
             "downloads": {"artifact": {
                "path": "org/lwjgl/lwjgl/3.3.3/lwjgl-3.3.3-natives-linux.jar", "url": "https://example.invalid/lwjgl-natives.jar"}}}
        ]
    })
}

fn fabric_json() -> serde_json::Value {
    serde_json::json!({
        "id": "fabric-loader-0.15.0-1.20.4",
        "inheritsFrom": "1.20.4",
        "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
        "arguments": {"game": [], "jvm": ["-DFabricMcEmu= net.minecraft.client.main.Main "]},
        "libraries": [
            {"name": "org.ow2.asm:asm:9.6", "url": "https://maven.fabricmc.net/"},
            {"name": "net.fabricmc:fabric-loader:0.15.0", "url": "https://maven.fabricmc.net/"}
        ]
    })
}

#[tokio::test]
async fn resolving_a_standalone_version_returns_it_unchanged() {
    let temp = TempDir::new().unwrap();
    write_version(temp.path(), "1.20.4", vanilla_json());
    let layout = InstallLayout::new(temp.path());

    let raw = load_descriptor(&layout, "1.20.4").await.unwrap();
    let resolved = resolve_version(&layout, "1.20.4").await.unwrap();
    assert_eq!(resolved, raw);
}

#[tokio::test]
async fn fabric_merge_keeps_one_entry_per_artifact() {
    let temp = TempDir::new().unwrap();
    write_version(temp.path(), "1.20.4", vanilla_json());
    write_version(temp.path(), "fabric-loader-0.15.0-1.20.4", fabric_json());
    let layout = InstallLayout::new(temp.path());

    let merged = resolve_version(&layout, "fabric-loader-0.15.0-1.20.4")
        .await
        .unwrap();

    let mut keys = HashSet::new();
    for library in &merged.libraries {
        assert!(
            keys.insert(dedup_key(&library.name)),
            "duplicate library {}",
            library.name
        );
    }
    let names: Vec<&str> = merged.libraries.iter().map(|l| l.name.as_str()).collect();
    assert!(names.contains(&"net.fabricmc:fabric-loader:0.15.0"));
    assert!(names.contains(&"org.ow2.asm:asm:9.6"));
    assert!(!names.contains(&"org.ow2.asm:asm:9.3"));
    // classifier entries share the key of their main artifact
    assert!(names.contains(&"org.lwjgl:lwjgl:3.3.3"));
    assert!(!names.contains(&"org.lwjgl:lwjgl:3.3.3:natives-linux"));

    assert_eq!(
        merged.main_class.as_deref(),
        Some("net.fabricmc.loader.impl.launch.knot.KnotClient")
    );
    assert_eq!(merged.asset_index.as_ref().map(|a| a.id.as_str()), Some("12"));
    assert_eq!(merged.java_version.as_ref().map(|j| j.major_version), Some(17));
    assert!(merged.inherits_from.is_none());

    // merging is deterministic
    let again = resolve_version(&layout, "fabric-loader-0.15.0-1.20.4")
        .await
        .unwrap();
    assert_eq!(again, merged);
}

#[tokio::test]
async fn missing_parent_is_reported() {
    let temp = TempDir::new().unwrap();
    write_version(temp.path(), "fabric-loader-0.15.0-1.20.4", fabric_json());
    let layout = InstallLayout::new(temp.path());

    let err = resolve_version(&layout, "fabric-loader-0.15.0-1.20.4")
        .await
        .unwrap_err();
    match err.downcast_ref::<LauncherError>() {
        Some(LauncherError::MissingParentVersion { parent, .. }) => assert_eq!(parent, "1.20.4"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn layered_install_classpath_and_natives() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write_version(root, "1.20.4", vanilla_json());
    write_version(root, "fabric-loader-0.15.0-1.20.4", fabric_json());
    let layout = InstallLayout::new(root);
    let ctx = RuleContext::new(OsType::Linux, Arch::X64);

    // jars on disk
    let libraries = layout.libraries_dir();
    for relative in [
        "org/ow2/asm/asm/9.6/asm-9.6.jar",
        "org/lwjgl/lwjgl/3.3.3/lwjgl-3.3.3.jar",
        "net/fabricmc/fabric-loader/0.15.0/fabric-loader-0.15.0.jar",
    ] {
        let path = libraries.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"jar").unwrap();
    }
    let natives_jar = libraries.join("org/lwjgl/lwjgl/3.3.3/lwjgl-3.3.3-natives-linux.jar");
    {
        let file = std::fs::File::create(&natives_jar).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("linux/x64/org/lwjgl/liblwjgl.so", options).unwrap();
        zip.write_all(b"native").unwrap();
        zip.start_file("META-INF/MANIFEST.MF", options).unwrap();
        zip.write_all(b"Manifest-Version: 1.0").unwrap();
        zip.finish().unwrap();
    }
    let base_jar = layout.version_jar("1.20.4");
    std::fs::write(&base_jar, b"client").unwrap();

    let merged = resolve_version(&layout, "fabric-loader-0.15.0-1.20.4")
        .await
        .unwrap();
    let classpath = build_classpath(&layout, &merged, Some("1.20.4"), &ctx).unwrap();
    assert!(classpath.is_launch_ready());
    assert_eq!(classpath.entries.last(), Some(&base_jar));
    let asm: Vec<_> = classpath
        .entries
        .iter()
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with("asm-"))
                .unwrap_or(false)
        })
        .collect();
    assert_eq!(asm.len(), 1);

    let id = "fabric-loader-0.15.0-1.20.4";
    let first = extract_natives(&layout, &merged, id, &ctx).await.unwrap();
    assert!(!first.cache_hit);
    assert_eq!(first.extracted_archives, 1);
    assert!(layout.natives_dir(id).join("liblwjgl.so").is_file());
    assert!(!layout.natives_dir(id).join("MANIFEST.MF").exists());

    let second = extract_natives(&layout, &merged, id, &ctx).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.extracted_archives, 0);
}
