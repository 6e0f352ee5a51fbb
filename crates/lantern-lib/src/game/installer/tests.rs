use super::core::downloader::sha1_bytes;
use super::core::traits::{InstallContext, LoaderInstaller};
use super::modloaders::fabric::FabricInstaller;
use super::types::{Arch, InstallLayout, LoaderKind, OsType, ProgressSender};
use super::vanilla::VanillaInstaller;
use super::*;
use crate::game::launcher::rules::RuleContext;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(server: &MockServer, root: &std::path::Path) -> InstallContext {
    let engine = DownloadEngine::new(4).with_retry_delay(Duration::from_millis(1));
    InstallContext::new(engine, InstallLayout::new(root))
        .with_endpoints(Endpoints::with_base(&server.uri()))
        .with_rules(RuleContext::new(OsType::Linux, Arch::X64))
}

// ---------------------------------------------------------------------
// Installed version ids
// ---------------------------------------------------------------------
#[test]
fn test_installed_version_id() {
    assert_eq!(
        installed_version_id(LoaderKind::Fabric, Some("0.15.0"), "1.20.4"),
        "fabric-loader-0.15.0-1.20.4"
    );
    assert_eq!(installed_version_id(LoaderKind::Vanilla, None, "1.20.4"), "1.20.4");
    assert_eq!(installed_version_id(LoaderKind::Fabric, None, "1.20.4"), "1.20.4");
    assert_eq!(
        FabricInstaller::new("1.20.4", "0.15.0").id(),
        installed_version_id(LoaderKind::Fabric, Some("0.15.0"), "1.20.4")
    );
}

#[test]
fn test_request_builders() {
    let req = InstallRequest::fabric("1.20.4", None).without_java();
    assert_eq!(req.loader, LoaderKind::Fabric);
    assert!(!req.install_java);
    assert_eq!(req.endpoints, Endpoints::default());
}

// ---------------------------------------------------------------------
// Vanilla
// ---------------------------------------------------------------------
#[tokio::test]
async fn test_vanilla_prefers_local_descriptor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let ctx = context(&server, temp.path());
    let json_path = ctx.layout.version_json("1.20.4");
    std::fs::create_dir_all(json_path.parent().unwrap()).unwrap();
    std::fs::write(&json_path, r#"{"id":"1.20.4","mainClass":"net.minecraft.client.main.Main"}"#)
        .unwrap();

    let descriptor = VanillaInstaller::new("1.20.4").resolve(&ctx).await.unwrap();
    assert_eq!(descriptor.id, "1.20.4");
}

#[tokio::test]
async fn test_vanilla_unknown_version() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mc/game/version_manifest_v2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "latest": {"release": "1.20.4", "snapshot": "1.20.4"},
            "versions": []
        })))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let ctx = context(&server, temp.path());
    let err = VanillaInstaller::new("1.99").resolve(&ctx).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LauncherError>(),
        Some(LauncherError::VersionNotFound { .. })
    ));
}

#[tokio::test]
async fn test_vanilla_downloads_client_libraries_and_assets() {
    let server = MockServer::start().await;
    let client_jar = b"client-bytes".to_vec();
    let lib_jar = b"lib-bytes".to_vec();
    let asset = b"sound".to_vec();
    let asset_hash = sha1_bytes(&asset);
    let index = serde_json::json!({"objects": {"minecraft/sounds/a.ogg": {"hash": asset_hash, "size": asset.len()}}});
    let index_bytes = serde_json::to_vec(&index).unwrap();

    Mock::given(method("GET"))
        .and(path("/client.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(client_jar.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/libs/org/lwjgl/lwjgl/3.3.3/lwjgl-3.3.3.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(lib_jar.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/12.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(index_bytes.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/resources/{}/{}", &asset_hash[..2], asset_hash)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(asset.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let ctx = context(&server, temp.path());
    let descriptor: crate::game::launcher::version_parser::VersionDescriptor =
        serde_json::from_value(serde_json::json!({
            "id": "1.20.4",
            "downloads": {"client": {"url": format!("{}/client.jar", server.uri()), "sha1": sha1_bytes(&client_jar), "size": client_jar.len()}},
            "assetIndex": {"id": "12", "url": format!("{}/indexes/12.json", server.uri()), "sha1": sha1_bytes(&index_bytes), "size": index_bytes.len(), "totalSize": asset.len()},
            "libraries": [
                {"name": "org.lwjgl:lwjgl:3.3.3", "downloads": {"artifact": {
                    "path": "org/lwjgl/lwjgl/3.3.3/lwjgl-3.3.3.jar",
                    "url": format!("{}/libs/org/lwjgl/lwjgl/3.3.3/lwjgl-3.3.3.jar", server.uri()),
                    "sha1": sha1_bytes(&lib_jar),
                    "size": lib_jar.len()
                }}},
                {"name": "ca.weblite:java-objc-bridge:1.1", "rules": [{"action": "allow", "os": {"name": "osx"}}],
                 "downloads": {"artifact": {"path": "ca/weblite/java-objc-bridge/1.1/java-objc-bridge-1.1.jar", "url": "http://unused/objc.jar"}}}
            ]
        }))
        .unwrap();

    let report = VanillaInstaller::new("1.20.4")
        .download_libraries(&ctx, &descriptor, &ProgressSender::silent())
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.total, 4);
    assert!(ctx.layout.version_jar("1.20.4").is_file());
    assert!(ctx.layout.asset_object(&asset_hash).is_file());
    assert!(!ctx
        .layout
        .libraries_dir()
        .join("ca/weblite/java-objc-bridge/1.1/java-objc-bridge-1.1.jar")
        .exists());
}

// ---------------------------------------------------------------------
// Fabric
// ---------------------------------------------------------------------
#[tokio::test]
async fn test_fabric_unknown_loader() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fabric/v2/versions/loader/1.20.4/9.9.9/profile/json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let ctx = context(&server, temp.path());
    let err = FabricInstaller::new("1.20.4", "9.9.9")
        .resolve(&ctx)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LauncherError>(),
        Some(LauncherError::LoaderNotFound { .. })
    ));
}

#[tokio::test]
async fn test_fabric_profile_written_with_parent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fabric/v2/versions/loader/1.20.4/0.15.0/profile/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "fabric-loader-0.15.0-1.20.4",
            "inheritsFrom": "1.20.4",
            "type": "release",
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
            "arguments": {"game": [], "jvm": ["-DFabricMcEmu= net.minecraft.client.main.Main "]},
            "libraries": [
                {"name": "net.fabricmc:fabric-loader:0.15.0", "url": format!("{}/maven/", server.uri())}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/maven/net/fabricmc/fabric-loader/0.15.0/fabric-loader-0.15.0.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"loader".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let ctx = context(&server, temp.path());
    let fabric = FabricInstaller::new("1.20.4", "0.15.0");

    let descriptor = fabric.resolve(&ctx).await.unwrap();
    assert_eq!(descriptor.inherits_from.as_deref(), Some("1.20.4"));
    assert!(ctx.layout.version_json(&fabric.id()).is_file());

    // second resolve is served from disk
    let again = fabric.resolve(&ctx).await.unwrap();
    assert_eq!(again, descriptor);

    let report = fabric
        .download_libraries(&ctx, &descriptor, &ProgressSender::silent())
        .await
        .unwrap();
    assert!(report.is_success());
    assert!(ctx
        .layout
        .libraries_dir()
        .join("net/fabricmc/fabric-loader/0.15.0/fabric-loader-0.15.0.jar")
        .is_file());
}
