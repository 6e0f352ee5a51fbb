/// Classpath construction for Minecraft launcher
use crate::error::LauncherError;
use crate::game::installer::config;
use crate::game::installer::core::downloader::DownloadTask;
use crate::game::installer::types::InstallLayout;
use crate::game::launcher::rules::{applies, RuleContext};
use crate::game::launcher::version_parser::{Artifact, Library, VersionDescriptor};
use anyhow::Result;
use std::collections::HashSet;
use std::path::PathBuf;

/// Why a classpath entry is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingKind {
    /// Declared artifact (or the version's own jar)
    Primary,
    /// Platform classifier jar
    Native,
    /// Path derived from Maven coordinates only
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissingLibrary {
    pub name: String,
    pub path: PathBuf,
    pub kind: MissingKind,
}

/// Result of building a classpath
#[derive(Debug, Clone)]
pub struct ClasspathBuild {
    pub entries: Vec<PathBuf>,
    pub classpath: String,
    pub missing: Vec<MissingLibrary>,
}

impl ClasspathBuild {
    /// A non-empty missing list means the install is not ready to launch.
    pub fn is_launch_ready(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Convert Maven coordinates to file path
/// Format: group:artifact:version[:classifier][@extension]
/// Example: "com.google.guava:guava:21.0" -> "com/google/guava/guava/21.0/guava-21.0.jar"
pub fn maven_to_path(coords: &str) -> Result<String> {
    let parts: Vec<&str> = coords.split(':').collect();

    if parts.len() < 3 || parts.iter().take(3).any(|p| p.is_empty()) {
        return Err(LauncherError::InvalidCoordinate {
            coords: coords.to_string(),
        }
        .into());
    }

    let group = parts[0].replace('.', "/");
    let artifact = parts[1];
    let mut version = parts[2];
    let mut classifier = None;
    let mut extension = "jar";

    if parts.len() == 3 {
        // group:artifact:version@extension
        if let Some((v, ext)) = version.split_once('@') {
            version = v;
            extension = ext;
        }
    } else {
        // group:artifact:version:classifier[@extension]
        if let Some((clf, ext)) = parts[3].split_once('@') {
            classifier = Some(clf);
            extension = ext;
        } else {
            classifier = Some(parts[3]);
        }
    }

    let filename = if let Some(clf) = classifier {
        format!("{}-{}-{}.{}", artifact, version, clf, extension)
    } else {
        format!("{}-{}.{}", artifact, version, extension)
    };

    Ok(format!("{}/{}/{}/{}", group, artifact, version, filename))
}

/// Relative path of a library's main artifact under `libraries/`.
pub fn library_path(library: &Library) -> Result<String> {
    if let Some(path) = declared_artifact(library).and_then(|a| a.path.clone()) {
        return Ok(path);
    }
    maven_to_path(&library.name)
}

fn declared_artifact(library: &Library) -> Option<&Artifact> {
    library.downloads.as_ref().and_then(|d| d.artifact.as_ref())
}

/// Classifier for this platform from a legacy `natives` map, with `${arch}` filled in.
pub fn native_classifier(library: &Library, ctx: &RuleContext) -> Option<String> {
    library
        .natives
        .as_ref()?
        .get(ctx.os.as_str())
        .map(|c| c.replace("${arch}", ctx.arch.bits()))
}

/// Relative path and declared artifact of the platform native jar, if the
/// library has one.
pub fn native_artifact(library: &Library, ctx: &RuleContext) -> Option<(String, Option<Artifact>)> {
    let classifier = native_classifier(library, ctx)?;
    let declared = library
        .downloads
        .as_ref()
        .and_then(|d| d.classifiers.as_ref())
        .and_then(|c| c.get(&classifier))
        .cloned();

    let path = match declared.as_ref().and_then(|a| a.path.clone()) {
        Some(p) => p,
        None => maven_to_path(&format!("{}:{}", library.name, classifier)).ok()?,
    };
    Some((path, declared))
}

/// Build the ordered classpath for a resolved descriptor.
///
/// `base_version` is the root of the `inheritsFrom` chain for layered installs;
/// its jar is required.
pub fn build_classpath(
    layout: &InstallLayout,
    descriptor: &VersionDescriptor,
    base_version: Option<&str>,
    ctx: &RuleContext,
) -> Result<ClasspathBuild> {
    let libraries_dir = layout.libraries_dir();
    let mut entries = Vec::new();
    let mut seen = HashSet::new();
    let mut missing = Vec::new();

    let mut push = |path: PathBuf, entries: &mut Vec<PathBuf>| {
        if seen.insert(path.clone()) {
            entries.push(path);
        }
    };

    for library in &descriptor.libraries {
        if !applies(library.rules.as_ref(), ctx) {
            continue;
        }

        if declared_artifact(library).is_some() {
            let path = libraries_dir.join(library_path(library)?);
            if path.exists() {
                push(path, &mut entries);
            } else {
                missing.push(MissingLibrary {
                    name: library.name.clone(),
                    path,
                    kind: MissingKind::Primary,
                });
            }
        } else if library.downloads.is_none() {
            // Maven-style entry (loader libraries)
            let path = libraries_dir.join(maven_to_path(&library.name)?);
            if path.exists() {
                push(path, &mut entries);
            } else {
                missing.push(MissingLibrary {
                    name: library.name.clone(),
                    path,
                    kind: MissingKind::Fallback,
                });
            }
        }

        if let Some((relative, _)) = native_artifact(library, ctx) {
            let path = libraries_dir.join(relative);
            if path.exists() {
                push(path, &mut entries);
            } else {
                missing.push(MissingLibrary {
                    name: format!("{}:natives", library.name),
                    path,
                    kind: MissingKind::Native,
                });
            }
        }
    }

    let own_jar = layout.version_jar(&descriptor.id);
    match base_version {
        Some(base) if base != descriptor.id => {
            // Loader ids usually ship no jar of their own
            if own_jar.exists() {
                push(own_jar, &mut entries);
            }
            let base_jar = layout.version_jar(base);
            if !base_jar.exists() {
                log::error!("Base game jar not found: {:?}", base_jar);
                return Err(LauncherError::MissingBaseJar {
                    version: base.to_string(),
                    path: base_jar,
                }
                .into());
            }
            push(base_jar, &mut entries);
        }
        _ => {
            if own_jar.exists() {
                push(own_jar, &mut entries);
            } else {
                missing.push(MissingLibrary {
                    name: descriptor.id.clone(),
                    path: own_jar,
                    kind: MissingKind::Primary,
                });
            }
        }
    }

    if !missing.is_empty() {
        let natives = missing.iter().filter(|m| m.kind == MissingKind::Native).count();
        log::warn!(
            "{} classpath entries missing for {} ({} native)",
            missing.len(),
            descriptor.id,
            natives
        );
        for m in missing.iter().take(5) {
            log::warn!("  - {} ({:?})", m.name, m.kind);
        }
    }

    let classpath = entries
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(ctx.os.classpath_separator());

    log::debug!("Classpath for {}: {} entries", descriptor.id, entries.len());
    Ok(ClasspathBuild {
        entries,
        classpath,
        missing,
    })
}

/// Download tasks for every library artifact and native jar that applies here.
pub fn library_tasks(
    layout: &InstallLayout,
    descriptor: &VersionDescriptor,
    ctx: &RuleContext,
) -> Result<Vec<DownloadTask>> {
    let libraries_dir = layout.libraries_dir();
    let mut tasks = Vec::new();

    for library in &descriptor.libraries {
        if !applies(library.rules.as_ref(), ctx) {
            continue;
        }

        match declared_artifact(library) {
            Some(artifact) => {
                if let Some(url) = artifact.url.as_deref().filter(|u| !u.is_empty()) {
                    tasks.push(
                        DownloadTask::new(url, libraries_dir.join(library_path(library)?))
                            .with_sha1(artifact.sha1.clone())
                            .with_size(artifact.size)
                            .with_name(&library.name),
                    );
                }
            }
            None if library.downloads.is_none() => {
                let relative = maven_to_path(&library.name)?;
                let base = library
                    .url
                    .as_deref()
                    .unwrap_or(config::MOJANG_LIBRARIES_URL);
                tasks.push(
                    DownloadTask::new(maven_url(base, &relative), libraries_dir.join(&relative))
                        .with_name(&library.name),
                );
            }
            None => {}
        }

        if let Some((relative, declared)) = native_artifact(library, ctx) {
            let url = declared
                .as_ref()
                .and_then(|a| a.url.clone())
                .unwrap_or_else(|| maven_url(config::MOJANG_LIBRARIES_URL, &relative));
            tasks.push(
                DownloadTask::new(url, libraries_dir.join(&relative))
                    .with_sha1(declared.as_ref().and_then(|a| a.sha1.clone()))
                    .with_size(declared.as_ref().and_then(|a| a.size))
                    .with_name(format!("{} (natives)", library.name)),
            );
        }
    }

    Ok(tasks)
}

fn maven_url(base: &str, relative: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), relative)
}
