/// Native library extraction for Minecraft launcher
use crate::game::installer::config::NATIVES_FINGERPRINT_FILE;
use crate::game::installer::core::downloader::sha1_bytes;
use crate::game::installer::types::{Arch, InstallLayout};
use crate::game::launcher::rules::{applies, RuleContext};
use crate::game::launcher::version_parser::{load_descriptor, Library, VersionDescriptor};
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

const NATIVE_EXTENSIONS: &[&str] = &["dll", "so", "dylib", "jnilib"];

#[derive(Debug, Clone, PartialEq)]
pub struct NativesOutcome {
    pub dir: PathBuf,
    /// Archives opened on this call; zero on a cache hit.
    pub extracted_archives: usize,
    pub cache_hit: bool,
}

/// One platform archive found on disk
#[derive(Debug, Clone)]
struct NativeArchive {
    library: String,
    path: PathBuf,
    exclude: Vec<String>,
}

/// Extract platform natives for `version_id` into `versions/<id>/natives`.
///
/// Skipped when the stored fingerprint matches and at least one native binary is
/// already present.
pub async fn extract_natives(
    layout: &InstallLayout,
    descriptor: &VersionDescriptor,
    version_id: &str,
    ctx: &RuleContext,
) -> Result<NativesOutcome> {
    let natives_dir = layout.natives_dir(version_id);

    let mut libraries: Vec<Library> = descriptor.libraries.clone();
    if let Some(parent) = &descriptor.inherits_from {
        match load_descriptor(layout, parent).await {
            Ok(parent) => libraries.extend(parent.libraries),
            Err(e) => log::warn!("Could not read parent {} for natives: {}", parent, e),
        }
    }

    let archives = find_native_archives(&layout.libraries_dir(), &libraries, ctx);
    let fingerprint = fingerprint(archives.iter().map(|a| a.library.as_str()));
    let cache_file = natives_dir.join(NATIVES_FINGERPRINT_FILE);

    if let Ok(cached) = tokio::fs::read_to_string(&cache_file).await {
        if cached.trim() == fingerprint && has_native_binaries(&natives_dir) {
            log::info!("Natives cache valid for {}", version_id);
            return Ok(NativesOutcome {
                dir: natives_dir,
                extracted_archives: 0,
                cache_hit: true,
            });
        }
    }

    if tokio::fs::try_exists(&natives_dir).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_dir_all(&natives_dir).await {
            // a running game may hold the old binaries open
            log::warn!("Failed to clear natives dir {:?}: {}", natives_dir, e);
        }
    }
    tokio::fs::create_dir_all(&natives_dir).await?;

    let output_dir = natives_dir.clone();
    let extracted_archives = tokio::task::spawn_blocking(move || {
        let mut extracted = 0;
        for archive in &archives {
            match extract_archive(&archive.path, &output_dir, &archive.exclude) {
                Ok(files) => {
                    log::debug!("Extracted {} files from {:?}", files, archive.path);
                    extracted += 1;
                }
                Err(e) => log::error!("Failed to extract natives from {:?}: {:#}", archive.path, e),
            }
        }
        extracted
    })
    .await
    .context("Natives extraction task panicked")?;

    if extracted_archives == 0 {
        log::warn!("No native archives found for {}", version_id);
    } else {
        log::info!(
            "Extracted natives for {} from {} archives",
            version_id,
            extracted_archives
        );
    }

    tokio::fs::write(&cache_file, &fingerprint)
        .await
        .with_context(|| format!("Failed to write {:?}", cache_file))?;

    Ok(NativesOutcome {
        dir: natives_dir,
        extracted_archives,
        cache_hit: false,
    })
}

/// Hex SHA-1 of the sorted, de-duplicated library names joined by `|`.
pub fn fingerprint<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let sorted: BTreeSet<&str> = names.into_iter().collect();
    sha1_bytes(sorted.into_iter().collect::<Vec<_>>().join("|").as_bytes())
}

/// `libraries/<group path>/<artifact>/<version>` for a coordinate.
fn library_dir(libraries_dir: &Path, name: &str) -> Option<PathBuf> {
    let mut parts = name.split(':');
    let group = parts.next()?;
    let artifact = parts.next()?;
    let version = parts.next()?.split('@').next()?;
    let mut dir = libraries_dir.to_path_buf();
    for segment in group.split('.') {
        dir.push(segment);
    }
    Some(dir.join(artifact).join(version))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Default,
    X86,
    Arm64,
    Arm32,
}

fn variant_of(file_name: &str) -> Variant {
    let lower = file_name.to_lowercase();
    if lower.contains("arm64") || lower.contains("aarch64") {
        Variant::Arm64
    } else if lower.contains("arm32") {
        Variant::Arm32
    } else if lower.ends_with("-x86.jar") {
        Variant::X86
    } else {
        Variant::Default
    }
}

fn wanted_variant(arch: Arch) -> Variant {
    match arch {
        Arch::X64 => Variant::Default,
        Arch::X86 => Variant::X86,
        Arch::Arm64 => Variant::Arm64,
        Arch::Arm32 => Variant::Arm32,
    }
}

fn find_native_archives(
    libraries_dir: &Path,
    libraries: &[Library],
    ctx: &RuleContext,
) -> Vec<NativeArchive> {
    let patterns: Vec<String> = ctx
        .os
        .native_tags()
        .iter()
        .map(|t| format!("natives-{}", t))
        .collect();
    let wanted = wanted_variant(ctx.arch);

    let mut seen_dirs = HashSet::new();
    let mut archives = Vec::new();

    for library in libraries {
        if !applies(library.rules.as_ref(), ctx) {
            continue;
        }
        let Some(dir) = library_dir(libraries_dir, &library.name) else {
            continue;
        };
        if !seen_dirs.insert(dir.clone()) {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };

        let candidates: Vec<(PathBuf, Variant)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let matches = name.ends_with(".jar") && patterns.iter().any(|p| name.contains(p));
                matches.then(|| (e.path(), variant_of(&name)))
            })
            .collect();

        // Prefer the archive built for this architecture, else the plain one.
        let pick = if candidates.iter().any(|(_, v)| *v == wanted) {
            wanted
        } else {
            Variant::Default
        };

        let mut picked: Vec<PathBuf> = candidates
            .into_iter()
            .filter(|(_, v)| *v == pick)
            .map(|(p, _)| p)
            .collect();
        picked.sort();

        for path in picked {
            log::debug!("Found native archive for {}: {:?}", library.name, path);
            archives.push(NativeArchive {
                library: library.name.clone(),
                path,
                exclude: library
                    .extract
                    .as_ref()
                    .map(|e| e.exclude.clone())
                    .unwrap_or_default(),
            });
        }
    }

    archives
}

fn is_native_entry(entry_name: &str) -> bool {
    if entry_name.starts_with("META-INF/") || entry_name.ends_with(".class") {
        return false;
    }
    let ext = Path::new(entry_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext {
        Some(ext) if NATIVE_EXTENSIONS.contains(&ext.as_str()) => true,
        _ => entry_name.contains("native"),
    }
}

/// Check if a file should be excluded
fn should_exclude(file_path: &str, exclusions: &[String]) -> bool {
    exclusions.iter().any(|e| file_path.starts_with(e.as_str()))
}

/// Extract native payloads from one archive, flattened into `output_dir`.
fn extract_archive(jar_path: &Path, output_dir: &Path, exclusions: &[String]) -> Result<usize> {
    let file = std::fs::File::open(jar_path)
        .with_context(|| format!("Failed to open JAR: {:?}", jar_path))?;
    let mut archive =
        zip::ZipArchive::new(file).with_context(|| format!("Failed to read JAR: {:?}", jar_path))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if should_exclude(&name, exclusions) || !is_native_entry(&name) {
            continue;
        }
        let Some(file_name) = Path::new(&name).file_name() else {
            continue;
        };

        let output_path = output_dir.join(file_name);
        let mut output_file = std::fs::File::create(&output_path)?;
        std::io::copy(&mut entry, &mut output_file)?;
        written += 1;
    }

    Ok(written)
}

fn has_native_binaries(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.filter_map(|e| e.ok()).any(|e| {
        e.path()
            .extension()
            .and_then(|x| x.to_str())
            .map(|x| NATIVE_EXTENSIONS.contains(&x.to_lowercase().as_str()))
            .unwrap_or(false)
    })
}
