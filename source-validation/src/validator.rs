use crate::{
    archive::expand_archives,
    contract::{CheckedContract, InvalidSource, MissingSource},
    errors::ValidationError,
    files::{PathBlob, PathContent},
    hash::{digest_hex, keccak256, variations},
    metadata::{harvest_build_info, recognize, MetadataManifest, SourceEntry},
};
use blockscout_display_bytes::decode_hex;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

/// Resolves every path (files loaded, directories walked recursively) and
/// validates the resulting bag of blobs.
///
/// Paths that do not exist or cannot be read are pushed to `unreadable` when
/// a sink is given; without a sink they are silently dropped.
pub fn check_paths(
    paths: &[PathBuf],
    mut unreadable: Option<&mut Vec<PathBuf>>,
) -> Result<Vec<CheckedContract>, ValidationError> {
    let mut blobs = Vec::new();
    for path in paths {
        collect_path(path, &mut blobs, &mut unreadable);
    }
    check_files(blobs, None)
}

fn collect_path(
    path: &Path,
    blobs: &mut Vec<PathBlob>,
    unreadable: &mut Option<&mut Vec<PathBuf>>,
) {
    let report = |unreadable: &mut Option<&mut Vec<PathBuf>>, path: &Path| {
        if let Some(sink) = unreadable {
            sink.push(path.to_path_buf());
        }
    };

    if path.is_dir() {
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(_) => return report(unreadable, path),
        };
        for entry in entries.flatten() {
            collect_path(&entry.path(), blobs, unreadable);
        }
    } else {
        match fs::read(path) {
            Ok(content) => blobs.push(PathBlob::new(path.to_string_lossy(), content)),
            Err(_) => report(unreadable, path),
        }
    }
}

/// The core validation operation: discovers metadata manifests in the bag
/// and reconciles each against the remaining blobs by content hash.
///
/// When an `unused` sink is given, every candidate path no manifest consumed
/// is written into it, deduplicated.
pub fn check_files(
    blobs: Vec<PathBlob>,
    unused: Option<&mut Vec<String>>,
) -> Result<Vec<CheckedContract>, ValidationError> {
    let blobs = expand_archives(blobs)?;

    let mut candidates: Vec<PathContent> = Vec::new();
    let mut undecodable: Vec<String> = Vec::new();
    let mut manifests: Vec<MetadataManifest> = Vec::new();
    let mut malformed: Vec<String> = Vec::new();

    for blob in blobs {
        let text = match blob.into_text() {
            Ok(text) => text,
            Err(path) => {
                undecodable.push(path);
                continue;
            }
        };

        // Build-info bundles are harvested wholesale and skip general
        // recognition.
        if let Some(harvest) = harvest_build_info(&text) {
            candidates.extend(harvest.sources);
            for manifest in harvest.manifests {
                accept(manifest, &text.path, &mut manifests, &mut malformed);
            }
            continue;
        }

        match recognize(&text.content) {
            Some(manifest) => accept(manifest, &text.path, &mut manifests, &mut malformed),
            None => candidates.push(text),
        }
    }

    if manifests.is_empty() {
        return if malformed.is_empty() {
            Err(ValidationError::NoManifestsFound)
        } else {
            Err(ValidationError::MalformedManifests(malformed))
        };
    }
    if !malformed.is_empty() {
        tracing::warn!(paths = ?malformed, "discarded manifests without a single compilation target");
    }

    let index = build_hash_index(&candidates);

    let mut used_paths: HashSet<&str> = HashSet::new();
    let mut contracts = Vec::with_capacity(manifests.len());
    for manifest in manifests {
        contracts.push(reconcile(manifest, &index, &mut used_paths));
    }

    let faulty: Vec<String> = contracts
        .iter()
        .filter(|contract| !contract.is_valid())
        .map(CheckedContract::status_message)
        .collect();
    if !faulty.is_empty() {
        tracing::warn!(contracts = ?faulty, "source bundles could not be fully reconstructed");
    }

    if let Some(sink) = unused {
        let mut pushed: HashSet<String> = HashSet::new();
        for candidate in &candidates {
            if !used_paths.contains(candidate.path.as_str()) && pushed.insert(candidate.path.clone())
            {
                sink.push(candidate.path.clone());
            }
        }
        for path in undecodable {
            if pushed.insert(path.clone()) {
                sink.push(path);
            }
        }
    }

    Ok(contracts)
}

fn accept(
    manifest: MetadataManifest,
    path: &str,
    manifests: &mut Vec<MetadataManifest>,
    malformed: &mut Vec<String>,
) {
    if manifest.has_single_target() {
        manifests.push(manifest);
    } else {
        malformed.push(path.to_string());
    }
}

/// digest -> (provided path, content variant that produced the digest).
/// Later entries overwrite earlier ones; colliding variants are
/// semantically equivalent by construction.
fn build_hash_index(candidates: &[PathContent]) -> HashMap<[u8; 32], (&str, String)> {
    let mut index = HashMap::new();
    for candidate in candidates {
        for variation in variations(&candidate.content) {
            index.insert(keccak256(&variation), (candidate.path.as_str(), variation));
        }
    }
    index
}

fn reconcile<'a>(
    manifest: MetadataManifest,
    index: &HashMap<[u8; 32], (&'a str, String)>,
    used_paths: &mut HashSet<&'a str>,
) -> CheckedContract {
    let mut contract = CheckedContract::new(manifest);

    let sources = contract.manifest.sources.clone();
    for (logical_path, entry) in sources {
        reconcile_source(&mut contract, &logical_path, entry, index, used_paths);
    }
    contract
}

fn reconcile_source<'a>(
    contract: &mut CheckedContract,
    logical_path: &str,
    entry: SourceEntry,
    index: &HashMap<[u8; 32], (&'a str, String)>,
    used_paths: &mut HashSet<&'a str>,
) {
    let declared = entry.keccak256.clone().unwrap_or_default();

    if let Some(content) = entry.content {
        // Inline sources carry their own content; the declared digest still
        // has to agree with it.
        let calculated = digest_hex(&keccak256(&content));
        if entry.keccak256.is_none() || declared.eq_ignore_ascii_case(&calculated) {
            contract.found.insert(logical_path.to_string(), content);
        } else {
            contract.invalid.insert(
                logical_path.to_string(),
                InvalidSource {
                    expected_hash: declared,
                    calculated_hash: calculated,
                    message: format!("inline content of {logical_path} does not hash to its declared keccak256"),
                },
            );
        }
        return;
    }

    let missing = |contract: &mut CheckedContract| {
        contract.missing.insert(
            logical_path.to_string(),
            MissingSource {
                keccak256: declared.clone(),
                urls: entry.urls.clone(),
            },
        );
    };

    let Ok(digest) = decode_hex(declared.trim_start_matches("0x")) else {
        return missing(contract);
    };
    let Ok(digest) = <[u8; 32]>::try_from(digest.as_slice()) else {
        return missing(contract);
    };

    match index.get(&digest) {
        Some((provided_path, content)) => {
            contract
                .found
                .insert(logical_path.to_string(), content.clone());
            contract
                .source_paths
                .insert(logical_path.to_string(), provided_path.to_string());
            used_paths.insert(*provided_path);
        }
        None => missing(contract),
    }
}

/// Returns a copy of the contract whose source map is the union of every
/// supplied blob and the hash-verified sources; on path collision the
/// verified content wins.
pub fn use_all_sources(
    contract: &CheckedContract,
    blobs: Vec<PathBlob>,
) -> Result<CheckedContract, ValidationError> {
    let blobs = expand_archives(blobs)?;

    let mut sources: BTreeMap<String, String> = blobs
        .into_iter()
        .filter_map(|blob| blob.into_text().ok())
        .map(|text| (text.path, text.content))
        .collect();
    for (logical_path, content) in &contract.found {
        sources.insert(logical_path.clone(), content.clone());
    }

    let mut enriched = contract.clone();
    enriched.found = sources;
    Ok(enriched)
}
