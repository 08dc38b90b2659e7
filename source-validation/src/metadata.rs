use crate::files::PathContent;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Marker substring identifying hardhat compiler build-info bundles.
pub const BUILD_INFO_MARKER: &str = "hh-sol-build-info-1";

lazy_static! {
    // A metadata manifest serialized as a JSON string inside another file:
    // a quoted object starting with {"compiler":{"version" and ending with
    // ,"version":1}, all quotes escaped.
    static ref NESTED_METADATA: Regex =
        Regex::new(r#""\{\\"compiler\\":\{\\"version\\".*?,\\"version\\":1\}""#)
            .expect("valid regex");
}

/// The Solidity compiler metadata manifest, v1 schema.
///
/// Only the fields the validation pipeline reads are modeled; the full
/// parsed document is retained in `raw` for downstream consumers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetadataManifest {
    pub language: String,
    pub compiler: Compiler,
    pub settings: ManifestSettings,
    pub output: ManifestOutput,
    pub sources: BTreeMap<String, SourceEntry>,

    #[serde(skip)]
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Compiler {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSettings {
    pub compilation_target: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManifestOutput {
    pub abi: Value,
    pub userdoc: Value,
    pub devdoc: Value,
}

/// One entry of the manifest `sources` map: either inline content, or a
/// digest plus resolution urls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SourceEntry {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub keccak256: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub license: Option<String>,
}

impl MetadataManifest {
    /// The single (file path, contract name) pair this manifest was compiled
    /// for. Multi-target manifests are rejected at recognition time, so the
    /// map holds exactly one entry.
    pub fn compilation_target(&self) -> Option<(&str, &str)> {
        self.settings
            .compilation_target
            .iter()
            .next()
            .map(|(path, name)| (path.as_str(), name.as_str()))
    }

    pub fn has_single_target(&self) -> bool {
        self.settings.compilation_target.len() == 1
    }
}

/// Decides whether `text` is a Solidity metadata manifest and extracts it.
///
/// Handles the three encodings found in the wild: a plain JSON object, a
/// doubly-encoded object (the manifest stored as a JSON string), and an
/// object embedded as an escaped string inside a larger file.
pub fn recognize(text: &str) -> Option<MetadataManifest> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Some(manifest) = manifest_from_value(&value) {
            return Some(manifest);
        }
        // The first parse may have produced a JSON string holding the
        // manifest; decode that string, not the raw bytes.
        if let Some(inner) = value.as_str() {
            if let Ok(inner_value) = serde_json::from_str::<Value>(inner) {
                if let Some(manifest) = manifest_from_value(&inner_value) {
                    return Some(manifest);
                }
            }
        }
    }

    let nested = NESTED_METADATA.find(text)?;
    let unescaped: String = serde_json::from_str(nested.as_str()).ok()?;
    let value: Value = serde_json::from_str(&unescaped).ok()?;
    manifest_from_value(&value)
}

fn manifest_from_value(value: &Value) -> Option<MetadataManifest> {
    if !looks_like_metadata(value) {
        return None;
    }
    let mut manifest: MetadataManifest = serde_json::from_value(value.clone()).ok()?;
    manifest.raw = value.clone();
    Some(manifest)
}

fn looks_like_metadata(value: &Value) -> bool {
    value.get("language").and_then(Value::as_str) == Some("Solidity")
        && value
            .get("version")
            .is_some_and(|version| !version.is_null())
        && non_empty(value.pointer("/settings/compilationTarget"))
        && non_empty(value.pointer("/output/abi"))
        && non_empty(value.pointer("/output/userdoc"))
        && non_empty(value.pointer("/output/devdoc"))
        && non_empty(value.get("sources"))
}

fn non_empty(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}

/// Sources and manifests harvested from a compiler build-info bundle.
#[derive(Debug, Default)]
pub struct BuildInfoHarvest {
    pub sources: Vec<PathContent>,
    pub manifests: Vec<MetadataManifest>,
}

/// Harvests a hardhat build-info bundle: every `input.sources[*].content`
/// becomes a candidate source, every `output.contracts[*][*].metadata`
/// string goes through recognition. Returns `None` when the marker is
/// absent, in which case the blob takes the general recognition route.
pub fn harvest_build_info(blob: &PathContent) -> Option<BuildInfoHarvest> {
    if !blob.content.contains(BUILD_INFO_MARKER) {
        return None;
    }
    let value: Value = serde_json::from_str(&blob.content).ok()?;

    let mut harvest = BuildInfoHarvest::default();

    if let Some(sources) = value.pointer("/input/sources").and_then(Value::as_object) {
        for (path, entry) in sources {
            if let Some(content) = entry.get("content").and_then(Value::as_str) {
                harvest.sources.push(PathContent::new(path, content));
            }
        }
    }

    if let Some(contracts) = value.pointer("/output/contracts").and_then(Value::as_object) {
        for contracts_in_file in contracts.values() {
            let Some(by_name) = contracts_in_file.as_object() else {
                continue;
            };
            for contract in by_name.values() {
                if let Some(raw_metadata) = contract.get("metadata").and_then(Value::as_str) {
                    if let Some(manifest) = recognize(raw_metadata) {
                        harvest.manifests.push(manifest);
                    }
                }
            }
        }
    }

    Some(harvest)
}
