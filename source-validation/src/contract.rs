use crate::metadata::MetadataManifest;
use std::collections::BTreeMap;

/// A manifest source no provided blob hashed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSource {
    pub keccak256: String,
    pub urls: Vec<String>,
}

/// A manifest source whose inline content disagrees with its declared digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSource {
    pub expected_hash: String,
    pub calculated_hash: String,
    pub message: String,
}

/// A metadata manifest reconciled against the provided sources: every
/// declared source sits in exactly one of `found`, `missing` or `invalid`.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedContract {
    pub manifest: MetadataManifest,
    /// Contract name, from the compilation target.
    pub name: String,
    /// Logical path of the compilation target.
    pub compiled_path: String,
    /// Logical path -> hash-verified content.
    pub found: BTreeMap<String, String>,
    pub missing: BTreeMap<String, MissingSource>,
    pub invalid: BTreeMap<String, InvalidSource>,
    /// Logical path -> path of the provided file that supplied the content.
    pub source_paths: BTreeMap<String, String>,
}

impl CheckedContract {
    pub fn new(manifest: MetadataManifest) -> Self {
        let (compiled_path, name) = manifest
            .compilation_target()
            .map(|(path, name)| (path.to_string(), name.to_string()))
            .unwrap_or_default();
        Self {
            manifest,
            name,
            compiled_path,
            found: BTreeMap::new(),
            missing: BTreeMap::new(),
            invalid: BTreeMap::new(),
            source_paths: BTreeMap::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    /// One-line diagnostic used when aggregating contracts that failed
    /// reconciliation.
    pub fn status_message(&self) -> String {
        let mut message = format!(
            "{}: {} found, {} missing, {} invalid",
            self.name,
            self.found.len(),
            self.missing.len(),
            self.invalid.len()
        );
        if !self.missing.is_empty() {
            let paths: Vec<&str> = self.missing.keys().map(String::as_str).collect();
            message.push_str(&format!("; missing: [{}]", paths.join(", ")));
        }
        if !self.invalid.is_empty() {
            let details: Vec<String> = self
                .invalid
                .iter()
                .map(|(path, invalid)| format!("{path} ({})", invalid.message))
                .collect();
            message.push_str(&format!("; invalid: [{}]", details.join(", ")));
        }
        message
    }
}
