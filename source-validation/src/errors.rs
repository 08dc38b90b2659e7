use thiserror::Error;

/// Failures of a whole validation call. Per-source problems are not errors:
/// they become the `missing`/`invalid` partitions of the checked contract.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("metadata.json missing")]
    NoManifestsFound,
    #[error("no usable metadata manifests, rejected: {}", .0.join(", "))]
    MalformedManifests(Vec<String>),
    #[error("failed to read archive {path}: {error}")]
    ArchiveUnreadable { path: String, error: String },
}
