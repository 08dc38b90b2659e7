mod archive;
mod contract;
mod errors;
mod files;
mod hash;
mod metadata;
mod validator;

pub use archive::{expand_archives, is_archive};
pub use contract::{CheckedContract, InvalidSource, MissingSource};
pub use errors::ValidationError;
pub use files::{PathBlob, PathContent};
pub use hash::{digest_hex, keccak256, variations};
pub use metadata::{
    harvest_build_info, recognize, BuildInfoHarvest, Compiler, ManifestOutput, ManifestSettings,
    MetadataManifest, SourceEntry, BUILD_INFO_MARKER,
};
pub use validator::{check_files, check_paths, use_all_sources};
