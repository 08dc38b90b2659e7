use pretty_assertions::assert_eq;
use serde_json::json;
use source_validation::{
    check_files, check_paths, digest_hex, keccak256, use_all_sources, PathBlob, ValidationError,
};
use std::io::{Cursor, Write};
use zip::{write::FileOptions, ZipWriter};

const STORE_SOL: &str = "pragma solidity ^0.8.0;\n\ncontract Store {\n    uint256 value;\n}\n";
const OWNER_SOL: &str = "pragma solidity ^0.8.0;\n\ncontract Owned {\n    address owner;\n}\n";

/// Manifest over the given sources; `content: true` inlines the source,
/// otherwise only the digest and urls are declared.
fn manifest(sources: &[(&str, &str, bool)]) -> String {
    let mut source_map = serde_json::Map::new();
    for (path, content, inline) in sources {
        let digest = digest_hex(&keccak256(content));
        let entry = if *inline {
            json!({"content": content, "keccak256": digest})
        } else {
            json!({"keccak256": digest, "urls": [format!("dweb:/ipfs/Qm{path}")]})
        };
        source_map.insert(path.to_string(), entry);
    }
    let (target_path, _, _) = sources[0];
    json!({
        "compiler": {"version": "0.8.19+commit.7dd6d404"},
        "language": "Solidity",
        "output": {
            "abi": [{"inputs": [], "name": "get", "outputs": [], "type": "function"}],
            "userdoc": {"methods": {}},
            "devdoc": {"methods": {}}
        },
        "settings": {"compilationTarget": {target_path: "Store"}},
        "sources": source_map,
        "version": 1
    })
    .to_string()
}

#[test]
fn happy_inline_manifest() {
    let blobs = vec![PathBlob::new(
        "metadata.json",
        manifest(&[("contracts/Store.sol", STORE_SOL, true)]),
    )];

    let contracts = check_files(blobs, None).unwrap();
    assert_eq!(contracts.len(), 1);

    let contract = &contracts[0];
    assert!(contract.is_valid());
    assert_eq!(contract.name, "Store");
    assert_eq!(contract.found.len(), 1);
    assert_eq!(contract.found["contracts/Store.sol"], STORE_SOL);
    assert!(contract.missing.is_empty() && contract.invalid.is_empty());
}

#[test]
fn inline_digest_mismatch_is_invalid() {
    let mut text = manifest(&[("contracts/Store.sol", STORE_SOL, true)]);
    // flip one nibble of the declared digest
    let digest = digest_hex(&keccak256(STORE_SOL));
    let last = digest.chars().last().unwrap();
    let flipped = if last == '0' { '1' } else { '0' };
    let mut altered = digest.clone();
    altered.replace_range(digest.len() - 1.., &flipped.to_string());
    text = text.replace(&digest, &altered);

    let contracts = check_files(vec![PathBlob::new("metadata.json", text)], None).unwrap();
    let contract = &contracts[0];

    assert!(!contract.is_valid());
    assert_eq!(contract.invalid.len(), 1);
    let invalid = &contract.invalid["contracts/Store.sol"];
    assert_eq!(invalid.expected_hash, altered);
    assert_eq!(invalid.calculated_hash, digest);
    assert_ne!(invalid.expected_hash, invalid.calculated_hash);
}

#[test]
fn source_found_through_line_ending_variation() {
    // manifest hashes the LF rendition, the provided file is CRLF
    let crlf = STORE_SOL.replace('\n', "\r\n");
    assert_ne!(crlf, STORE_SOL);

    let blobs = vec![
        PathBlob::new(
            "metadata.json",
            manifest(&[("contracts/Store.sol", STORE_SOL, false)]),
        ),
        PathBlob::new("Store.sol", crlf),
    ];

    let contracts = check_files(blobs, None).unwrap();
    let contract = &contracts[0];

    assert!(contract.is_valid());
    assert_eq!(contract.found["contracts/Store.sol"], STORE_SOL);
    assert_eq!(contract.source_paths["contracts/Store.sol"], "Store.sol");
}

#[test]
fn unmatched_source_is_missing_with_urls_echoed() {
    let blobs = vec![
        PathBlob::new(
            "metadata.json",
            manifest(&[
                ("contracts/Store.sol", STORE_SOL, false),
                ("contracts/Owned.sol", OWNER_SOL, false),
            ]),
        ),
        PathBlob::new("Store.sol", STORE_SOL),
    ];

    let contracts = check_files(blobs, None).unwrap();
    let contract = &contracts[0];

    assert!(!contract.is_valid());
    assert_eq!(contract.found.len(), 1);
    assert_eq!(contract.missing.len(), 1);

    let missing = &contract.missing["contracts/Owned.sol"];
    assert_eq!(missing.keccak256, digest_hex(&keccak256(OWNER_SOL)));
    assert_eq!(
        missing.urls,
        vec!["dweb:/ipfs/Qmcontracts/Owned.sol".to_string()]
    );
    // partitions stay disjoint and complete
    assert!(!contract.found.contains_key("contracts/Owned.sol"));
    assert_eq!(
        contract.found.len() + contract.missing.len() + contract.invalid.len(),
        contract.manifest.sources.len()
    );
}

#[test]
fn archive_expansion_matches_direct_supply() {
    let metadata = manifest(&[("contracts/Store.sol", STORE_SOL, false)]);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("metadata.json", FileOptions::default())
        .unwrap();
    writer.write_all(metadata.as_bytes()).unwrap();
    writer
        .start_file("sources/Store.sol", FileOptions::default())
        .unwrap();
    writer.write_all(STORE_SOL.as_bytes()).unwrap();
    let archive = writer.finish().unwrap().into_inner();

    let from_archive = check_files(vec![PathBlob::new("bundle.zip", archive)], None).unwrap();
    let direct = check_files(
        vec![
            PathBlob::new("metadata.json", metadata),
            PathBlob::new("sources/Store.sol", STORE_SOL),
        ],
        None,
    )
    .unwrap();

    assert_eq!(from_archive[0].found, direct[0].found);
    assert_eq!(from_archive[0].missing, direct[0].missing);
    assert!(from_archive[0].is_valid());
}

#[test]
fn build_info_bundle_is_harvested() {
    let metadata = manifest(&[("contracts/Store.sol", STORE_SOL, false)]);
    let bundle = json!({
        "_format": "hh-sol-build-info-1",
        "solcVersion": "0.8.19",
        "input": {
            "sources": {"contracts/Store.sol": {"content": STORE_SOL}}
        },
        "output": {
            "contracts": {"contracts/Store.sol": {"Store": {"metadata": metadata}}}
        }
    })
    .to_string();

    let contracts = check_files(vec![PathBlob::new("build-info.json", bundle)], None).unwrap();
    assert_eq!(contracts.len(), 1);
    assert!(contracts[0].is_valid());
    assert_eq!(contracts[0].found["contracts/Store.sol"], STORE_SOL);
}

#[test]
fn no_manifest_is_a_distinguished_error() {
    let result = check_files(vec![PathBlob::new("Store.sol", STORE_SOL)], None);
    assert_eq!(result.unwrap_err(), ValidationError::NoManifestsFound);
    assert_eq!(
        ValidationError::NoManifestsFound.to_string(),
        "metadata.json missing"
    );
}

#[test]
fn only_malformed_manifests_is_a_distinguished_error() {
    // two compilation targets
    let text = manifest(&[("contracts/Store.sol", STORE_SOL, true)]).replace(
        "\"compilationTarget\":{\"contracts/Store.sol\":\"Store\"}",
        "\"compilationTarget\":{\"contracts/Store.sol\":\"Store\",\"contracts/Owned.sol\":\"Owned\"}",
    );
    assert!(text.contains("Owned"));

    let result = check_files(vec![PathBlob::new("metadata.json", text)], None);
    assert_eq!(
        result.unwrap_err(),
        ValidationError::MalformedManifests(vec!["metadata.json".to_string()])
    );
}

#[test]
fn unused_files_are_reported_once() {
    let mut unused = Vec::new();
    let blobs = vec![
        PathBlob::new(
            "metadata.json",
            manifest(&[("contracts/Store.sol", STORE_SOL, false)]),
        ),
        PathBlob::new("Store.sol", STORE_SOL),
        PathBlob::new("README.txt", "not a source"),
        PathBlob::new("logo.bin", vec![0xff, 0xfe, 0x00]),
    ];

    let contracts = check_files(blobs, Some(&mut unused)).unwrap();
    assert!(contracts[0].is_valid());
    assert_eq!(unused, vec!["README.txt".to_string(), "logo.bin".to_string()]);
}

#[test]
fn use_all_sources_keeps_verified_content() {
    let blobs = vec![
        PathBlob::new(
            "metadata.json",
            manifest(&[("contracts/Store.sol", STORE_SOL, false)]),
        ),
        PathBlob::new("contracts/Store.sol", STORE_SOL.replace('\n', "\r\n")),
        PathBlob::new("extra/Helper.sol", "library Helper {}\n"),
    ];

    let contracts = check_files(blobs.clone(), None).unwrap();
    let enriched = use_all_sources(&contracts[0], blobs).unwrap();

    // the verified rendition wins over the CRLF file at the same path
    assert_eq!(enriched.found["contracts/Store.sol"], STORE_SOL);
    assert_eq!(enriched.found["extra/Helper.sol"], "library Helper {}\n");
    // superset law
    for (path, content) in &contracts[0].found {
        assert_eq!(&enriched.found[path], content);
    }
}

#[test]
fn check_paths_walks_directories_and_reports_unreadable() {
    let root = std::env::temp_dir().join(format!("source-validation-{}", std::process::id()));
    let nested = root.join("sources");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(
        root.join("metadata.json"),
        manifest(&[("contracts/Store.sol", STORE_SOL, false)]),
    )
    .unwrap();
    std::fs::write(nested.join("Store.sol"), STORE_SOL).unwrap();

    let ghost = root.join("does-not-exist.sol");
    let mut unreadable = Vec::new();
    let contracts = check_paths(&[root.clone(), ghost.clone()], Some(&mut unreadable)).unwrap();

    assert!(contracts[0].is_valid());
    assert_eq!(unreadable, vec![ghost.clone()]);

    // without a sink, nonexistent paths are silently dropped
    let contracts = check_paths(&[root.clone(), ghost], None).unwrap();
    assert!(contracts[0].is_valid());

    std::fs::remove_dir_all(root).unwrap();
}
