// crates/witness-cli/src/commands/tests.rs
// ============================================================================
// Module: Command Helper Tests
// Description: Flag parsing, subject digests, signer and client setup.
// Purpose: Pin the shared helpers used by run, sign, and verify.
// Dependencies: witness-cli, rcgen, tempfile
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use rcgen::KeyPair;
use tokio_util::sync::CancellationToken;
use witness_core::HashFunction;

use super::DEFAULT_ARCHIVISTA_SERVER;
use super::archive_client;
use super::build_signer;
use super::build_timestampers;
use super::parse_hashes;
use super::parse_mapping;
use super::verify::collect_subjects;
use super::verify::parse_subject_digest;
use crate::cli::SignerArgs;
use crate::config::SignerSection;

#[test]
fn mappings_split_on_the_first_equals() {
    assert_eq!(
        parse_mapping("subject", "image=repo/app:1=2").unwrap(),
        ("image".to_string(), "repo/app:1=2".to_string())
    );
    for bad in ["novalue", "=value", "key=", ""] {
        let err = parse_mapping("subject", bad).unwrap_err().to_string();
        assert!(err.contains("--subject"), "{err}");
    }
}

#[test]
fn hash_names_are_validated() {
    let hashes = parse_hashes(&["sha256".to_string(), "SHA1".to_string()]).unwrap();
    assert_eq!(hashes, vec![HashFunction::Sha256, HashFunction::Sha1]);
    let err = parse_hashes(&["md5".to_string()]).unwrap_err().to_string();
    assert!(err.contains("md5"), "{err}");
}

#[test]
fn subject_digests_default_to_sha256() {
    let bare = parse_subject_digest("ABCDEF01").unwrap();
    assert_eq!(bare.get(HashFunction::Sha256), Some("abcdef01"));
    let named = parse_subject_digest("sha512:00ff").unwrap();
    assert_eq!(named.get(HashFunction::Sha512), Some("00ff"));
    assert!(named.get(HashFunction::Sha256).is_none());

    for bad in ["", "sha256:", "sha256:xyz", "md5:00"] {
        assert!(parse_subject_digest(bad).is_err(), "{bad}");
    }
}

#[test]
fn artifact_subjects_are_hashed_and_named() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.bin");
    std::fs::write(&path, b"hello").unwrap();
    let subjects = collect_subjects(std::slice::from_ref(&path), &["00ff".to_string()]).unwrap();
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0].name.as_deref(), Some(path.display().to_string().as_str()));
    assert_eq!(
        subjects[0].digest.get(HashFunction::Sha256),
        Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
    );
    assert!(subjects[1].name.is_none());

    let missing = collect_subjects(&[dir.path().join("missing")], &[]).err().unwrap();
    assert!(missing.to_string().contains("missing"));
}

#[test]
fn signer_flags_override_config() {
    let dir = tempfile::tempdir().unwrap();
    let flag_key = dir.path().join("flag.pem");
    std::fs::write(&flag_key, KeyPair::generate().unwrap().serialize_pem()).unwrap();
    let config = SignerSection {
        signer_file_key_path: Some(dir.path().join("missing.pem")),
        ..SignerSection::default()
    };

    let flags = SignerArgs {
        key_path: Some(flag_key),
        ..SignerArgs::default()
    };
    let signer = build_signer(&flags, &config).unwrap();
    assert_eq!(signer.key_id().unwrap().len(), 64);

    let err = build_signer(&SignerArgs::default(), &config).err().unwrap().to_string();
    assert!(err.contains("Failed to load the signer"), "{err}");
}

#[test]
fn signer_requires_a_key() {
    let err = build_signer(&SignerArgs::default(), &SignerSection::default()).err().unwrap();
    assert!(err.to_string().contains("--signer-file-key-path"));
}

#[test]
fn timestamp_servers_must_be_http() {
    let cancel = CancellationToken::new();
    let timestampers =
        build_timestampers(&["https://tsa.example.test".to_string()], &cancel).unwrap();
    assert_eq!(timestampers.len(), 1);
    let err = build_timestampers(&["tsa.example.test".to_string()], &cancel).err().unwrap();
    assert!(err.to_string().contains("tsa.example.test"));
}

#[test]
fn archive_client_defaults_the_server() {
    let cancel = CancellationToken::new();
    let client = archive_client(None, &cancel).unwrap();
    assert_eq!(client.base_url(), DEFAULT_ARCHIVISTA_SERVER);
    let client = archive_client(Some("http://127.0.0.1:8082/".to_string()), &cancel).unwrap();
    assert_eq!(client.base_url(), "http://127.0.0.1:8082");
    assert!(archive_client(Some("ftp://archive".to_string()), &cancel).is_err());
}
