// crates/witness-cli/src/config/tests.rs
// ============================================================================
// Module: Config File Tests
// Description: Section parsing, unknown keys, and flag precedence.
// Purpose: Keep `.witness.toml` keys aligned with the long flag names.
// Dependencies: witness-cli, tempfile
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use std::path::PathBuf;

use super::load_config;
use super::parse_config;
use super::pick;
use super::pick_list;
use super::pick_switch;

/// Config exercising every section.
const FULL_CONFIG: &str = r#"
[run]
step = "build"
attestations = ["environment", "git"]
hashes = ["sha256", "sha1"]
continue-on-attestor-error = true
signer-file-key-path = "keys/build.pem"
timestamp-servers = ["https://tsa.example.test"]

[sign]
datatype = "application/vnd.example+json"
signer-file-key-path = "keys/sign.pem"

[verify]
policy = "policy.signed.json"
publickey = "keys/policy.pub"
allow-unsigned-policy = false

[log]
level = "debug"
file = "witness.log"
"#;

#[test]
fn full_config_parses_every_section() {
    let config = parse_config(FULL_CONFIG.as_bytes()).unwrap();
    assert_eq!(config.run.step.as_deref(), Some("build"));
    assert_eq!(config.run.attestations, vec!["environment".to_string(), "git".to_string()]);
    assert_eq!(config.run.continue_on_attestor_error, Some(true));
    let signer = config.run.signer();
    assert_eq!(signer.signer_file_key_path, Some(PathBuf::from("keys/build.pem")));
    assert_eq!(signer.timestamp_servers, vec!["https://tsa.example.test".to_string()]);
    assert_eq!(config.sign.signer().signer_file_key_path, Some(PathBuf::from("keys/sign.pem")));
    assert_eq!(config.verify.publickey, Some(PathBuf::from("keys/policy.pub")));
    assert_eq!(config.verify.allow_unsigned_policy, Some(false));
    assert_eq!(config.log.level.as_deref(), Some("debug"));
}

#[test]
fn empty_config_is_default() {
    let config = parse_config(b"").unwrap();
    assert_eq!(config, super::WitnessConfig::default());
}

#[test]
fn unknown_keys_are_rejected() {
    let err = parse_config(b"[run]\nstepp = \"typo\"\n").unwrap_err();
    assert!(err.contains("stepp"), "{err}");
    assert!(parse_config(b"[deploy]\n").is_err());
}

#[test]
fn explicit_missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let err = load_config(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn explicit_config_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("witness.toml");
    std::fs::write(&path, FULL_CONFIG).unwrap();
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.sign.datatype.as_deref(), Some("application/vnd.example+json"));
}

#[test]
fn flags_override_config_values() {
    assert_eq!(pick(Some("flag".to_string()), Some(&"file".to_string())), Some("flag".to_string()));
    assert_eq!(pick(None, Some(&"file".to_string())), Some("file".to_string()));
    assert_eq!(pick_list(&["a".to_string()], &["b".to_string()]), vec!["a".to_string()]);
    assert_eq!(pick_list(&[], &["b".to_string()]), vec!["b".to_string()]);
    assert!(pick_switch(true, Some(false)));
    assert!(pick_switch(false, Some(true)));
    assert!(!pick_switch(false, None));
}
