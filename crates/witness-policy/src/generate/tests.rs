// crates/witness-policy/src/generate/tests.rs
// ============================================================================
// Module: Policy Generator Tests
// Description: Flag parsing, durations, and generated policy shape.
// Purpose: Pin key ids, constraint defaults, and step validation.
// Dependencies: witness-policy, rcgen, ed25519-dalek, tempfile
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rcgen::BasicConstraints;
use rcgen::CertificateParams;
use rcgen::IsCa;
use rcgen::KeyPair;
use serde_json::json;
use sha2::Digest;
use sha2::Sha256;
use time::Duration;
use time::OffsetDateTime;
use witness_core::AttestationError;
use witness_core::AttestorOptions;
use witness_core::AttestorRegistry;
use witness_core::RunPhase;
use witness_core::attestation::COMMAND_RUN_TYPE;
use witness_core::attestation::MATERIAL_TYPE;
use witness_core::attestation::PRODUCT_TYPE;
use witness_core::attestation::registry::RegistryEntry;
use witness_core::crypto::KeySigner;
use witness_core::crypto::PrivateKey;

use super::GenerateOptions;
use super::generate_policy;
use super::parse_duration;
use super::parse_step_mapped;
use crate::model::FunctionaryKind;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Registry that only knows the command-run type.
fn registry() -> AttestorRegistry {
    let mut registry = AttestorRegistry::new();
    registry
        .register(RegistryEntry {
            name: "command-run",
            type_uri: COMMAND_RUN_TYPE,
            phase: RunPhase::Execute,
            always_run: false,
            factory: |_: &AttestorOptions| Err(AttestationError::Failed("unused".to_string())),
            schema: || json!({"type": "object"}),
            docs: None,
        })
        .unwrap();
    registry
}

/// Writes a public key PEM and returns its path string.
fn write_public_key(dir: &Path) -> String {
    let signer = KeySigner::new(PrivateKey::Ed25519(SigningKey::generate(&mut OsRng)));
    let path = dir.join("key.pub");
    std::fs::write(&path, signer.public_key().to_pem().unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

/// Writes a certificate PEM and returns its path string.
fn write_certificate(dir: &Path, name: &str, ca: bool) -> String {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec!["ca.example.test".to_string()]).unwrap();
    params.is_ca = if ca { IsCa::Ca(BasicConstraints::Unconstrained) } else { IsCa::NoCa };
    let path = dir.join(name);
    std::fs::write(&path, params.self_signed(&key).unwrap().pem()).unwrap();
    path.to_string_lossy().into_owned()
}

/// Builds a `step=value` entry.
fn mapped(step: &str, value: &str) -> String {
    format!("{step}={value}")
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn step_mapped_flags_group_by_step() {
    let values = vec![" build = a ".to_string(), "build=b".to_string(), "test=c".to_string()];
    let mapped = parse_step_mapped(&values, "public-key").unwrap();
    assert_eq!(mapped["build"], vec!["a".to_string(), "b".to_string()]);
    assert_eq!(mapped["test"], vec!["c".to_string()]);
    assert!(parse_step_mapped(&["novalue".to_string()], "x").is_err());
    assert!(parse_step_mapped(&["=v".to_string()], "x").is_err());
    assert!(parse_step_mapped(&["s= ".to_string()], "x").is_err());
}

#[test]
fn durations_accept_go_style_units() {
    assert_eq!(parse_duration("8760h").unwrap(), Duration::hours(8760));
    assert_eq!(parse_duration("1h30m").unwrap(), Duration::minutes(90));
    assert_eq!(parse_duration("45s").unwrap(), Duration::seconds(45));
    assert_eq!(parse_duration("250ms").unwrap(), Duration::milliseconds(250));
    for bad in ["", "h", "10", "10d", "1.5h", "-1h"] {
        assert!(parse_duration(bad).is_err(), "{bad}");
    }
}

// ============================================================================
// SECTION: Generation
// ============================================================================

#[test]
fn public_key_step_uses_pem_digest_as_key_id() {
    let dir = tempfile::tempdir().unwrap();
    let key_path = write_public_key(dir.path());
    let options = GenerateOptions {
        steps: vec!["build".to_string()],
        public_keys: vec![mapped("build", &key_path)],
        attestations: vec![mapped("build", "command-run")],
        ..GenerateOptions::default()
    };
    let now = OffsetDateTime::now_utc();
    let policy = generate_policy(&options, &registry(), now).unwrap();

    let expected = hex::encode(Sha256::digest(std::fs::read(&key_path).unwrap()));
    let step = &policy.steps["build"];
    assert_eq!(step.functionaries[0].kind, FunctionaryKind::PublicKey);
    assert_eq!(step.functionaries[0].public_key_id, expected);
    assert_eq!(policy.public_keys[&expected].key_id, expected);
    let types: Vec<&str> = step.attestations.iter().map(|entry| entry.type_uri.as_str()).collect();
    assert_eq!(types, vec![MATERIAL_TYPE, PRODUCT_TYPE, COMMAND_RUN_TYPE]);
    assert_eq!(policy.expires, now + Duration::hours(8760));
    assert!(policy.key_verifiers().is_ok());
}

#[test]
fn root_step_defaults_constraints_to_wildcard() {
    let dir = tempfile::tempdir().unwrap();
    let ca_path = write_certificate(dir.path(), "ca.pem", true);
    let other_ca_path = write_certificate(dir.path(), "other-ca.pem", true);
    let intermediate_path = write_certificate(dir.path(), "intermediate.pem", true);
    let options = GenerateOptions {
        steps: vec!["build".to_string(), "package".to_string()],
        root_cas: vec![mapped("build", &ca_path), mapped("package", &other_ca_path)],
        intermediates: vec![mapped("build", &intermediate_path)],
        cert_organizations: vec![mapped("build", "acme")],
        artifacts_from: vec![mapped("package", "build")],
        tsa_cas: vec![ca_path.clone()],
        expires_in: "24h".to_string(),
        ..GenerateOptions::default()
    };
    let policy = generate_policy(&options, &registry(), OffsetDateTime::now_utc()).unwrap();

    let root_id = hex::encode(Sha256::digest(std::fs::read(&ca_path).unwrap()));
    let constraint = &policy.steps["build"].functionaries[0].cert_constraint;
    assert_eq!(constraint.common_name, "*");
    assert_eq!(constraint.dns_names, vec!["*".to_string()]);
    assert_eq!(constraint.organizations, vec!["acme".to_string()]);
    assert_eq!(constraint.roots, vec![root_id.clone()]);
    assert_eq!(policy.roots[&root_id].intermediates.len(), 1);
    assert_eq!(policy.roots.len(), 2);
    assert_eq!(policy.steps["package"].artifacts_from, vec!["build".to_string()]);
    assert!(policy.timestamp_authorities.contains_key(&root_id));
}

#[test]
fn invalid_inputs_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let key_path = write_public_key(dir.path());
    let leaf_path = write_certificate(dir.path(), "leaf.pem", false);
    let base = GenerateOptions {
        steps: vec!["build".to_string()],
        public_keys: vec![mapped("build", &key_path)],
        ..GenerateOptions::default()
    };
    let now = OffsetDateTime::now_utc();

    let no_functionary = GenerateOptions {
        public_keys: Vec::new(),
        ..base.clone()
    };
    let err = generate_policy(&no_functionary, &registry(), now).unwrap_err();
    assert!(err.to_string().contains("no functionaries"));

    let unknown_step = GenerateOptions {
        cert_emails: vec![mapped("deploy", "ops@example.test")],
        ..base.clone()
    };
    assert!(generate_policy(&unknown_step, &registry(), now).is_err());

    let unknown_upstream = GenerateOptions {
        artifacts_from: vec![mapped("build", "clone")],
        ..base.clone()
    };
    assert!(generate_policy(&unknown_upstream, &registry(), now).is_err());

    let unknown_attestor = GenerateOptions {
        attestations: vec![mapped("build", "nonexistent")],
        ..base.clone()
    };
    assert!(generate_policy(&unknown_attestor, &registry(), now).is_err());

    let non_ca_root = GenerateOptions {
        root_cas: vec![mapped("build", &leaf_path)],
        ..base.clone()
    };
    let err = generate_policy(&non_ca_root, &registry(), now).unwrap_err();
    assert!(err.to_string().contains("not a CA"));

    let bad_duration = GenerateOptions {
        expires_in: "forever".to_string(),
        ..base
    };
    assert!(generate_policy(&bad_duration, &registry(), now).is_err());
}
