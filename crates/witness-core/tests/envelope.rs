// crates/witness-core/tests/envelope.rs
// ============================================================================
// Module: Envelope Integration Tests
// Description: Signing and verification across raw keys and certificates.
// Purpose: Validate key ids, chain checks, thresholds, and decode rules.
// Dependencies: witness-core, rcgen, rsa, signature, time
// ============================================================================

//! ## Overview
//! Exercises the envelope codec end to end with RSA, Ed25519, and
//! certificate-bound ECDSA signers.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use rand::rngs::OsRng;
use sha2::Digest;
use sha2::Sha256;
use signature::RandomizedSigner;
use signature::SignatureEncoding;
use time::Duration;
use time::OffsetDateTime;
use witness_core::CryptoError;
use witness_core::crypto::KeySigner;
use witness_core::crypto::PrivateKey;
use witness_core::crypto::PublicKey;
use witness_core::crypto::RsaHash;
use witness_core::crypto::SignatureScheme;
use witness_core::crypto::Signer;
use witness_core::crypto::X509Signer;
use witness_core::crypto::load_signer_from_pem;
use witness_core::crypto::load_verifier_from_pem;
use witness_core::crypto::x509::parse_certificate_pem;
use witness_core::envelope::Envelope;
use witness_core::envelope::EnvelopeError;
use witness_core::envelope::VerifyOptions;
use witness_core::envelope::sign;
use witness_core::envelope::timestamp::TimestampError;
use witness_core::envelope::timestamp::TimestampVerifier;
use witness_core::envelope::verify;

use crate::common::ed25519_signer;
use crate::common::generate_pki;

// ============================================================================
// SECTION: Raw Keys
// ============================================================================

#[test]
fn rsa_policy_signature_uses_pem_key_id() {
    let key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
    let signer = KeySigner::new(PrivateKey::Rsa(key));
    let envelope = sign("policy/v0.1", b"", &[&signer], &[]).unwrap();

    assert_eq!(envelope.payload_type, "policy/v0.1");
    assert_eq!(envelope.signatures.len(), 1);
    let pem = signer.public_key().to_pem().unwrap();
    assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    let expected = hex::encode(Sha256::digest(pem.as_bytes()));
    assert_eq!(envelope.signatures[0].key_id, expected);

    let verifier = signer.verifier().unwrap();
    let passed =
        verify(&envelope, &VerifyOptions::new(vec![verifier.as_ref()], OffsetDateTime::now_utc()))
            .unwrap();
    assert_eq!(passed.len(), 1);
    assert_eq!(passed[0].key_id, expected);
}

#[test]
fn rsa_pss_accepts_digest_and_maximum_salt_lengths() {
    let key = rsa::RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
    let public = PublicKey::Rsa(key.to_public_key());
    let scheme = SignatureScheme::RsaPss(RsaHash::Sha256);
    let message = b"DSSEv1 10 text/plain 4 body";
    let pss_signature = |salt_len: usize| {
        rsa::pss::SigningKey::<Sha256>::new_with_salt_len(key.clone(), salt_len)
            .sign_with_rng(&mut OsRng, message)
            .to_vec()
    };

    let own = PrivateKey::Rsa(key.clone()).sign(RsaHash::Sha256, message);
    public.verify_scheme(scheme, message, &own).unwrap();
    public.verify_scheme(scheme, message, &pss_signature(32)).unwrap();
    public.verify_scheme(scheme, message, &pss_signature(256 - 32 - 2)).unwrap();
    assert!(matches!(
        public.verify_scheme(scheme, message, &pss_signature(0)),
        Err(CryptoError::SignatureMismatch)
    ));
}

#[test]
fn wrong_key_yields_no_matching_signatures() {
    let signer = ed25519_signer();
    let other = ed25519_signer();
    let envelope = sign("text/plain", b"body", &[&signer], &[]).unwrap();
    let verifier = other.verifier().unwrap();
    let err =
        verify(&envelope, &VerifyOptions::new(vec![verifier.as_ref()], OffsetDateTime::now_utc()))
            .unwrap_err();
    assert!(matches!(err, EnvelopeError::NoMatchingSignatures(_)));
}

#[test]
fn threshold_counts_distinct_keys() {
    let first = ed25519_signer();
    let second = ed25519_signer();
    let envelope = sign("text/plain", b"body", &[&first, &second], &[]).unwrap();
    let v1 = first.verifier().unwrap();
    let v2 = second.verifier().unwrap();

    let mut options = VerifyOptions::new(vec![v1.as_ref()], OffsetDateTime::now_utc());
    options.threshold = 2;
    let err = verify(&envelope, &options).unwrap_err();
    assert!(matches!(err, EnvelopeError::ThresholdNotMet { required: 2, verified: 1 }));

    options.verifiers.push(v2.as_ref());
    assert_eq!(verify(&envelope, &options).unwrap().len(), 2);
}

#[test]
fn envelope_without_signatures_is_rejected() {
    let unsigned = Envelope::unsigned("text/plain", b"body".to_vec());
    let json = unsigned.to_json().unwrap();
    assert!(matches!(Envelope::from_json(&json), Err(EnvelopeError::NoSignatures)));
    let err = verify(&unsigned, &VerifyOptions::new(Vec::new(), OffsetDateTime::now_utc()))
        .unwrap_err();
    assert!(matches!(err, EnvelopeError::NoSignatures));
}

#[test]
fn envelope_json_uses_wire_field_names() {
    let signer = ed25519_signer();
    let envelope = sign("text/plain", b"body", &[&signer], &[]).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&envelope.to_json().unwrap()).unwrap();
    assert_eq!(value["payloadType"], "text/plain");
    assert_eq!(value["payload"], "Ym9keQ==");
    assert!(value["signatures"][0]["keyid"].is_string());
    assert!(value["signatures"][0]["sig"].is_string());
    let decoded = Envelope::from_json(&envelope.to_json().unwrap()).unwrap();
    assert_eq!(decoded, envelope);
}

#[test]
fn loaded_signer_matches_loaded_verifier() {
    let pki = generate_pki("build", &["build.example"]);
    let signer = load_signer_from_pem(pki.leaf_key_pem.as_bytes()).unwrap();
    let verifier = load_verifier_from_pem(signer.public_key().to_pem().unwrap().as_bytes()).unwrap();
    assert_eq!(signer.key_id().unwrap(), verifier.key_id().unwrap());
}

// ============================================================================
// SECTION: Certificates
// ============================================================================

/// Builds a certificate-bound signer from a generated PKI.
fn x509_signer(pki: &common::TestPki) -> X509Signer {
    let key = load_signer_from_pem(pki.leaf_key_pem.as_bytes()).unwrap();
    let leaf = parse_certificate_pem(pki.leaf_pem.as_bytes()).unwrap();
    X509Signer::new(Box::new(key), leaf, Vec::new(), Vec::new()).unwrap()
}

#[test]
fn certificate_signature_chains_to_supplied_root() {
    let pki = generate_pki("build", &["build.example"]);
    let signer = x509_signer(&pki);
    let envelope = sign("text/plain", b"body", &[&signer], &[]).unwrap();
    assert!(!envelope.signatures[0].certificate.is_empty());

    let mut options = VerifyOptions::new(Vec::new(), OffsetDateTime::now_utc());
    options.roots = vec![parse_certificate_pem(pki.ca_pem.as_bytes()).unwrap()];
    let passed = verify(&envelope, &options).unwrap();
    let certificate = passed[0].certificate.as_ref().unwrap();
    assert_eq!(certificate.identity().common_names, vec!["build".to_string()]);
    assert_eq!(certificate.identity().dns_names, vec!["build.example".to_string()]);
}

#[test]
fn certificate_signature_fails_without_trusted_root() {
    let pki = generate_pki("build", &["build.example"]);
    let other = generate_pki("other", &[]);
    let signer = x509_signer(&pki);
    let envelope = sign("text/plain", b"body", &[&signer], &[]).unwrap();

    let mut options = VerifyOptions::new(Vec::new(), OffsetDateTime::now_utc());
    options.roots = vec![parse_certificate_pem(other.ca_pem.as_bytes()).unwrap()];
    let err = verify(&envelope, &options).unwrap_err();
    assert!(matches!(err, EnvelopeError::NoMatchingSignatures(_)));
}

#[test]
fn mismatched_certificate_key_is_rejected() {
    let pki = generate_pki("build", &[]);
    let leaf = parse_certificate_pem(pki.leaf_pem.as_bytes()).unwrap();
    let result = X509Signer::new(Box::new(ed25519_signer()), leaf, Vec::new(), Vec::new());
    assert!(result.is_err());
}

// ============================================================================
// SECTION: Timestamps
// ============================================================================

/// Timestamp verifier that accepts every token at a fixed instant.
struct FixedInstant(OffsetDateTime);

impl TimestampVerifier for FixedInstant {
    fn verify(&self, _token: &[u8], _data: &[u8]) -> Result<OffsetDateTime, TimestampError> {
        Ok(self.0)
    }
}

#[test]
fn timestamp_verifiers_require_a_token() {
    let signer = ed25519_signer();
    let envelope = sign("text/plain", b"body", &[&signer], &[]).unwrap();
    let verifier = signer.verifier().unwrap();
    let fixed = FixedInstant(OffsetDateTime::now_utc() - Duration::days(1));
    let mut options = VerifyOptions::new(vec![verifier.as_ref()], OffsetDateTime::now_utc());
    options.timestamp_verifiers = vec![&fixed];
    let err = verify(&envelope, &options).unwrap_err();
    assert!(matches!(err, EnvelopeError::NoMatchingSignatures(reason) if reason.contains("timestamp")));
}
