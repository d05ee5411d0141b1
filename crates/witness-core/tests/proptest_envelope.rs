// crates/witness-core/tests/proptest_envelope.rs
// ============================================================================
// Module: Envelope and Digest Property-Based Tests
// Description: Laws for PAE signing, digest-set equality, and statements.
// Purpose: Check codec invariants over arbitrary inputs.
// Dependencies: witness-core, proptest
// ============================================================================

//! ## Overview
//! - Signing any `(type, body)` pair verifies against the signer's key.
//! - Ed25519 envelopes over identical inputs are byte-identical.
//! - Digest-set equality is reflexive, false without shared hashes, and false
//!   on any disagreement.
//! - Statements decode and re-encode to identical bytes.

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
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::json;
use time::OffsetDateTime;
use witness_core::DigestSet;
use witness_core::HashFunction;
use witness_core::crypto::Signer;
use witness_core::envelope::VerifyOptions;
use witness_core::envelope::pae;
use witness_core::envelope::sign;
use witness_core::envelope::verify;
use witness_core::intoto::Statement;

use crate::common::ed25519_signer;

/// Strategy over non-gitoid hash functions.
fn plain_hash() -> impl Strategy<Value = HashFunction> {
    prop::sample::select(vec![
        HashFunction::Sha1,
        HashFunction::Sha256,
        HashFunction::Sha384,
        HashFunction::Sha512,
    ])
}

/// Strategy over byte strings shorter than `max`.
fn bytes(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..max)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pae_signatures_verify(payload_type in "[a-z/.+-]{0,40}", body in bytes(512)) {
        let signer = ed25519_signer();
        let envelope = sign(&payload_type, &body, &[&signer], &[]).unwrap();
        let verifier = signer.verifier().unwrap();
        let options = VerifyOptions::new(vec![verifier.as_ref()], OffsetDateTime::now_utc());
        let passed = verify(&envelope, &options);
        prop_assert!(passed.is_ok());
        prop_assert_eq!(envelope.payload, body);
    }

    #[test]
    fn pae_encodes_lengths_in_decimal(payload_type in "[a-z]{0,20}", body in bytes(64)) {
        let encoded = pae(&payload_type, &body);
        let header = format!("DSSEv1 {} {} {} ", payload_type.len(), payload_type, body.len());
        prop_assert!(encoded.starts_with(header.as_bytes()));
        prop_assert_eq!(&encoded[header.len() ..], body.as_slice());
    }

    #[test]
    fn ed25519_envelopes_are_deterministic(body in bytes(256)) {
        let signer = ed25519_signer();
        let first = sign("application/vnd.in-toto+json", &body, &[&signer], &[]).unwrap();
        let second = sign("application/vnd.in-toto+json", &body, &[&signer], &[]).unwrap();
        prop_assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn digest_set_equals_itself(data in bytes(256), hash in plain_hash()) {
        let set = DigestSet::from_bytes(&data, &[hash]).unwrap();
        prop_assert!(set.equal(&set));
    }

    #[test]
    fn disjoint_digest_sets_are_unequal(data in bytes(64)) {
        let left = DigestSet::from_bytes(&data, &[HashFunction::Sha256]).unwrap();
        let right =
            DigestSet::from_bytes(&data, &[HashFunction::Sha512, HashFunction::Sha1]).unwrap();
        prop_assert!(!left.equal(&right));
    }

    #[test]
    fn shared_hash_disagreement_is_unequal(a in bytes(64), b in bytes(64)) {
        prop_assume!(a != b);
        let left = DigestSet::from_bytes(&a, &[HashFunction::Sha256, HashFunction::Sha1]).unwrap();
        let mut right = DigestSet::from_bytes(&a, &[HashFunction::Sha1]).unwrap();
        let other = DigestSet::from_bytes(&b, &[HashFunction::Sha256]).unwrap();
        right.insert(HashFunction::Sha256, other.get(HashFunction::Sha256).unwrap());
        prop_assert!(!left.equal(&right));
    }

    #[test]
    fn statements_reencode_identically(
        names in prop::collection::btree_set("[a-z0-9./]{1,16}", 0..8)
    ) {
        let subjects: BTreeMap<String, DigestSet> = names
            .iter()
            .map(|name| {
                let hashes = [HashFunction::Sha256, HashFunction::Sha1];
                (name.clone(), DigestSet::from_bytes(name.as_bytes(), &hashes).unwrap())
            })
            .collect();
        let statement = Statement::new(
            "https://witness.testifysec.com/attestation-collection/v0.1",
            json!({"name": "build", "attestations": []}),
            &subjects,
        )
        .unwrap();
        let bytes = statement.to_json().unwrap();
        let decoded = Statement::from_json(&bytes).unwrap();
        prop_assert_eq!(decoded.to_json().unwrap(), bytes);
        let sorted: Vec<&str> =
            decoded.subject.iter().map(|subject| subject.name.as_str()).collect();
        let mut expected = sorted.clone();
        expected.sort_unstable();
        prop_assert_eq!(sorted, expected);
    }
}
