// crates/witness-runner/src/runner/tests.rs
// ============================================================================
// Module: Runner Unit Tests
// Description: Unit tests for continuation and subject merging.
// Purpose: Pin error classification and user-subject hashing.
// Dependencies: witness-runner
// ============================================================================

//! ## Overview
//! Covers the continuation table and the user-subject merge; full runs live
//! in the integration tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io;

use witness_core::AttestationError;
use witness_core::ClassifiedError;
use witness_core::DigestSet;
use witness_core::HashFunction;
use witness_core::RunPhase;
use witness_core::attestation::context::CompletedAttestation;
use witness_core::logging::MemoryLogSink;
use witness_core::logging::NoopLogSink;

use super::merge_subjects;
use super::tolerate;
use crate::error::RunError;
use crate::options::ContinuePolicy;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns an attestor-class error.
fn attestor_error() -> ClassifiedError {
    ClassifiedError::attestor("git", AttestationError::Failed("no repository".to_string()))
}

/// Returns an infrastructure-class error.
fn infrastructure_error() -> ClassifiedError {
    ClassifiedError::infrastructure("archive-upload", io::Error::other("connection refused"))
}

/// Builds a completed attestation contributing one subject.
fn completed_with_subject(name: &str, subject: &str, digest: &str) -> CompletedAttestation {
    let mut digests = DigestSet::new();
    digests.insert(HashFunction::Sha256, digest);
    let now = time::OffsetDateTime::now_utc();
    CompletedAttestation {
        name: name.to_string(),
        type_uri: format!("https://example.test/{name}/v0.1"),
        phase: RunPhase::PostProduct,
        capabilities: vec![witness_core::Capability::Subjects],
        predicate: serde_json::json!({}),
        subjects: BTreeMap::from([(subject.to_string(), digests)]),
        materials: BTreeMap::new(),
        products: BTreeMap::new(),
        backrefs: BTreeMap::new(),
        material_dir: None,
        start_time: now,
        end_time: now,
        error: None,
    }
}

// ============================================================================
// SECTION: Continuation
// ============================================================================

#[test]
fn default_policy_tolerates_nothing() {
    let policy = ContinuePolicy::default();
    assert!(!policy.tolerates(&attestor_error()));
    assert!(!policy.tolerates(&infrastructure_error()));
}

#[test]
fn each_flag_covers_its_class() {
    let attestor_only = ContinuePolicy {
        on_attestor_error: true,
        ..ContinuePolicy::default()
    };
    assert!(attestor_only.tolerates(&attestor_error()));
    assert!(!attestor_only.tolerates(&infrastructure_error()));

    let infrastructure_only = ContinuePolicy {
        on_infrastructure_error: true,
        ..ContinuePolicy::default()
    };
    assert!(!infrastructure_only.tolerates(&attestor_error()));
    assert!(infrastructure_only.tolerates(&infrastructure_error()));

    let all = ContinuePolicy {
        on_all_errors: true,
        ..ContinuePolicy::default()
    };
    assert!(all.tolerates(&attestor_error()));
    assert!(all.tolerates(&infrastructure_error()));
}

#[test]
fn tolerated_errors_are_logged_and_kept() {
    let log = MemoryLogSink::new();
    let mut tolerated = Vec::new();
    let policy = ContinuePolicy {
        on_all_errors: true,
        ..ContinuePolicy::default()
    };
    tolerate(policy, attestor_error(), &log, &mut tolerated).unwrap();
    assert_eq!(tolerated.len(), 1);
    assert!(log.contains("tolerated_error"));
}

#[test]
fn untolerated_errors_abort() {
    let mut tolerated = Vec::new();
    let policy = ContinuePolicy::default();
    let err = tolerate(policy, infrastructure_error(), &NoopLogSink, &mut tolerated).unwrap_err();
    assert!(matches!(err, RunError::Aborted(ClassifiedError::Infrastructure { .. })));
    assert!(witness_core::is_infrastructure_error(&err));
    assert!(tolerated.is_empty());
}

// ============================================================================
// SECTION: Subjects
// ============================================================================

#[test]
fn user_subjects_hash_value_bytes() {
    let user = BTreeMap::from([("release".to_string(), "hello\n".to_string())]);
    let subjects = merge_subjects(&[], &user, &[HashFunction::Sha256], &NoopLogSink).unwrap();
    assert_eq!(
        subjects["release"].get(HashFunction::Sha256),
        Some("5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03")
    );
}

#[test]
fn user_subjects_override_attestor_subjects() {
    let completed = vec![completed_with_subject("git", "release", "00")];
    let user = BTreeMap::from([("release".to_string(), "v1".to_string())]);
    let log = MemoryLogSink::new();
    let subjects = merge_subjects(&completed, &user, &[HashFunction::Sha256], &log).unwrap();
    assert_ne!(subjects["release"].get(HashFunction::Sha256), Some("00"));
    assert!(log.contains("subject_collision"));
}
