// crates/witness-attestors/src/environment/tests.rs
// ============================================================================
// Module: Environment Attestor Tests
// Description: Unit tests for block-list and allow-list filtering.
// Purpose: Keep credentials out of signed environment payloads.
// Dependencies: witness-attestors, tempfile
// ============================================================================

//! ## Overview
//! Covers default redaction, allow overrides, and `/proc` environ blocks.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use witness_core::AttestationContext;
use witness_core::Attestor;

use super::EnvironmentAttestor;
use super::VariableFilter;

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Builds owned variable pairs.
fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(name, value)| ((*name).to_string(), (*value).to_string())).collect()
}

#[test]
fn default_filter_drops_listed_and_pattern_names() {
    let filter = VariableFilter::default();
    assert!(!filter.permits("AWS_SECRET_ACCESS_KEY"));
    assert!(!filter.permits("MY_API_TOKEN"));
    assert!(!filter.permits("db_password"));
    assert!(filter.permits("PATH"));
    assert!(filter.permits("HOME"));
}

#[test]
fn allow_list_overrides_block_list() {
    let filter = VariableFilter::default().allow(&["CI_JOB_TOKEN".to_string()]).unwrap();
    assert!(filter.permits("CI_JOB_TOKEN"));
    assert!(!filter.permits("GH_TOKEN"));
}

#[test]
fn additional_block_entries_apply() {
    let filter =
        VariableFilter::default().block(&["INTERNAL_*".to_string(), "BUILD_ID".to_string()]).unwrap();
    assert!(!filter.permits("INTERNAL_HOST"));
    assert!(!filter.permits("BUILD_ID"));
    assert!(filter.permits("BUILD_NUMBER"));
}

#[test]
fn environ_block_is_filtered_and_joined() {
    let filter = VariableFilter::default();
    let joined = filter.apply_environ_block(b"PATH=/bin\0GH_TOKEN=abc\0LANG=C\0");
    assert_eq!(joined, "PATH=/bin LANG=C");
}

#[test]
fn attest_records_filtered_variables() {
    let dir = tempfile::tempdir().unwrap();
    let context = AttestationContext::new(dir.path());
    let mut attestor = EnvironmentAttestor::new().with_variables(vars(&[
        ("PATH", "/usr/bin"),
        ("VAULT_TOKEN", "s.secret"),
        ("STRIPE_API_KEY", "sk"),
    ]));
    attestor.attest(&context).unwrap();
    let predicate = attestor.predicate_data();
    assert_eq!(predicate.os, std::env::consts::OS);
    assert_eq!(predicate.variables.len(), 1);
    assert_eq!(predicate.variables.get("PATH").map(String::as_str), Some("/usr/bin"));
}
