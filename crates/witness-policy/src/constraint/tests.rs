// crates/witness-policy/src/constraint/tests.rs
// ============================================================================
// Module: Constraint Checker Tests
// Description: Equality-semantics table for certificate attributes.
// Purpose: Pin wildcard, empty, and set-equality matching.
// Dependencies: witness-policy, proptest
// ============================================================================

//! ## Overview
//! Table tests for [`check_attribute`] plus identity-level aggregation.
//! Chain anchoring is covered by the integration tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use proptest::prelude::*;
use witness_core::crypto::CertificateIdentity;

use super::check_attribute;
use crate::model::CertConstraint;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an owned list from string slices.
fn list(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

// ============================================================================
// SECTION: Attribute Table
// ============================================================================

#[test]
fn attribute_equality_table() {
    let cases: &[(&[&str], &[&str], bool)] = &[
        (&["*"], &["anything"], true),
        (&["*"], &["a", "b"], true),
        (&["*"], &[], true),
        (&[], &[], true),
        (&[], &["a"], false),
        (&[""], &[], true),
        (&[""], &[""], true),
        (&[], &[""], true),
        (&["a"], &["a"], true),
        (&["a", "b"], &["b", "a"], true),
        (&["a", "b"], &["a"], false),
        (&["a"], &["a", "b"], false),
        (&["a"], &[], false),
        (&["a"], &["b"], false),
        (&["*", "a"], &["b"], false),
    ];
    for (constraint, observed, expected) in cases {
        assert_eq!(
            check_attribute(&list(constraint), &list(observed)),
            *expected,
            "constraint={} observed={}",
            constraint.join(","),
            observed.join(",")
        );
    }
}

proptest! {
    #[test]
    fn wildcard_accepts_any_observation(observed in proptest::collection::vec("[a-z]{1,8}", 0..6)) {
        prop_assert!(check_attribute(&list(&["*"]), &observed));
    }

    #[test]
    fn set_equality_ignores_order(mut values in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
        let constraint = values.clone();
        values.reverse();
        prop_assert!(check_attribute(&constraint, &values));
    }
}

// ============================================================================
// SECTION: Identity Aggregation
// ============================================================================

#[test]
fn identity_failures_are_aggregated_per_attribute() {
    let constraint = CertConstraint {
        common_name: "build".to_string(),
        dns_names: list(&["*"]),
        emails: Vec::new(),
        organizations: list(&["acme"]),
        uris: Vec::new(),
        roots: list(&["R1"]),
    };
    let mut identity = CertificateIdentity {
        common_names: list(&["build"]),
        dns_names: list(&["ci.example.test"]),
        organizations: list(&["acme"]),
        ..CertificateIdentity::default()
    };
    assert!(constraint.attribute_failures(&identity).is_empty());

    identity.organizations = list(&["other"]);
    identity.emails = list(&["ops@example.test"]);
    assert_eq!(
        constraint.attribute_failures(&identity),
        vec!["constraint:email".to_string(), "constraint:organization".to_string()]
    );
}

#[test]
fn empty_common_name_requires_no_common_name() {
    let constraint = CertConstraint::default();
    let identity = CertificateIdentity {
        common_names: list(&["build"]),
        ..CertificateIdentity::default()
    };
    assert_eq!(constraint.attribute_failures(&identity), vec!["constraint:commonname".to_string()]);
    assert!(constraint.attribute_failures(&CertificateIdentity::default()).is_empty());
}
