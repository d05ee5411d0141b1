// crates/witness-policy/src/check/tests.rs
// ============================================================================
// Module: Policy Check Tests
// Description: Structural validation report coverage.
// Purpose: Pin error and warning categories, locations, and counters.
// Dependencies: witness-policy, rcgen
// ============================================================================

//! ## Overview
//! Builds policies in memory with generated certificates and checks the
//! resulting report.

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

use rcgen::BasicConstraints;
use rcgen::CertificateParams;
use rcgen::IsCa;
use rcgen::KeyPair;
use time::Duration;
use time::OffsetDateTime;

use super::check_policy;
use super::render_text;
use crate::model::AttestationRequirement;
use crate::model::CertConstraint;
use crate::model::Functionary;
use crate::model::FunctionaryKind;
use crate::model::Policy;
use crate::model::RegoModule;
use crate::model::Root;
use crate::model::Step;
use crate::rules::RegoRuleEvaluator;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Returns a self-signed certificate PEM.
fn certificate(ca: bool) -> Vec<u8> {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec!["root.example.test".to_string()]).unwrap();
    params.is_ca = if ca { IsCa::Ca(BasicConstraints::Unconstrained) } else { IsCa::NoCa };
    params.self_signed(&key).unwrap().pem().into_bytes()
}

/// Builds a one-step policy with a root functionary.
fn policy(expires_in: Duration, ca: bool) -> Policy {
    let functionary = Functionary {
        kind: FunctionaryKind::Root,
        cert_constraint: CertConstraint {
            common_name: "*".to_string(),
            roots: vec!["R1".to_string()],
            ..CertConstraint::default()
        },
        public_key_id: String::new(),
    };
    Policy {
        expires: OffsetDateTime::now_utc() + expires_in,
        roots: BTreeMap::from([(
            "R1".to_string(),
            Root {
                certificate: certificate(ca),
                intermediates: Vec::new(),
            },
        )]),
        public_keys: BTreeMap::new(),
        timestamp_authorities: BTreeMap::new(),
        steps: BTreeMap::from([(
            "build".to_string(),
            Step {
                name: "build".to_string(),
                functionaries: vec![functionary],
                attestations: vec![AttestationRequirement {
                    type_uri: "https://witness.dev/attestations/command-run/v0.1".to_string(),
                    rego_policies: Vec::new(),
                }],
                artifacts_from: Vec::new(),
            },
        )]),
    }
}

/// Checks a policy value at the current instant.
fn check(policy: &Policy) -> super::ValidationReport {
    check_policy(&policy.to_json().unwrap(), &RegoRuleEvaluator, OffsetDateTime::now_utc())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn well_formed_policy_passes() {
    let report = check(&policy(Duration::days(365), true));
    assert!(report.valid, "{}", render_text(&report));
    assert!(report.warnings.is_empty());
    assert_eq!(report.checks_performed, report.checks_passed);
    assert!(report.policy_expiration.is_some());
}

#[test]
fn expired_policy_is_an_error() {
    let report = check(&policy(Duration::days(-1), true));
    assert!(!report.valid);
    assert!(report.errors.iter().any(|issue| issue.category == "Policy Expiration"));
}

#[test]
fn near_expiry_is_a_warning() {
    let report = check(&policy(Duration::days(10), true));
    assert!(report.valid);
    assert_eq!(report.warnings[0].category, "Policy Expiration");
}

#[test]
fn non_ca_root_is_an_error() {
    let report = check(&policy(Duration::days(365), false));
    let error = report.errors.iter().find(|issue| issue.message.contains("not a CA")).unwrap();
    assert_eq!(error.category, "Root Certificate");
    assert_eq!(error.location, "roots.R1.certificate");
}

#[test]
fn broken_rule_module_is_located() {
    let mut policy = policy(Duration::days(365), true);
    let step = policy.steps.get_mut("build").unwrap();
    step.attestations[0].rego_policies.push(RegoModule {
        name: "broken".to_string(),
        module: b"package broken\n\ndeny[ {".to_vec(),
    });
    let report = check(&policy);
    let error = report.errors.iter().find(|issue| issue.category == "Rego Policy").unwrap();
    assert_eq!(error.location, "steps.build.attestations[0].regopolicies[0]");
}

#[test]
fn unresolved_references_and_hygiene_warnings() {
    let mut policy = policy(Duration::days(365), true);
    let build = policy.steps.get_mut("build").unwrap();
    build.functionaries[0].cert_constraint.roots = vec!["missing".to_string()];
    build.artifacts_from = vec!["ghost".to_string()];
    policy.steps.insert(
        "lint".to_string(),
        Step {
            name: "lint".to_string(),
            functionaries: Vec::new(),
            attestations: Vec::new(),
            artifacts_from: Vec::new(),
        },
    );
    let report = check(&policy);

    let error = report.errors.iter().find(|issue| issue.category == "Functionary").unwrap();
    assert_eq!(error.location, "steps.build.functionaries[0].certconstraint.roots");
    let warnings: Vec<&str> = report.warnings.iter().map(|issue| issue.location.as_str()).collect();
    assert!(warnings.contains(&"steps.build.artifactsFrom"));
    assert!(warnings.contains(&"steps.lint.functionaries"));
    assert!(warnings.contains(&"roots.R1"));
}

#[test]
fn unparseable_file_reports_policy_file_error() {
    let report = check_policy(b"{\"steps\": 3}", &RegoRuleEvaluator, OffsetDateTime::now_utc());
    assert!(!report.valid);
    assert_eq!(report.errors[0].category, "Policy File");
    assert!(report.policy_expiration.is_none());
    assert!(render_text(&report).contains("FAILED"));
}

#[test]
fn report_serializes_as_json() {
    let report = check(&policy(Duration::days(365), true));
    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["valid"], true);
    assert!(value["policy_expiration"].is_string());
}
