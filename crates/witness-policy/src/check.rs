// crates/witness-policy/src/check.rs
// ============================================================================
// Module: Policy Check
// Description: Read-only structural validation of policy documents.
// Purpose: Report every problem a policy would hit at verification time,
//          plus hygiene warnings, without verifying any attestation.
// Dependencies: serde, time, witness-core
// ============================================================================

//! ## Overview
//! [`check_policy`] runs independent checks and reports the union of their
//! failures as a [`ValidationReport`]:
//! - the policy has not expired;
//! - every root and timestamp-authority certificate parses, is a CA, is
//!   self-signed correctly, and outlives the policy;
//! - public keys parse and match their declared ids;
//! - rule modules compile;
//! - functionary references resolve and `artifactsFrom` is acyclic.
//!
//! Warnings cover near expiry, steps without functionaries, unused trust
//! material, and references to unknown steps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::Serialize;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use witness_core::Envelope;
use witness_core::crypto::x509::is_ca;
use witness_core::crypto::x509::not_after;
use witness_core::crypto::x509::parse_certificate_pem;
use witness_core::crypto::x509::parse_certificates_pem;
use witness_core::crypto::x509::verify_certificate_signature;

use crate::graph::step_order;
use crate::model::FunctionaryKind;
use crate::model::Policy;
use crate::model::Root;
use crate::model::WILDCARD;
use crate::model::parse_public_key;
use crate::rules::RuleEvaluator;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Policies expiring sooner than this draw a warning.
pub const EXPIRY_WARNING_WINDOW: Duration = Duration::days(30);

/// Issue category for parse failures.
const CATEGORY_FILE: &str = "Policy File";
/// Issue category for expiry.
const CATEGORY_EXPIRATION: &str = "Policy Expiration";
/// Issue category for root certificates.
const CATEGORY_ROOT: &str = "Root Certificate";
/// Issue category for timestamp authorities.
const CATEGORY_TSA: &str = "Timestamp Authority";
/// Issue category for public keys.
const CATEGORY_KEY: &str = "Public Key";
/// Issue category for functionaries.
const CATEGORY_FUNCTIONARY: &str = "Functionary";
/// Issue category for rule modules.
const CATEGORY_REGO: &str = "Rego Policy";
/// Issue category for step structure.
const CATEGORY_STEP: &str = "Step";

// ============================================================================
// SECTION: Report
// ============================================================================

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Issue category.
    pub category: String,
    /// What is wrong.
    pub message: String,
    /// How to fix it.
    pub suggestion: String,
    /// Dotted location inside the policy document.
    pub location: String,
}

/// Result of a policy check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// True when no errors were found.
    pub valid: bool,
    /// Errors.
    pub errors: Vec<ValidationIssue>,
    /// Warnings.
    pub warnings: Vec<ValidationIssue>,
    /// Checks attempted.
    pub checks_performed: usize,
    /// Checks that passed.
    pub checks_passed: usize,
    /// Policy expiry, when the policy parsed.
    #[serde(with = "time::serde::rfc3339::option")]
    pub policy_expiration: Option<OffsetDateTime>,
}

/// Accumulates check outcomes.
#[derive(Default)]
struct Checker {
    /// Errors so far.
    errors: Vec<ValidationIssue>,
    /// Warnings so far.
    warnings: Vec<ValidationIssue>,
    /// Checks attempted.
    performed: usize,
    /// Checks passed.
    passed: usize,
}

impl Checker {
    /// Records one check outcome.
    fn check(&mut self, outcome: Result<(), ValidationIssue>) {
        self.performed += 1;
        match outcome {
            Ok(()) => self.passed += 1,
            Err(issue) => self.errors.push(issue),
        }
    }

    /// Records a warning.
    fn warn(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    /// Finishes the report.
    fn finish(self, policy_expiration: Option<OffsetDateTime>) -> ValidationReport {
        ValidationReport {
            valid: self.errors.is_empty(),
            errors: self.errors,
            warnings: self.warnings,
            checks_performed: self.performed,
            checks_passed: self.passed,
            policy_expiration,
        }
    }
}

/// Builds an issue.
fn issue(
    category: &str,
    location: impl Into<String>,
    message: impl Into<String>,
    suggestion: &str,
) -> ValidationIssue {
    ValidationIssue {
        category: category.to_string(),
        message: message.into(),
        suggestion: suggestion.to_string(),
        location: location.into(),
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Checks a policy file's bytes (bare policy or envelope) at `now`.
#[must_use]
pub fn check_policy(
    bytes: &[u8],
    evaluator: &dyn RuleEvaluator,
    now: OffsetDateTime,
) -> ValidationReport {
    let mut checker = Checker::default();
    let parsed = decode_policy(bytes);
    checker.check(parsed.as_ref().map(|_| ()).map_err(Clone::clone));
    let Ok(policy) = parsed else {
        return checker.finish(None);
    };

    check_expiry(&mut checker, &policy, now);
    for (id, root) in &policy.roots {
        check_root(&mut checker, CATEGORY_ROOT, &format!("roots.{id}"), root, &policy, now);
    }
    for (id, root) in &policy.timestamp_authorities {
        let location = format!("timestampauthorities.{id}");
        check_root(&mut checker, CATEGORY_TSA, &location, root, &policy, now);
    }
    for (id, entry) in &policy.public_keys {
        checker.check(parse_public_key(id, entry).map(|_| ()).map_err(|err| {
            issue(
                CATEGORY_KEY,
                format!("publickeys.{id}"),
                err.to_string(),
                "regenerate the key entry from the public key PEM",
            )
        }));
    }
    check_steps(&mut checker, &policy, evaluator);
    check_unused(&mut checker, &policy);
    checker.finish(Some(policy.expires))
}

/// Decodes a bare policy or the payload of a policy envelope.
fn decode_policy(bytes: &[u8]) -> Result<Policy, ValidationIssue> {
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|err| {
        issue(
            CATEGORY_FILE,
            "",
            format!("invalid JSON: {err}"),
            "ensure the file is a JSON policy or envelope",
        )
    })?;
    let payload = if value.get("payload").is_some() && value.get("signatures").is_some() {
        let envelope: Envelope = serde_json::from_value(value).map_err(|err| {
            let message = format!("invalid envelope: {err}");
            issue(CATEGORY_FILE, "payload", message, "re-sign the policy")
        })?;
        envelope.payload
    } else {
        bytes.to_vec()
    };
    Policy::from_json(&payload).map_err(|err| {
        issue(CATEGORY_FILE, "", err.to_string(), "compare the document against the schema")
    })
}

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Checks the expiry and warns when it is close.
fn check_expiry(checker: &mut Checker, policy: &Policy, now: OffsetDateTime) {
    let expires = policy.expires.format(&Rfc3339).unwrap_or_default();
    if policy.expires <= now {
        checker.check(Err(issue(
            CATEGORY_EXPIRATION,
            "expires",
            format!("policy expired at {expires}"),
            "set a future expiry and re-sign the policy",
        )));
        return;
    }
    checker.check(Ok(()));
    if policy.expires - now < EXPIRY_WARNING_WINDOW {
        checker.warn(issue(
            CATEGORY_EXPIRATION,
            "expires",
            format!("policy expires soon ({expires})"),
            "plan a policy renewal",
        ));
    }
}

/// Checks one root or timestamp-authority bundle.
fn check_root(
    checker: &mut Checker,
    category: &str,
    location: &str,
    root: &Root,
    policy: &Policy,
    now: OffsetDateTime,
) {
    let certificate_location = format!("{location}.certificate");
    let certificate = match parse_certificate_pem(&root.certificate) {
        Ok(certificate) => {
            checker.check(Ok(()));
            certificate
        }
        Err(err) => {
            checker.check(Err(issue(
                category,
                certificate_location,
                err.to_string(),
                "embed a PEM-encoded certificate",
            )));
            return;
        }
    };
    checker.check(if is_ca(&certificate) {
        Ok(())
    } else {
        Err(issue(
            category,
            &certificate_location,
            "certificate is not a CA",
            "use a certificate with basicConstraints CA:TRUE",
        ))
    });
    let expiry = not_after(&certificate);
    checker.check(if expiry < now {
        Err(issue(
            category,
            &certificate_location,
            "certificate has expired",
            "rotate the root certificate",
        ))
    } else {
        Ok(())
    });
    checker.check(if expiry < policy.expires {
        Err(issue(
            category,
            &certificate_location,
            "certificate expires before the policy",
            "shorten the policy expiry or rotate the root certificate",
        ))
    } else {
        Ok(())
    });
    checker.check(verify_certificate_signature(&certificate, &certificate).map_err(|err| {
        issue(
            category,
            &certificate_location,
            format!("self-signature does not verify: {err}"),
            "use a self-signed root certificate",
        )
    }));
    for (index, pem) in root.intermediates.iter().enumerate() {
        checker.check(parse_certificates_pem(pem).map(|_| ()).map_err(|err| {
            issue(
                category,
                format!("{location}.intermediates[{index}]"),
                err.to_string(),
                "embed PEM-encoded intermediates",
            )
        }));
    }
}

/// Checks step structure, functionary references, and rule modules.
fn check_steps(checker: &mut Checker, policy: &Policy, evaluator: &dyn RuleEvaluator) {
    let mut unknown_upstream = false;
    for (key, step) in &policy.steps {
        let location = format!("steps.{key}");
        checker.check(if &step.name == key {
            Ok(())
        } else {
            Err(issue(
                CATEGORY_STEP,
                format!("{location}.name"),
                format!("step name {} does not match its key", step.name),
                "make the name match the key",
            ))
        });
        if step.functionaries.is_empty() {
            checker.warn(issue(
                CATEGORY_FUNCTIONARY,
                format!("{location}.functionaries"),
                "step has no functionaries",
                "add a public key or root functionary",
            ));
        }
        for (index, functionary) in step.functionaries.iter().enumerate() {
            let location = format!("{location}.functionaries[{index}]");
            checker.check(check_functionary_refs(
                policy,
                functionary.kind,
                &functionary.public_key_id,
                &functionary.cert_constraint.roots,
                &location,
            ));
        }
        for upstream in &step.artifacts_from {
            if !policy.steps.contains_key(upstream) {
                unknown_upstream = true;
                checker.warn(issue(
                    CATEGORY_STEP,
                    format!("{location}.artifactsFrom"),
                    format!("unknown step {upstream}"),
                    "reference a step defined in this policy",
                ));
            }
        }
        for (attestation_index, requirement) in step.attestations.iter().enumerate() {
            for (module_index, module) in requirement.rego_policies.iter().enumerate() {
                let module_location = format!(
                    "{location}.attestations[{attestation_index}].regopolicies[{module_index}]"
                );
                checker.check(evaluator.compile(std::slice::from_ref(module)).map_err(|err| {
                    issue(
                        CATEGORY_REGO,
                        module_location.clone(),
                        err.to_string(),
                        "fix the module so it parses and declares a package",
                    )
                }));
            }
        }
    }
    if !unknown_upstream {
        checker.check(step_order(policy).map(|_| ()).map_err(|err| {
            issue(CATEGORY_STEP, "steps", err.to_string(), "remove the artifactsFrom cycle")
        }));
    }
}

/// Checks that a functionary's references resolve.
fn check_functionary_refs(
    policy: &Policy,
    kind: FunctionaryKind,
    public_key_id: &str,
    roots: &[String],
    location: &str,
) -> Result<(), ValidationIssue> {
    match kind {
        FunctionaryKind::PublicKey if policy.public_keys.contains_key(public_key_id) => Ok(()),
        FunctionaryKind::PublicKey => Err(issue(
            CATEGORY_FUNCTIONARY,
            format!("{location}.publickeyid"),
            format!("unknown public key {public_key_id}"),
            "add the key under publickeys",
        )),
        FunctionaryKind::Root if roots.is_empty() => Err(issue(
            CATEGORY_FUNCTIONARY,
            format!("{location}.certconstraint.roots"),
            "root functionary lists no roots",
            "list root ids or \"*\"",
        )),
        FunctionaryKind::Root if roots.len() == 1 && roots[0] == WILDCARD => Ok(()),
        FunctionaryKind::Root => match roots.iter().find(|id| !policy.roots.contains_key(*id)) {
            Some(missing) => Err(issue(
                CATEGORY_FUNCTIONARY,
                format!("{location}.certconstraint.roots"),
                format!("unknown root {missing}"),
                "add the root under roots",
            )),
            None => Ok(()),
        },
    }
}

/// Warns about roots and keys no functionary references.
fn check_unused(checker: &mut Checker, policy: &Policy) {
    let mut roots = BTreeSet::new();
    let mut keys = BTreeSet::new();
    let mut wildcard = false;
    for functionary in policy.steps.values().flat_map(|step| &step.functionaries) {
        match functionary.kind {
            FunctionaryKind::PublicKey => {
                keys.insert(functionary.public_key_id.as_str());
            }
            FunctionaryKind::Root => {
                for id in &functionary.cert_constraint.roots {
                    wildcard |= id == WILDCARD;
                    roots.insert(id.as_str());
                }
            }
        }
    }
    if !wildcard {
        for id in policy.roots.keys().filter(|id| !roots.contains(id.as_str())) {
            checker.warn(issue(
                CATEGORY_ROOT,
                format!("roots.{id}"),
                "root is not referenced by any functionary",
                "remove it or reference it",
            ));
        }
    }
    for id in policy.public_keys.keys().filter(|id| !keys.contains(id.as_str())) {
        checker.warn(issue(
            CATEGORY_KEY,
            format!("publickeys.{id}"),
            "key is not referenced by any functionary",
            "remove it or reference it",
        ));
    }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders a report as human-readable text.
#[must_use]
pub fn render_text(report: &ValidationReport) -> String {
    let mut out = String::new();
    let status = if report.valid { "PASSED" } else { "FAILED" };
    let _ = writeln!(out, "Policy validation: {status}");
    let _ = writeln!(out, "Checks passed: {}/{}", report.checks_passed, report.checks_performed);
    let expires = report.policy_expiration.and_then(|expires| expires.format(&Rfc3339).ok());
    if let Some(expires) = expires {
        let _ = writeln!(out, "Policy expires: {expires}");
    }
    for (title, issues) in [("Errors", &report.errors), ("Warnings", &report.warnings)] {
        if issues.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{title}:");
        for item in issues {
            let location = if item.location.is_empty() {
                String::new()
            } else {
                format!(" {}", item.location)
            };
            let _ = writeln!(out, "  [{}]{location}: {}", item.category, item.message);
            let _ = writeln!(out, "    suggestion: {}", item.suggestion);
        }
    }
    out
}

#[cfg(test)]
mod tests;
