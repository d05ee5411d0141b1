// crates/witness-policy/src/constraint.rs
// ============================================================================
// Module: Certificate Constraints
// Description: Attribute and trust-bundle matching for X.509 functionaries.
// Purpose: Decide whether a verified leaf certificate satisfies a step's
//          certificate constraint.
// Dependencies: thiserror, witness-core
// ============================================================================

//! ## Overview
//! Each attribute (common name, DNS names, emails, organizations, URIs) is
//! compared as a set:
//! - a constraint of exactly `["*"]` accepts any observed values;
//! - an empty constraint accepts only an empty observation;
//! - otherwise the observed and constrained sets must be equal.
//!
//! A lone empty string on either side counts as empty. Failures are collected
//! per attribute as `constraint:<attribute>` rather than stopping at the
//! first.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;
use witness_core::crypto::CertificateIdentity;
use witness_core::crypto::X509Verifier;

use crate::model::CertConstraint;
use crate::model::TrustBundle;
use crate::model::WILDCARD;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Aggregated constraint failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("certificate constraint violated: {}", failures.join(", "))]
pub struct ConstraintViolation {
    /// Failed attributes as `constraint:<attribute>`.
    pub failures: Vec<String>,
}

// ============================================================================
// SECTION: Attribute Matching
// ============================================================================

/// Returns true when the observed values satisfy the constraint list.
#[must_use]
pub fn check_attribute(constraint: &[String], observed: &[String]) -> bool {
    let constraint = normalize(constraint);
    let observed = normalize(observed);
    if constraint.len() == 1 && constraint[0] == WILDCARD {
        return true;
    }
    if constraint.is_empty() {
        return observed.is_empty();
    }
    let wanted: BTreeSet<&str> = constraint.iter().map(String::as_str).collect();
    let seen: BTreeSet<&str> = observed.iter().map(String::as_str).collect();
    wanted == seen
}

/// Treats a lone empty string as an empty list.
fn normalize(values: &[String]) -> &[String] {
    if values.len() == 1 && values[0].is_empty() { &[] } else { values }
}

impl CertConstraint {
    /// Returns the failed attributes for an identity.
    #[must_use]
    pub fn attribute_failures(&self, identity: &CertificateIdentity) -> Vec<String> {
        let common_name = vec![self.common_name.clone()];
        let checks: [(&str, &[String], &[String]); 5] = [
            ("commonname", &common_name, &identity.common_names),
            ("dnsname", &self.dns_names, &identity.dns_names),
            ("email", &self.emails, &identity.emails),
            ("organization", &self.organizations, &identity.organizations),
            ("uri", &self.uris, &identity.uris),
        ];
        checks
            .iter()
            .filter(|(_, constraint, observed)| !check_attribute(constraint, observed))
            .map(|(attribute, _, _)| format!("constraint:{attribute}"))
            .collect()
    }

    /// Returns the bundle ids this constraint admits.
    #[must_use]
    pub fn admitted_roots<'a>(
        &'a self,
        bundles: &'a BTreeMap<String, TrustBundle>,
    ) -> Vec<&'a str> {
        if self.roots.len() == 1 && self.roots[0] == WILDCARD {
            return bundles.keys().map(String::as_str).collect();
        }
        self.roots
            .iter()
            .filter(|id| bundles.contains_key(*id))
            .map(String::as_str)
            .collect()
    }

    /// Checks a signature's certificate against the trust bundles and the
    /// attribute constraints.
    ///
    /// Returns the id of the first admitted bundle the chain builds against.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintViolation`] listing every failed attribute, plus
    /// `constraint:roots` when no admitted bundle anchors the chain.
    pub fn check(
        &self,
        certificate: &X509Verifier,
        bundles: &BTreeMap<String, TrustBundle>,
    ) -> Result<String, ConstraintViolation> {
        let mut failures = self.attribute_failures(&certificate.identity());
        let anchored = self.admitted_roots(bundles).into_iter().find(|id| {
            bundles.get(*id).is_some_and(|bundle| {
                let mut intermediates = certificate.intermediates().to_vec();
                intermediates.extend(bundle.intermediates.iter().cloned());
                certificate
                    .with_trust(intermediates, vec![bundle.root.clone()])
                    .verify_chain()
                    .is_ok()
            })
        });
        if anchored.is_none() {
            failures.push("constraint:roots".to_string());
        }
        match anchored {
            Some(id) if failures.is_empty() => Ok(id.to_string()),
            _ => Err(ConstraintViolation {
                failures,
            }),
        }
    }
}

#[cfg(test)]
mod tests;
