// crates/witness-policy/src/lib.rs
// ============================================================================
// Module: Witness Policy
// Description: Policy model, verification, checking, and generation.
// Purpose: Decide whether a set of signed attestation collections satisfies
//          a multi-step supply-chain policy.
// Dependencies: witness-core, regorus, x509-cert
// ============================================================================

//! ## Overview
//! A [`Policy`] names the steps of a build, the functionaries allowed to sign
//! each step, the attestations each step must carry, and the upstream steps
//! whose products become a step's materials. [`PolicyVerifier`] evaluates
//! envelopes against a policy in dependency order; [`check_policy`] reports
//! structural problems without verifying anything; [`generate_policy`]
//! assembles a fresh policy from per-step flag bundles.
//! Invariants:
//! - Every verification reads the clock once and threads that instant
//!   through expiry, chain validity, and timestamp checks.
//! - Rule modules must compile before a policy is accepted.
//! - Failures carry a stable taxonomy tag (see [`PolicyError::tag`]).

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod check;
pub mod constraint;
pub mod error;
pub mod generate;
pub mod graph;
pub mod loader;
pub mod model;
pub mod rules;
pub mod step;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use check::ValidationReport;
pub use check::check_policy;
pub use constraint::ConstraintViolation;
pub use error::PolicyError;
pub use generate::GenerateOptions;
pub use generate::generate_policy;
pub use graph::PolicyVerifier;
pub use graph::SubjectDigest;
pub use graph::VerificationReport;
pub use loader::load_policy;
pub use loader::PolicyTrust;
pub use loader::open_policy;
pub use model::POLICY_TYPE;
pub use model::Policy;
pub use rules::RegoRuleEvaluator;
pub use rules::RuleEvaluator;
pub use step::StepResult;
pub use step::StepVerifier;

#[cfg(test)]
mod tests;
