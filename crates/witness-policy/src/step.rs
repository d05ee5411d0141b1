// crates/witness-policy/src/step.rs
// ============================================================================
// Module: Step Verifier
// Description: Functionary, presence, and rule checks for one step.
// Purpose: Sort a step's candidate envelopes into accepted and rejected,
//          recording why each rejection happened.
// Dependencies: serde_json, thiserror, time, witness-core
// ============================================================================

//! ## Overview
//! A candidate envelope is accepted for a step when, in order:
//! 1. some signature satisfies some functionary of the step;
//! 2. every required attestation type is present in its collection;
//! 3. every rule module attached to a requirement returns no deny reasons.
//!
//! The first failing check becomes the rejection reason. All chain, expiry,
//! and timestamp checks use the verifier's single `now`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;
use time::OffsetDateTime;
use witness_core::Collection;
use witness_core::DigestSet;
use witness_core::Envelope;
use witness_core::Statement;
use witness_core::Verifier;
use witness_core::attestation::collection::COLLECTION_TYPE;
use witness_core::crypto::KeyVerifier;
use witness_core::envelope;
use witness_core::envelope::INTOTO_PAYLOAD_TYPE;
use witness_core::envelope::VerifyOptions;
use witness_core::envelope::timestamp::Rfc3161TimestampVerifier;
use witness_core::envelope::timestamp::TimestampVerifier;

use crate::error::PolicyError;
use crate::model::Functionary;
use crate::model::FunctionaryKind;
use crate::model::Policy;
use crate::model::Step;
use crate::model::TrustBundle;
use crate::rules::RuleEvaluator;

// ============================================================================
// SECTION: Candidates
// ============================================================================

/// Reasons an envelope cannot be considered for any step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandidateError {
    /// The envelope does not carry an in-toto statement.
    #[error("unexpected payload type {0}")]
    PayloadType(String),
    /// The statement does not decode.
    #[error("invalid statement: {0}")]
    Statement(String),
    /// The statement does not carry a collection.
    #[error("unexpected predicate type {0}")]
    PredicateType(String),
    /// The collection or its artifact payloads do not decode.
    #[error("invalid collection: {0}")]
    Collection(String),
}

/// Decoded envelope offered to a step.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Position of the envelope in the verifier's input.
    pub index: usize,
    /// Original envelope.
    pub envelope: Envelope,
    /// Decoded statement.
    pub statement: Statement,
    /// Decoded collection.
    pub collection: Collection,
    /// Material map of the collection.
    pub materials: BTreeMap<String, DigestSet>,
    /// Product map of the collection.
    pub products: BTreeMap<String, DigestSet>,
}

impl Candidate {
    /// Decodes an envelope into a candidate.
    ///
    /// # Errors
    ///
    /// Returns [`CandidateError`] when the payload is not a collection
    /// statement.
    pub fn decode(index: usize, envelope: Envelope) -> Result<Self, CandidateError> {
        if envelope.payload_type != INTOTO_PAYLOAD_TYPE {
            return Err(CandidateError::PayloadType(envelope.payload_type));
        }
        let statement = Statement::from_json(&envelope.payload)
            .map_err(|err| CandidateError::Statement(err.to_string()))?;
        if statement.predicate_type != COLLECTION_TYPE {
            return Err(CandidateError::PredicateType(statement.predicate_type));
        }
        let collection: Collection = serde_json::from_value(statement.predicate.clone())
            .map_err(|err| CandidateError::Collection(err.to_string()))?;
        let materials =
            collection.materials().map_err(|err| CandidateError::Collection(err.to_string()))?;
        let products = collection
            .products()
            .map_err(|err| CandidateError::Collection(err.to_string()))?
            .into_iter()
            .map(|(path, product)| (path, product.digest))
            .collect();
        Ok(Self {
            index,
            envelope,
            statement,
            collection,
            materials,
            products,
        })
    }

    /// Returns the step name the collection claims.
    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.collection.name
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Rejected candidate with its reason.
#[derive(Debug, Clone)]
pub struct Rejection {
    /// Position of the envelope in the verifier's input.
    pub index: usize,
    /// Collection name.
    pub collection: String,
    /// Why the candidate was rejected.
    pub reason: PolicyError,
}

/// Outcome of verifying one step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Step name.
    pub step: String,
    /// Accepted candidates in input order.
    pub passed: Vec<Candidate>,
    /// Rejected candidates in input order.
    pub rejected: Vec<Rejection>,
}

impl StepResult {
    /// Returns true when at least one candidate was accepted.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        !self.passed.is_empty()
    }

    /// Returns the failure that explains an empty acceptance set.
    #[must_use]
    pub fn failure(&self) -> Option<PolicyError> {
        if self.is_passed() {
            return None;
        }
        Some(self.rejected.first().map_or_else(
            || PolicyError::NoAttestations {
                step: self.step.clone(),
            },
            |rejection| rejection.reason.clone(),
        ))
    }
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Verifies candidates against steps of one policy at one instant.
pub struct StepVerifier<'a> {
    /// Parsed trust bundles.
    bundles: BTreeMap<String, TrustBundle>,
    /// Parsed public keys.
    keys: BTreeMap<String, KeyVerifier>,
    /// Timestamp verifiers for the policy's authorities.
    timestamp_verifiers: Vec<Rfc3161TimestampVerifier>,
    /// Rule runtime.
    evaluator: &'a dyn RuleEvaluator,
    /// Single clock sample.
    now: OffsetDateTime,
}

impl<'a> StepVerifier<'a> {
    /// Resolves the policy's trust material.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Invalid`] when a root, key, or authority does
    /// not parse or a key id does not match.
    pub fn new(
        policy: &Policy,
        evaluator: &'a dyn RuleEvaluator,
        now: OffsetDateTime,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            bundles: policy.trust_bundles()?,
            keys: policy.key_verifiers()?,
            timestamp_verifiers: policy.timestamp_verifiers()?,
            evaluator,
            now,
        })
    }

    /// Returns the verification instant.
    #[must_use]
    pub const fn now(&self) -> OffsetDateTime {
        self.now
    }

    /// Sorts candidates into accepted and rejected for a step.
    #[must_use]
    pub fn verify_step(&self, step: &Step, candidates: &[&Candidate]) -> StepResult {
        let mut result = StepResult {
            step: step.name.clone(),
            passed: Vec::new(),
            rejected: Vec::new(),
        };
        for candidate in candidates {
            match self.verify(step, candidate) {
                Ok(()) => result.passed.push((*candidate).clone()),
                Err(reason) => result.rejected.push(Rejection {
                    index: candidate.index,
                    collection: candidate.collection.name.clone(),
                    reason,
                }),
            }
        }
        result
    }

    /// Runs the three step checks on one candidate.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a [`PolicyError`].
    pub fn verify(&self, step: &Step, candidate: &Candidate) -> Result<(), PolicyError> {
        self.match_functionaries(step, &candidate.envelope)?;
        check_presence(step, &candidate.collection)?;
        self.evaluate_rules(step, &candidate.collection)
    }

    /// Accepts the envelope when any signature satisfies any functionary.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::FunctionaryMismatch`] with every reason.
    pub fn match_functionaries(&self, step: &Step, envelope: &Envelope) -> Result<(), PolicyError> {
        let mut reasons = Vec::new();
        for functionary in &step.functionaries {
            match self.match_functionary(functionary, envelope) {
                Ok(()) => return Ok(()),
                Err(reason) => reasons.push(reason),
            }
        }
        if reasons.is_empty() {
            reasons.push("step has no functionaries".to_string());
        }
        Err(PolicyError::FunctionaryMismatch {
            step: step.name.clone(),
            reason: reasons.join("; "),
        })
    }

    /// Checks one functionary against the envelope signatures.
    fn match_functionary(
        &self,
        functionary: &Functionary,
        envelope: &Envelope,
    ) -> Result<(), String> {
        let timestamp_verifiers: Vec<&dyn TimestampVerifier> = self
            .timestamp_verifiers
            .iter()
            .map(|verifier| verifier as &dyn TimestampVerifier)
            .collect();
        match functionary.kind {
            FunctionaryKind::PublicKey => {
                let key = self
                    .keys
                    .get(&functionary.public_key_id)
                    .ok_or_else(|| format!("unknown public key {}", functionary.public_key_id))?;
                let mut options = VerifyOptions::new(vec![key as &dyn Verifier], self.now);
                options.timestamp_verifiers = timestamp_verifiers;
                envelope::verify(envelope, &options)
                    .map(|_| ())
                    .map_err(|err| format!("public key {}: {err}", functionary.public_key_id))
            }
            FunctionaryKind::Root => {
                let constraint = &functionary.cert_constraint;
                let admitted = constraint.admitted_roots(&self.bundles);
                let mut options = VerifyOptions::new(Vec::new(), self.now);
                options.timestamp_verifiers = timestamp_verifiers;
                for id in &admitted {
                    if let Some(bundle) = self.bundles.get(*id) {
                        options.roots.push(bundle.root.clone());
                        options.intermediates.extend(bundle.intermediates.iter().cloned());
                    }
                }
                if options.roots.is_empty() {
                    return Err("constraint:roots".to_string());
                }
                let passed = envelope::verify(envelope, &options).map_err(|err| err.to_string())?;
                let mut violations = Vec::new();
                for signature in passed {
                    let Some(certificate) = signature.certificate else {
                        continue;
                    };
                    match constraint.check(&certificate, &self.bundles) {
                        Ok(_) => return Ok(()),
                        Err(violation) => violations.push(violation.to_string()),
                    }
                }
                if violations.is_empty() {
                    violations.push("no certificate-bearing signature".to_string());
                }
                Err(violations.join("; "))
            }
        }
    }

    /// Evaluates rule modules against their attestation payloads.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Denied`] with every reason, or
    /// [`PolicyError::Rules`] when evaluation fails.
    pub fn evaluate_rules(&self, step: &Step, collection: &Collection) -> Result<(), PolicyError> {
        let index = collection.by_type();
        let mut reasons = Vec::new();
        for requirement in &step.attestations {
            if requirement.rego_policies.is_empty() {
                continue;
            }
            let Some(document) = index.get(requirement.type_uri.as_str()) else {
                continue;
            };
            reasons.extend(self.evaluator.evaluate(&requirement.rego_policies, document)?);
        }
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::Denied {
                step: step.name.clone(),
                reasons,
            })
        }
    }
}

/// Requires every attestation type the step names.
///
/// # Errors
///
/// Returns [`PolicyError::MissingAttestation`] for the first absent type.
pub fn check_presence(step: &Step, collection: &Collection) -> Result<(), PolicyError> {
    let index = collection.by_type();
    let missing = step
        .attestations
        .iter()
        .find(|requirement| !index.contains_key(requirement.type_uri.as_str()));
    match missing {
        Some(missing) => Err(PolicyError::MissingAttestation {
            step: step.name.clone(),
            type_uri: missing.type_uri.clone(),
        }),
        None => Ok(()),
    }
}
