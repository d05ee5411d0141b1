// crates/witness-policy/src/graph.rs
// ============================================================================
// Module: Artifact Graph Verifier
// Description: Dependency-ordered policy verification with artifact
//              continuity and subject binding.
// Purpose: Decide whether a set of envelopes satisfies a whole policy.
// Dependencies: time, witness-core
// ============================================================================

//! ## Overview
//! Steps are visited in Kahn order over `artifactsFrom`; a cycle makes the
//! policy invalid. Every step needs an accepted envelope. A step that takes
//! artifacts from upstream steps keeps only envelopes whose materials agree,
//! path by path, with the products of some accepted envelope of each
//! upstream step; materials no upstream step produced are not compared.
//! Finally, some accepted envelope of a final step (one nothing depends on)
//! must carry a subject whose digest equals a target subject.
//! Invariants:
//! - The caller samples the clock once; expiry, chains, and timestamps all
//!   use that instant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use witness_core::DigestSet;
use witness_core::Envelope;
use witness_core::LogEvent;
use witness_core::LogLevel;
use witness_core::LogSink;
use witness_core::logging::NoopLogSink;

use crate::error::PolicyError;
use crate::model::Policy;
use crate::rules::RuleEvaluator;
use crate::step::Candidate;
use crate::step::StepResult;
use crate::step::StepVerifier;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Target subject supplied by the verifier's caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectDigest {
    /// Optional label (artifact path or free-form subject).
    pub name: Option<String>,
    /// Expected digests.
    pub digest: DigestSet,
}

/// Successful verification outcome.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    /// Steps in verification order.
    pub order: Vec<String>,
    /// Per-step results after continuity pruning.
    pub steps: BTreeMap<String, StepResult>,
    /// Instant the verification used.
    pub verified_at: OffsetDateTime,
}

/// Verifies envelopes against a policy.
pub struct PolicyVerifier<'a> {
    /// Policy under verification.
    policy: &'a Policy,
    /// Rule runtime.
    evaluator: &'a dyn RuleEvaluator,
    /// Event sink for rejections and skips.
    log: &'a dyn LogSink,
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

/// Orders steps so upstream steps come first.
///
/// Ties are broken lexicographically.
///
/// # Errors
///
/// Returns [`PolicyError::Invalid`] on a cycle or an unknown upstream step.
pub fn step_order(policy: &Policy) -> Result<Vec<String>, PolicyError> {
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut downstream: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, step) in &policy.steps {
        indegree.entry(name.as_str()).or_insert(0);
        for upstream in &step.artifacts_from {
            if !policy.steps.contains_key(upstream) {
                return Err(PolicyError::Invalid(format!(
                    "step {name} takes artifacts from unknown step {upstream}"
                )));
            }
            *indegree.entry(name.as_str()).or_insert(0) += 1;
            downstream.entry(upstream.as_str()).or_default().push(name.as_str());
        }
    }

    let mut ready: VecDeque<&str> =
        indegree.iter().filter(|(_, degree)| **degree == 0).map(|(name, _)| *name).collect();
    let mut order = Vec::with_capacity(indegree.len());
    while let Some(name) = ready.pop_front() {
        order.push(name.to_string());
        let mut released = Vec::new();
        for next in downstream.get(name).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = indegree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    released.push(*next);
                }
            }
        }
        released.sort_unstable();
        ready.extend(released);
    }
    if order.len() != policy.steps.len() {
        let stuck: Vec<&str> =
            indegree.iter().filter(|(_, degree)| **degree > 0).map(|(name, _)| *name).collect();
        return Err(PolicyError::Invalid(format!(
            "artifactsFrom forms a cycle through {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

/// Returns the steps no other step takes artifacts from.
#[must_use]
pub fn final_steps(policy: &Policy) -> Vec<String> {
    let upstream: BTreeSet<&str> = policy
        .steps
        .values()
        .flat_map(|step| step.artifacts_from.iter().map(String::as_str))
        .collect();
    policy.steps.keys().filter(|name| !upstream.contains(name.as_str())).cloned().collect()
}

// ============================================================================
// SECTION: Continuity
// ============================================================================

/// Compares materials with upstream products by path.
///
/// # Errors
///
/// Returns the first material path whose digests disagree with the upstream
/// product at the same path.
pub fn check_continuity(
    materials: &BTreeMap<String, DigestSet>,
    products: &BTreeMap<String, DigestSet>,
) -> Result<(), String> {
    for (path, material) in materials {
        if let Some(product) = products.get(path)
            && !material.equal(product)
        {
            return Err(path.clone());
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Verification
// ============================================================================

impl<'a> PolicyVerifier<'a> {
    /// Creates a verifier without logging.
    #[must_use]
    pub fn new(policy: &'a Policy, evaluator: &'a dyn RuleEvaluator) -> Self {
        Self {
            policy,
            evaluator,
            log: &NoopLogSink,
        }
    }

    /// Routes rejection and skip events to a sink.
    #[must_use]
    pub fn with_log_sink(mut self, log: &'a dyn LogSink) -> Self {
        self.log = log;
        self
    }

    /// Verifies envelopes against the policy at `now`.
    ///
    /// # Errors
    ///
    /// Returns the first failure in this order: expiry, structure, rule
    /// compilation, per-step acceptance in dependency order, artifact
    /// continuity, subject presence.
    pub fn verify(
        &self,
        envelopes: &[Envelope],
        subjects: &[SubjectDigest],
        now: OffsetDateTime,
    ) -> Result<VerificationReport, PolicyError> {
        if now > self.policy.expires {
            return Err(PolicyError::Expired {
                expires: self.policy.expires.format(&Rfc3339).unwrap_or_default(),
            });
        }
        self.policy.validate()?;
        for step in self.policy.steps.values() {
            for requirement in &step.attestations {
                self.evaluator.compile(&requirement.rego_policies)?;
            }
        }
        let order = step_order(self.policy)?;
        let verifier = StepVerifier::new(self.policy, self.evaluator, now)?;
        let candidates = self.decode_candidates(envelopes);

        let mut steps: BTreeMap<String, StepResult> = BTreeMap::new();
        for name in &order {
            let Some(step) = self.policy.steps.get(name) else {
                continue;
            };
            let offered: Vec<&Candidate> =
                candidates.iter().filter(|candidate| candidate.step_name() == name).collect();
            let mut result = verifier.verify_step(step, &offered);
            for rejection in &result.rejected {
                self.log.record(
                    &LogEvent::new(
                        "collection_rejected",
                        LogLevel::Warn,
                        "policy",
                        format!("step {name}: {}", rejection.reason),
                    )
                    .with_field("step", name.clone())
                    .with_field("envelope", rejection.index)
                    .with_field("tag", rejection.reason.tag()),
                );
            }
            if let Some(failure) = result.failure() {
                return Err(failure);
            }
            if !step.artifacts_from.is_empty() {
                result = retain_continuous(result, &step.artifacts_from, &steps)?;
            }
            let message = format!("step {name} passed");
            self.log.record(
                &LogEvent::new("step_verified", LogLevel::Info, "policy", message)
                    .with_field("step", name.clone())
                    .with_field("accepted", result.passed.len()),
            );
            steps.insert(name.clone(), result);
        }

        check_subjects(&final_steps(self.policy), &steps, subjects)?;
        Ok(VerificationReport {
            order,
            steps,
            verified_at: now,
        })
    }

    /// Decodes envelopes, skipping those that are not collections.
    fn decode_candidates(&self, envelopes: &[Envelope]) -> Vec<Candidate> {
        let mut candidates = Vec::with_capacity(envelopes.len());
        for (index, envelope) in envelopes.iter().enumerate() {
            match Candidate::decode(index, envelope.clone()) {
                Ok(candidate) if self.policy.steps.contains_key(candidate.step_name()) => {
                    candidates.push(candidate);
                }
                Ok(candidate) => {
                    self.skip(index, &format!("no step named {}", candidate.step_name()));
                }
                Err(err) => self.skip(index, &err.to_string()),
            }
        }
        candidates
    }

    /// Logs a skipped envelope.
    fn skip(&self, index: usize, reason: &str) {
        self.log.record(
            &LogEvent::new("envelope_skipped", LogLevel::Debug, "policy", reason.to_string())
                .with_field("envelope", index),
        );
    }
}

/// Drops accepted candidates whose materials break continuity.
fn retain_continuous(
    mut result: StepResult,
    upstream_steps: &[String],
    accepted: &BTreeMap<String, StepResult>,
) -> Result<StepResult, PolicyError> {
    let mut first_break = None;
    result.passed.retain(|candidate| {
        for upstream in upstream_steps {
            let producers =
                accepted.get(upstream).map(|result| result.passed.as_slice()).unwrap_or_default();
            let mut broken = None;
            let continuous = producers.iter().any(|producer| {
                match check_continuity(&candidate.materials, &producer.products) {
                    Ok(()) => true,
                    Err(path) => {
                        broken.get_or_insert(path);
                        false
                    }
                }
            });
            if !continuous {
                if first_break.is_none() {
                    first_break = broken.or_else(|| Some(String::new()));
                }
                return false;
            }
        }
        true
    });
    if result.passed.is_empty() {
        return Err(PolicyError::ArtifactBreak {
            step: result.step,
            path: first_break.unwrap_or_default(),
        });
    }
    Ok(result)
}

/// Requires a target subject on some final step's accepted envelope.
fn check_subjects(
    finals: &[String],
    steps: &BTreeMap<String, StepResult>,
    subjects: &[SubjectDigest],
) -> Result<(), PolicyError> {
    let found = finals.iter().filter_map(|name| steps.get(name)).any(|result| {
        result.passed.iter().any(|candidate| {
            candidate.statement.subject.iter().any(|subject| {
                subjects.iter().any(|target| target.digest.equal(&subject.digest))
            })
        })
    });
    if found {
        Ok(())
    } else {
        Err(PolicyError::SubjectNotFound {
            step: finals.join(","),
        })
    }
}
