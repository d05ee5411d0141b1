// crates/witness-policy/src/error.rs
// ============================================================================
// Module: Policy Errors
// Description: Policy failures with stable taxonomy tags.
// Purpose: Give verification callers one error type that names why a policy
//          rejected its inputs.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every variant maps onto one taxonomy tag through [`PolicyError::tag`].
//! Variants hold strings rather than foreign errors so results can be cloned
//! into per-step reports.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Policy loading and verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The policy expired before the verification instant.
    #[error("policy expired at {expires}")]
    Expired {
        /// Policy expiry (RFC 3339).
        expires: String,
    },
    /// The policy is malformed or internally inconsistent.
    #[error("invalid policy: {0}")]
    Invalid(String),
    /// The policy could not be read or fetched.
    #[error("failed to load policy: {0}")]
    Load(String),
    /// The policy envelope did not verify against the supplied trust.
    #[error("policy signature not trusted: {0}")]
    Untrusted(String),
    /// No signature matched any functionary of the step.
    #[error("step {step}: no functionary matched: {reason}")]
    FunctionaryMismatch {
        /// Step name.
        step: String,
        /// Aggregated mismatch reasons.
        reason: String,
    },
    /// A required attestation type is absent from the collection.
    #[error("step {step}: missing attestation {type_uri}")]
    MissingAttestation {
        /// Step name.
        step: String,
        /// Required attestation type URI.
        type_uri: String,
    },
    /// A rule module returned deny reasons.
    #[error("step {step}: denied by rules: {}", reasons.join("; "))]
    Denied {
        /// Step name.
        step: String,
        /// Deny reasons in module order.
        reasons: Vec<String>,
    },
    /// A rule module could not be evaluated.
    #[error("rule evaluation failed: {0}")]
    Rules(String),
    /// A material did not match the upstream product at the same path.
    #[error("step {step}: artifact-break({path})")]
    ArtifactBreak {
        /// Downstream step name.
        step: String,
        /// First offending material path.
        path: String,
    },
    /// No accepted envelope on a final step carries the target subject.
    #[error("subject not found on final step {step}")]
    SubjectNotFound {
        /// Final step name.
        step: String,
    },
    /// A step has no candidate envelopes at all.
    #[error("step {step}: no attestations found")]
    NoAttestations {
        /// Step name.
        step: String,
    },
}

impl PolicyError {
    /// Returns the taxonomy tag for this failure.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Expired {
                ..
            } => "policy-expired",
            Self::Invalid(_) | Self::Load(_) | Self::Rules(_) => "policy-invalid",
            Self::Untrusted(_)
            | Self::FunctionaryMismatch {
                ..
            } => "functionary-mismatch",
            Self::MissingAttestation {
                ..
            } => "missing-attestation",
            Self::Denied {
                ..
            } => "policy-denied",
            Self::ArtifactBreak {
                ..
            } => "artifact-break",
            Self::SubjectNotFound {
                ..
            } => "subject-not-found",
            Self::NoAttestations {
                ..
            } => "no-attestations",
        }
    }

    /// Returns true when the failure is a verification denial rather than a
    /// problem reading the policy.
    #[must_use]
    pub const fn is_denial(&self) -> bool {
        !matches!(self, Self::Load(_) | Self::Invalid(_) | Self::Rules(_))
    }
}
