// crates/witness-policy/src/loader.rs
// ============================================================================
// Module: Policy Loader
// Description: Policy lookup from disk or the archive, and policy signature
//              verification.
// Purpose: Produce a trusted [`Policy`] from a path or content address.
// Dependencies: serde_json, time, witness-core, x509-cert
// ============================================================================

//! ## Overview
//! [`load_policy`] tries `location` as a local path first. A file with `payload`
//! and `signatures` keys is a signed envelope; anything else is a bare policy
//! wrapped in an unsigned envelope. When no such file exists and an archive
//! is configured, `location` is downloaded as a gitoid. All failures are fatal.
//! [`open_policy`] then verifies the envelope against the caller's policy
//! keys or CA roots; only an unsigned envelope with `allow_unsigned` skips
//! the check.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde_json::Value;
use time::OffsetDateTime;
use witness_core::ArchiveStore;
use witness_core::Envelope;
use witness_core::Verifier;
use witness_core::envelope;
use witness_core::envelope::MAX_ENVELOPE_BYTES;
use witness_core::envelope::VerifyOptions;
use witness_core::envelope::timestamp::TimestampVerifier;
use x509_cert::Certificate;

use crate::error::PolicyError;
use crate::model::POLICY_TYPE;
use crate::model::Policy;

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads a policy envelope from a path or the archive.
///
/// # Errors
///
/// Returns [`PolicyError::Load`] when the file cannot be read or decoded,
/// or when it does not exist and the archive cannot supply it.
pub fn load_policy(
    location: &str,
    archive: Option<&dyn ArchiveStore>,
) -> Result<Envelope, PolicyError> {
    let path = Path::new(location);
    if path.exists() {
        return parse_policy_bytes(&read_bounded(path)?);
    }
    let Some(archive) = archive else {
        return Err(PolicyError::Load(format!(
            "{location}: no such file and no archive configured"
        )));
    };
    archive.download(location).map_err(|err| PolicyError::Load(format!("{location}: {err}")))
}

/// Decodes policy bytes as an envelope or a bare policy.
///
/// # Errors
///
/// Returns [`PolicyError::Load`] when the bytes are neither.
pub fn parse_policy_bytes(bytes: &[u8]) -> Result<Envelope, PolicyError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|err| PolicyError::Load(format!("invalid json: {err}")))?;
    let is_envelope = value.get("payload").is_some() && value.get("signatures").is_some();
    if is_envelope {
        return Envelope::from_json(bytes).map_err(|err| PolicyError::Load(err.to_string()));
    }
    Policy::from_json(bytes).map_err(|err| PolicyError::Load(err.to_string()))?;
    Ok(Envelope::unsigned(POLICY_TYPE, bytes.to_vec()))
}

/// Reads a policy file with the envelope size cap applied.
fn read_bounded(path: &Path) -> Result<Vec<u8>, PolicyError> {
    let file = File::open(path)
        .map_err(|err| PolicyError::Load(format!("{}: {err}", path.display())))?;
    let mut bytes = Vec::new();
    file.take(MAX_ENVELOPE_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|err| PolicyError::Load(format!("{}: {err}", path.display())))?;
    if !u64::try_from(bytes.len()).is_ok_and(|len| len <= MAX_ENVELOPE_BYTES) {
        return Err(PolicyError::Load(format!(
            "{}: exceeds size limit of {MAX_ENVELOPE_BYTES} bytes",
            path.display()
        )));
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Trust
// ============================================================================

/// Trust material for the policy envelope itself.
#[derive(Default)]
pub struct PolicyTrust<'a> {
    /// Policy signing keys.
    pub verifiers: Vec<&'a dyn Verifier>,
    /// Policy CA roots.
    pub roots: Vec<Certificate>,
    /// Policy CA intermediates.
    pub intermediates: Vec<Certificate>,
    /// Timestamp verifiers for policy signatures.
    pub timestamp_verifiers: Vec<&'a dyn TimestampVerifier>,
}

/// Verifies a policy envelope and decodes its policy.
///
/// # Errors
///
/// Returns [`PolicyError::Untrusted`] when the envelope is unsigned (and
/// `allow_unsigned` is off), when no trust is supplied, or when no signature
/// verifies; [`PolicyError::Invalid`] when the payload type is not
/// [`POLICY_TYPE`] or the payload is not a policy.
pub fn open_policy(
    policy_envelope: &Envelope,
    trust: PolicyTrust<'_>,
    allow_unsigned: bool,
    now: OffsetDateTime,
) -> Result<Policy, PolicyError> {
    if policy_envelope.payload_type != POLICY_TYPE {
        return Err(PolicyError::Invalid(format!(
            "unexpected payload type {}",
            policy_envelope.payload_type
        )));
    }
    if policy_envelope.signatures.is_empty() {
        if !allow_unsigned {
            return Err(PolicyError::Untrusted("policy is unsigned".to_string()));
        }
    } else {
        if trust.verifiers.is_empty() && trust.roots.is_empty() {
            return Err(PolicyError::Untrusted("no policy keys or CA roots supplied".to_string()));
        }
        let options = VerifyOptions {
            verifiers: trust.verifiers,
            roots: trust.roots,
            intermediates: trust.intermediates,
            timestamp_verifiers: trust.timestamp_verifiers,
            threshold: 1,
            now,
        };
        envelope::verify(policy_envelope, &options)
            .map_err(|err| PolicyError::Untrusted(err.to_string()))?;
    }
    Policy::from_json(&policy_envelope.payload)
}
