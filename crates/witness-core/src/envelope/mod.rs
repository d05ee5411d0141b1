// crates/witness-core/src/envelope/mod.rs
// ============================================================================
// Module: Envelope Codec
// Description: DSSE pre-authentication encoding, signing, and verification.
// Purpose: Wrap payloads in multi-signature envelopes bound to certificate
//          chains and timestamp tokens.
// Dependencies: serde, serde_json, time, crate::crypto
// ============================================================================

//! ## Overview
//! Signatures cover the pre-authentication encoding
//! `"DSSEv1" SP len(type) SP type SP len(body) SP body` with decimal ASCII
//! lengths. [`sign`] runs every signer in order and fails as a whole when any
//! signer fails. [`verify`] checks every signature against every verifier and
//! returns the checks that passed.
//!
//! Certificate-bearing signatures are validated at each verified timestamp
//! instant, or at the caller's single `now` sample when no timestamp verifiers
//! are configured.
//!
//! Security posture: envelopes are untrusted input; decoding rejects
//! envelopes without signatures.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod timestamp;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use x509_cert::Certificate;

use crate::core::encoding::base64_bytes;
use crate::core::encoding::base64_bytes_list;
use crate::crypto::CryptoError;
use crate::crypto::Signer;
use crate::crypto::Verifier;
use crate::crypto::X509Verifier;
use crate::crypto::x509::parse_certificate_pem;
use crate::envelope::timestamp::TimestampError;
use crate::envelope::timestamp::TimestampVerifier;
use crate::envelope::timestamp::Timestamper;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// PAE version prefix.
pub const PAE_PREFIX: &str = "DSSEv1";

/// Payload type for in-toto statements.
pub const INTOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// Maximum accepted envelope size on disk.
pub const MAX_ENVELOPE_BYTES: u64 = 16 * 1024 * 1024;

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Signed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Payload bytes (base64 on the wire).
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// Payload type URI.
    #[serde(rename = "payloadType")]
    pub payload_type: String,
    /// Signatures in signer order.
    pub signatures: Vec<Signature>,
}

/// One envelope signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Key identifier of the signing key.
    #[serde(rename = "keyid")]
    pub key_id: String,
    /// Signature bytes.
    #[serde(rename = "sig", with = "base64_bytes")]
    pub signature: Vec<u8>,
    /// Leaf certificate PEM, empty when the signer has none.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    pub certificate: Vec<u8>,
    /// Intermediate certificate PEMs, leaf-ward first.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes_list")]
    pub intermediates: Vec<Vec<u8>>,
    /// Timestamp tokens over the signature bytes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timestamps: Vec<SignatureTimestamp>,
}

/// Timestamp token attached to a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureTimestamp {
    /// Token kind.
    #[serde(rename = "type")]
    pub kind: TimestampKind,
    /// Token bytes.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Supported timestamp token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampKind {
    /// RFC 3161 timestamp protocol token.
    #[serde(rename = "tsp")]
    Tsp,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the envelope codec.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Envelope carries no signatures.
    #[error("envelope has no signatures")]
    NoSignatures,
    /// No signer was supplied.
    #[error("at least one signer is required")]
    NoSigners,
    /// No signature verified.
    #[error("no matching signatures: {0}")]
    NoMatchingSignatures(String),
    /// Fewer distinct keys verified than required.
    #[error("threshold not met: {verified} of {required} required signers verified")]
    ThresholdNotMet {
        /// Required distinct verified keys.
        required: usize,
        /// Distinct verified keys observed.
        verified: usize,
    },
    /// A signer failed.
    #[error("signing failed: {0}")]
    Signing(#[from] CryptoError),
    /// A timestamper failed.
    #[error("timestamping failed: {0}")]
    Timestamp(#[from] TimestampError),
    /// Envelope JSON could not be decoded or encoded.
    #[error("invalid envelope: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: PAE
// ============================================================================

/// Computes the DSSE pre-authentication encoding.
#[must_use]
pub fn pae(payload_type: &str, body: &[u8]) -> Vec<u8> {
    let header = format!(
        "{PAE_PREFIX} {} {payload_type} {} ",
        payload_type.len(),
        body.len()
    );
    let mut encoded = Vec::with_capacity(header.len() + body.len());
    encoded.extend_from_slice(header.as_bytes());
    encoded.extend_from_slice(body);
    encoded
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

impl Envelope {
    /// Decodes an envelope from JSON, rejecting envelopes without signatures.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] for malformed JSON or base64 and
    /// [`EnvelopeError::NoSignatures`] for empty signature lists.
    pub fn from_json(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Self =
            serde_json::from_slice(bytes).map_err(|err| EnvelopeError::Decode(err.to_string()))?;
        if envelope.signatures.is_empty() {
            return Err(EnvelopeError::NoSignatures);
        }
        Ok(envelope)
    }

    /// Encodes the envelope as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] when serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|err| EnvelopeError::Decode(err.to_string()))
    }

    /// Wraps a payload without signatures.
    #[must_use]
    pub fn unsigned(payload_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            payload,
            payload_type: payload_type.into(),
            signatures: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Signs a payload with every signer and attaches timestamp tokens.
///
/// # Errors
///
/// Returns [`EnvelopeError::NoSigners`] when `signers` is empty and the first
/// signer or timestamper failure otherwise. No partial envelope is returned.
pub fn sign(
    payload_type: &str,
    body: &[u8],
    signers: &[&dyn Signer],
    timestampers: &[&dyn Timestamper],
) -> Result<Envelope, EnvelopeError> {
    if signers.is_empty() {
        return Err(EnvelopeError::NoSigners);
    }
    let encoded = pae(payload_type, body);
    let mut signatures = Vec::with_capacity(signers.len());
    for signer in signers {
        let signature = signer.sign(&mut encoded.as_slice())?;
        let key_id = signer.key_id()?;
        let mut timestamps = Vec::with_capacity(timestampers.len());
        for timestamper in timestampers {
            timestamps.push(SignatureTimestamp {
                kind: TimestampKind::Tsp,
                data: timestamper.timestamp(&signature)?,
            });
        }
        let (certificate, intermediates) = signer
            .certificate_chain()
            .map(|chain| (chain.leaf_pem, chain.intermediates_pem))
            .unwrap_or_default();
        signatures.push(Signature {
            key_id,
            signature,
            certificate,
            intermediates,
            timestamps,
        });
    }
    Ok(Envelope {
        payload: body.to_vec(),
        payload_type: payload_type.to_string(),
        signatures,
    })
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Inputs for envelope verification.
pub struct VerifyOptions<'a> {
    /// Raw-key or certificate verifiers.
    pub verifiers: Vec<&'a dyn Verifier>,
    /// Trust roots for certificate-bearing signatures.
    pub roots: Vec<Certificate>,
    /// Extra intermediates for certificate-bearing signatures.
    pub intermediates: Vec<Certificate>,
    /// Timestamp verifiers.
    pub timestamp_verifiers: Vec<&'a dyn TimestampVerifier>,
    /// Minimum count of distinct verified key identifiers (0 behaves as 1).
    pub threshold: usize,
    /// Single clock sample for this verification.
    pub now: OffsetDateTime,
}

impl<'a> VerifyOptions<'a> {
    /// Creates options with the given verifiers and clock sample.
    #[must_use]
    pub const fn new(verifiers: Vec<&'a dyn Verifier>, now: OffsetDateTime) -> Self {
        Self {
            verifiers,
            roots: Vec::new(),
            intermediates: Vec::new(),
            timestamp_verifiers: Vec::new(),
            threshold: 1,
            now,
        }
    }
}

/// A signature that verified.
#[derive(Debug, Clone)]
pub struct PassedSignature {
    /// Index of the signature in the envelope.
    pub signature_index: usize,
    /// Key identifier of the verifying key.
    pub key_id: String,
    /// Certificate verifier, set when the signature verified through its
    /// embedded certificate.
    pub certificate: Option<X509Verifier>,
    /// Instants at which the signature was checked.
    pub instants: Vec<OffsetDateTime>,
}

/// Verifies an envelope and returns the passed signature checks.
///
/// # Errors
///
/// Returns [`EnvelopeError::NoSignatures`] for unsigned envelopes,
/// [`EnvelopeError::NoMatchingSignatures`] when nothing verified, and
/// [`EnvelopeError::ThresholdNotMet`] when too few distinct keys verified.
pub fn verify(
    envelope: &Envelope,
    options: &VerifyOptions<'_>,
) -> Result<Vec<PassedSignature>, EnvelopeError> {
    if envelope.signatures.is_empty() {
        return Err(EnvelopeError::NoSignatures);
    }
    let encoded = pae(&envelope.payload_type, &envelope.payload);
    let mut passed = Vec::new();
    let mut failures = Vec::new();

    for (index, signature) in envelope.signatures.iter().enumerate() {
        let instants = match signing_instants(signature, options) {
            Ok(instants) => instants,
            Err(reason) => {
                failures.push(format!("signature {index}: {reason}"));
                continue;
            }
        };

        if !signature.certificate.is_empty() {
            match verify_with_certificate(signature, &encoded, &instants, options) {
                Ok(verifier) => {
                    let key_id = verifier.key_id()?;
                    passed.push(PassedSignature {
                        signature_index: index,
                        key_id,
                        certificate: Some(verifier),
                        instants: instants.clone(),
                    });
                }
                Err(err) => failures.push(format!("signature {index} certificate: {err}")),
            }
        }

        for verifier in &options.verifiers {
            match verifier.verify(&mut encoded.as_slice(), &signature.signature) {
                Ok(()) => passed.push(PassedSignature {
                    signature_index: index,
                    key_id: verifier.key_id()?,
                    certificate: verifier.as_x509().cloned(),
                    instants: instants.clone(),
                }),
                Err(err) => {
                    let key_id = verifier.key_id().unwrap_or_default();
                    failures.push(format!("signature {index} key {key_id}: {err}"));
                }
            }
        }
    }

    if passed.is_empty() {
        return Err(EnvelopeError::NoMatchingSignatures(failures.join("; ")));
    }
    let distinct: BTreeSet<&str> = passed.iter().map(|check| check.key_id.as_str()).collect();
    let required = options.threshold.max(1);
    if distinct.len() < required {
        return Err(EnvelopeError::ThresholdNotMet {
            required,
            verified: distinct.len(),
        });
    }
    Ok(passed)
}

/// Returns the instants a signature is checked at.
///
/// Without timestamp verifiers this is the caller's `now`. With timestamp
/// verifiers, every token that verifies contributes its instant and at least
/// one must verify.
fn signing_instants(
    signature: &Signature,
    options: &VerifyOptions<'_>,
) -> Result<Vec<OffsetDateTime>, String> {
    if options.timestamp_verifiers.is_empty() {
        return Ok(vec![options.now]);
    }
    let mut instants = Vec::new();
    let mut errors = Vec::new();
    for token in &signature.timestamps {
        for verifier in &options.timestamp_verifiers {
            match verifier.verify(&token.data, &signature.signature) {
                Ok(instant) => instants.push(instant),
                Err(err) => errors.push(err.to_string()),
            }
        }
    }
    if instants.is_empty() {
        if errors.is_empty() {
            return Err("no timestamp tokens present".to_string());
        }
        return Err(format!("no timestamp verified: {}", errors.join("; ")));
    }
    Ok(instants)
}

/// Verifies a certificate-bearing signature at any of the given instants.
fn verify_with_certificate(
    signature: &Signature,
    encoded: &[u8],
    instants: &[OffsetDateTime],
    options: &VerifyOptions<'_>,
) -> Result<X509Verifier, CryptoError> {
    let leaf = parse_certificate_pem(&signature.certificate)?;
    let mut intermediates = Vec::new();
    for pem in &signature.intermediates {
        intermediates.push(parse_certificate_pem(pem)?);
    }
    intermediates.extend(options.intermediates.iter().cloned());
    let mut last_error = CryptoError::ChainDoesNotBuild("no signing instant".to_string());
    for instant in instants {
        let verifier = X509Verifier::new(
            leaf.clone(),
            intermediates.clone(),
            options.roots.clone(),
            *instant,
        )?;
        match verifier.verify(&mut &encoded[..], &signature.signature) {
            Ok(()) => return Ok(verifier),
            Err(err) => last_error = err,
        }
    }
    Err(last_error)
}
