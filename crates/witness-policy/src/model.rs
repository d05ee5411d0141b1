// crates/witness-policy/src/model.rs
// ============================================================================
// Module: Policy Model
// Description: Serde model of policy documents and their trust material.
// Purpose: Decode policies from JSON and resolve roots, keys, and timestamp
//          authorities into verifiers.
// Dependencies: serde, serde_json, time, witness-core, x509-cert
// ============================================================================

//! ## Overview
//! Byte fields (certificates, keys, rule modules) are base64 on the wire.
//! Step and trust maps are keyed by identifier; iteration order is
//! lexicographic. [`Policy::validate`] enforces the structural invariants:
//! every functionary reference resolves and every step key matches its name.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use witness_core::core::encoding::base64_bytes;
use witness_core::core::encoding::base64_bytes_list;
use witness_core::crypto::KeyVerifier;
use witness_core::crypto::PublicKey;
use witness_core::crypto::x509::parse_certificate_pem;
use witness_core::crypto::x509::parse_certificates_pem;
use witness_core::envelope::timestamp::Rfc3161TimestampVerifier;
use x509_cert::Certificate;

use crate::error::PolicyError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Predicate type of signed policies.
pub const POLICY_TYPE: &str = "https://witness.testifysec.com/policy/v0.1";

/// Wildcard token accepted by constraint fields.
pub const WILDCARD: &str = "*";

// ============================================================================
// SECTION: Document Types
// ============================================================================

/// Policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Expiry instant.
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
    /// Trust bundles keyed by identifier.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub roots: BTreeMap<String, Root>,
    /// Public keys keyed by identifier.
    #[serde(rename = "publickeys", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub public_keys: BTreeMap<String, PolicyPublicKey>,
    /// Timestamp authority bundles keyed by identifier.
    #[serde(rename = "timestampauthorities", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub timestamp_authorities: BTreeMap<String, Root>,
    /// Steps keyed by name.
    pub steps: BTreeMap<String, Step>,
}

/// Root certificate plus ordered intermediates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    /// Root certificate PEM.
    #[serde(with = "base64_bytes")]
    pub certificate: Vec<u8>,
    /// Intermediate certificate PEMs.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes_list")]
    pub intermediates: Vec<Vec<u8>>,
}

/// Public key entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPublicKey {
    /// Declared key identifier.
    #[serde(rename = "keyid")]
    pub key_id: String,
    /// Public key PEM.
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
}

/// One build step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Step name; matches the collection name of its attestations.
    pub name: String,
    /// Identities allowed to sign this step.
    #[serde(default)]
    pub functionaries: Vec<Functionary>,
    /// Attestations this step must carry.
    #[serde(default)]
    pub attestations: Vec<AttestationRequirement>,
    /// Upstream steps whose products become this step's materials.
    #[serde(rename = "artifactsFrom", default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts_from: Vec<String>,
}

/// Functionary kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionaryKind {
    /// Raw public key referenced by id.
    #[serde(rename = "publickey")]
    PublicKey,
    /// X.509 identity under one or more trust bundles.
    Root,
}

/// Identity allowed to sign a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Functionary {
    /// Functionary kind.
    #[serde(rename = "type")]
    pub kind: FunctionaryKind,
    /// Certificate constraint for root functionaries.
    #[serde(rename = "certConstraint", default, skip_serializing_if = "CertConstraint::is_empty")]
    pub cert_constraint: CertConstraint,
    /// Public key id for key functionaries.
    #[serde(rename = "publickeyid", default, skip_serializing_if = "String::is_empty")]
    pub public_key_id: String,
}

/// X.509 attribute constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertConstraint {
    /// Required common name.
    #[serde(rename = "commonname", default)]
    pub common_name: String,
    /// Required DNS SANs.
    #[serde(rename = "dnsnames", default)]
    pub dns_names: Vec<String>,
    /// Required email SANs.
    #[serde(default)]
    pub emails: Vec<String>,
    /// Required organizations.
    #[serde(default)]
    pub organizations: Vec<String>,
    /// Required URI SANs.
    #[serde(default)]
    pub uris: Vec<String>,
    /// Trust bundle ids, or the wildcard.
    #[serde(default)]
    pub roots: Vec<String>,
}

impl CertConstraint {
    /// Returns true when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Required attestation type with optional rule modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRequirement {
    /// Attestation type URI.
    #[serde(rename = "type")]
    pub type_uri: String,
    /// Rule modules evaluated against the attestation payload.
    #[serde(rename = "regopolicies", default)]
    pub rego_policies: Vec<RegoModule>,
}

/// Named rule module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegoModule {
    /// Module name.
    pub name: String,
    /// Module source.
    #[serde(with = "base64_bytes")]
    pub module: Vec<u8>,
}

// ============================================================================
// SECTION: Resolved Trust
// ============================================================================

/// Parsed trust bundle.
#[derive(Debug, Clone)]
pub struct TrustBundle {
    /// Root certificate.
    pub root: Certificate,
    /// Intermediate certificates.
    pub intermediates: Vec<Certificate>,
}

impl TrustBundle {
    /// Parses a root definition.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Invalid`] when a PEM does not parse.
    pub fn from_root(id: &str, root: &Root) -> Result<Self, PolicyError> {
        let certificate = parse_certificate_pem(&root.certificate)
            .map_err(|err| PolicyError::Invalid(format!("root {id}: {err}")))?;
        let mut intermediates = Vec::new();
        for pem in &root.intermediates {
            intermediates.extend(
                parse_certificates_pem(pem)
                    .map_err(|err| PolicyError::Invalid(format!("root {id} intermediate: {err}")))?,
            );
        }
        Ok(Self {
            root: certificate,
            intermediates,
        })
    }
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl Policy {
    /// Decodes a policy document.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Invalid`] when the JSON does not match the model.
    pub fn from_json(bytes: &[u8]) -> Result<Self, PolicyError> {
        serde_json::from_slice(bytes).map_err(|err| PolicyError::Invalid(err.to_string()))
    }

    /// Encodes the policy as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Invalid`] when serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, PolicyError> {
        serde_json::to_vec_pretty(self).map_err(|err| PolicyError::Invalid(err.to_string()))
    }

    /// Checks that step keys match names and every reference resolves.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Invalid`] naming the first broken reference.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (key, step) in &self.steps {
            if &step.name != key {
                return Err(PolicyError::Invalid(format!(
                    "step key {key} does not match step name {}",
                    step.name
                )));
            }
            for upstream in &step.artifacts_from {
                if !self.steps.contains_key(upstream) {
                    return Err(PolicyError::Invalid(format!(
                        "step {key} takes artifacts from unknown step {upstream}"
                    )));
                }
            }
            for functionary in &step.functionaries {
                self.validate_functionary(key, functionary)?;
            }
        }
        Ok(())
    }

    /// Checks one functionary's references.
    fn validate_functionary(
        &self,
        step: &str,
        functionary: &Functionary,
    ) -> Result<(), PolicyError> {
        match functionary.kind {
            FunctionaryKind::PublicKey => {
                if !self.public_keys.contains_key(&functionary.public_key_id) {
                    return Err(PolicyError::Invalid(format!(
                        "step {step} references unknown public key {}",
                        functionary.public_key_id
                    )));
                }
            }
            FunctionaryKind::Root => {
                let roots = &functionary.cert_constraint.roots;
                if roots.is_empty() {
                    return Err(PolicyError::Invalid(format!(
                        "step {step} has a root functionary without roots"
                    )));
                }
                if roots.len() == 1 && roots[0] == WILDCARD {
                    return Ok(());
                }
                if let Some(missing) = roots.iter().find(|id| !self.roots.contains_key(*id)) {
                    return Err(PolicyError::Invalid(format!(
                        "step {step} references unknown root {missing}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parses every trust bundle.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Invalid`] when a certificate does not parse.
    pub fn trust_bundles(&self) -> Result<BTreeMap<String, TrustBundle>, PolicyError> {
        self.roots
            .iter()
            .map(|(id, root)| Ok((id.clone(), TrustBundle::from_root(id, root)?)))
            .collect()
    }

    /// Parses every public key and checks its declared identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Invalid`] when a key does not parse or its
    /// computed identifier differs from the declared one.
    pub fn key_verifiers(&self) -> Result<BTreeMap<String, KeyVerifier>, PolicyError> {
        let mut verifiers = BTreeMap::new();
        for (id, entry) in &self.public_keys {
            let key = parse_public_key(id, entry)?;
            verifiers.insert(id.clone(), KeyVerifier::new(key));
        }
        Ok(verifiers)
    }

    /// Builds one timestamp verifier per timestamp authority.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Invalid`] when a certificate does not parse.
    pub fn timestamp_verifiers(&self) -> Result<Vec<Rfc3161TimestampVerifier>, PolicyError> {
        self.timestamp_authorities
            .iter()
            .map(|(id, root)| {
                let bundle = TrustBundle::from_root(id, root)?;
                Ok(Rfc3161TimestampVerifier::new(vec![bundle.root], bundle.intermediates))
            })
            .collect()
    }
}

/// Parses a policy public key and checks the declared identifier.
///
/// # Errors
///
/// Returns [`PolicyError::Invalid`] on parse failure or identifier mismatch.
pub fn parse_public_key(id: &str, entry: &PolicyPublicKey) -> Result<PublicKey, PolicyError> {
    let text = std::str::from_utf8(&entry.key)
        .map_err(|err| PolicyError::Invalid(format!("public key {id}: {err}")))?;
    let key = PublicKey::from_pem(text)
        .map_err(|err| PolicyError::Invalid(format!("public key {id}: {err}")))?;
    let computed =
        key.key_id().map_err(|err| PolicyError::Invalid(format!("public key {id}: {err}")))?;
    if computed != entry.key_id {
        return Err(PolicyError::Invalid(format!(
            "public key {id}: key id mismatch (declared {}, computed {computed})",
            entry.key_id
        )));
    }
    Ok(key)
}
