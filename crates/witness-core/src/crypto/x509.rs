// crates/witness-core/src/crypto/x509.rs
// ============================================================================
// Module: X.509 Binding
// Description: Certificate-bound signers and chain-validating verifiers.
// Purpose: Bind signing keys to certificate chains and validate those chains
//          against trust roots at a single captured instant.
// Dependencies: x509-cert, time, crate::crypto
// ============================================================================

//! ## Overview
//! [`X509Verifier`] validates `leaf -> intermediates* -> root` at the instant
//! captured when it was constructed, then delegates signature checks to the
//! leaf's key. Chain building matches issuer and subject names, verifies each
//! certificate signature with its issuer key, requires the CA flag on issuers,
//! and checks every certificate's validity window against the same instant.
//!
//! Security posture: certificates arrive from envelopes and policies and are
//! untrusted until a chain to a configured root is proven.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;

use time::OffsetDateTime;
use x509_cert::Certificate;
use x509_cert::der::DecodePem;
use x509_cert::der::Encode;
use x509_cert::der::EncodePem;
use x509_cert::der::asn1::Ia5StringRef;
use x509_cert::der::asn1::PrintableStringRef;
use x509_cert::der::asn1::Utf8StringRef;
use x509_cert::der::pem::LineEnding;
use x509_cert::ext::pkix::BasicConstraints;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;
use x509_cert::spki::ObjectIdentifier;

use crate::crypto::CryptoError;
use crate::crypto::KeyVerifier;
use crate::crypto::PublicKey;
use crate::crypto::SignatureScheme;
use crate::crypto::Signer;
use crate::crypto::Verifier;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum number of certificates walked while building a chain.
const MAX_CHAIN_DEPTH: usize = 8;

/// `commonName` attribute.
const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
/// `organizationName` attribute.
const OID_ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
/// `sha256WithRSAEncryption`.
const OID_RSA_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
/// `sha384WithRSAEncryption`.
const OID_RSA_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
/// `sha512WithRSAEncryption`.
const OID_RSA_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
/// `ecdsa-with-SHA256`.
const OID_ECDSA_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
/// `ecdsa-with-SHA384`.
const OID_ECDSA_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
/// `id-Ed25519`.
const OID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

// ============================================================================
// SECTION: Types
// ============================================================================

/// PEM-encoded certificate chain attached to a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    /// Leaf certificate PEM.
    pub leaf_pem: Vec<u8>,
    /// Intermediate certificate PEMs, leaf-ward first.
    pub intermediates_pem: Vec<Vec<u8>>,
}

/// Identity attributes observed on a leaf certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateIdentity {
    /// Subject common names.
    pub common_names: Vec<String>,
    /// SAN DNS names.
    pub dns_names: Vec<String>,
    /// SAN email addresses.
    pub emails: Vec<String>,
    /// Subject organizations.
    pub organizations: Vec<String>,
    /// SAN URIs.
    pub uris: Vec<String>,
}

// ============================================================================
// SECTION: Certificate Helpers
// ============================================================================

/// Parses one PEM certificate.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPem`] when the certificate cannot be decoded.
pub fn parse_certificate_pem(pem: &[u8]) -> Result<Certificate, CryptoError> {
    Certificate::from_pem(pem).map_err(|err| CryptoError::InvalidPem(err.to_string()))
}

/// Parses every certificate in a PEM bundle.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPem`] when any block fails to decode or the
/// bundle holds no certificates.
pub fn parse_certificates_pem(pem: &[u8]) -> Result<Vec<Certificate>, CryptoError> {
    let certificates =
        Certificate::load_pem_chain(pem).map_err(|err| CryptoError::InvalidPem(err.to_string()))?;
    if certificates.is_empty() {
        return Err(CryptoError::InvalidPem("no certificates found".to_string()));
    }
    Ok(certificates)
}

/// Encodes a certificate as PEM with LF line endings.
///
/// # Errors
///
/// Returns [`CryptoError::Encoding`] when encoding fails.
pub fn certificate_to_pem(certificate: &Certificate) -> Result<String, CryptoError> {
    certificate.to_pem(LineEnding::LF).map_err(|err| CryptoError::Encoding(err.to_string()))
}

/// Returns the public key carried by a certificate.
///
/// # Errors
///
/// Returns [`CryptoError::UnsupportedKeyType`] for unsupported algorithms.
pub fn certificate_public_key(certificate: &Certificate) -> Result<PublicKey, CryptoError> {
    let der = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|err| CryptoError::Encoding(err.to_string()))?;
    PublicKey::from_spki_der(&der)
}

/// Returns the certificate's `NotBefore` instant.
#[must_use]
pub fn not_before(certificate: &Certificate) -> OffsetDateTime {
    unix_to_datetime(certificate.tbs_certificate.validity.not_before.to_unix_duration().as_secs())
}

/// Returns the certificate's `NotAfter` instant.
#[must_use]
pub fn not_after(certificate: &Certificate) -> OffsetDateTime {
    unix_to_datetime(certificate.tbs_certificate.validity.not_after.to_unix_duration().as_secs())
}

/// Returns true when `at` falls inside the certificate validity window.
#[must_use]
pub fn valid_at(certificate: &Certificate, at: OffsetDateTime) -> bool {
    not_before(certificate) <= at && at <= not_after(certificate)
}

/// Returns true when the certificate carries `BasicConstraints` with `cA`.
#[must_use]
pub fn is_ca(certificate: &Certificate) -> bool {
    matches!(
        certificate.tbs_certificate.get::<BasicConstraints>(),
        Ok(Some((_, constraints))) if constraints.ca
    )
}

/// Returns true when the certificate's issuer and subject names match.
#[must_use]
pub fn is_self_issued(certificate: &Certificate) -> bool {
    certificate.tbs_certificate.issuer == certificate.tbs_certificate.subject
}

/// Verifies `child`'s signature with `issuer`'s public key.
///
/// # Errors
///
/// Returns [`CryptoError::UnsupportedKeyType`] for unknown signature
/// algorithms and [`CryptoError::SignatureMismatch`] when verification fails.
pub fn verify_certificate_signature(
    child: &Certificate,
    issuer: &Certificate,
) -> Result<(), CryptoError> {
    let scheme = scheme_for_oid(child.signature_algorithm.oid)?;
    let key = certificate_public_key(issuer)?;
    let tbs = child
        .tbs_certificate
        .to_der()
        .map_err(|err| CryptoError::Encoding(err.to_string()))?;
    key.verify_scheme(scheme, &tbs, child.signature.raw_bytes())
}

/// Maps a signature algorithm OID to a verification scheme.
///
/// # Errors
///
/// Returns [`CryptoError::UnsupportedKeyType`] for unknown algorithms.
pub fn scheme_for_oid(oid: ObjectIdentifier) -> Result<SignatureScheme, CryptoError> {
    let known = [
        (OID_RSA_SHA256, SignatureScheme::RsaPkcs1Sha256),
        (OID_RSA_SHA384, SignatureScheme::RsaPkcs1Sha384),
        (OID_RSA_SHA512, SignatureScheme::RsaPkcs1Sha512),
        (OID_ECDSA_SHA256, SignatureScheme::EcdsaSha256),
        (OID_ECDSA_SHA384, SignatureScheme::EcdsaSha384),
        (OID_ED25519, SignatureScheme::Ed25519),
    ];
    known
        .into_iter()
        .find(|(candidate, _)| *candidate == oid)
        .map(|(_, scheme)| scheme)
        .ok_or_else(|| CryptoError::UnsupportedKeyType(format!("signature algorithm {oid}")))
}

/// Builds a chain from `leaf` through `intermediates` to one of `roots`.
///
/// Every certificate on the chain must be valid at `at`. The returned chain
/// starts with the leaf and ends with the matching root.
///
/// # Errors
///
/// Returns [`CryptoError::ChainDoesNotBuild`] when no path reaches a root.
pub fn build_chain(
    leaf: &Certificate,
    intermediates: &[Certificate],
    roots: &[Certificate],
    at: OffsetDateTime,
) -> Result<Vec<Certificate>, CryptoError> {
    if roots.is_empty() {
        return Err(CryptoError::ChainDoesNotBuild("no trust roots configured".to_string()));
    }
    if !valid_at(leaf, at) {
        return Err(CryptoError::ChainDoesNotBuild(format!(
            "leaf certificate not valid at {at}"
        )));
    }
    if roots.iter().any(|root| root == leaf) {
        return Ok(vec![leaf.clone()]);
    }
    let mut chain = vec![leaf.clone()];
    let mut current = leaf.clone();
    for _ in 0 .. MAX_CHAIN_DEPTH {
        let root = roots.iter().find(|root| {
            current.tbs_certificate.issuer == root.tbs_certificate.subject
                && valid_at(root, at)
                && verify_certificate_signature(&current, root).is_ok()
        });
        if let Some(root) = root {
            chain.push(root.clone());
            return Ok(chain);
        }
        let next = intermediates.iter().find(|candidate| {
            current.tbs_certificate.issuer == candidate.tbs_certificate.subject
                && is_ca(candidate)
                && valid_at(candidate, at)
                && !chain.contains(candidate)
                && verify_certificate_signature(&current, candidate).is_ok()
        });
        let Some(next) = next else {
            return Err(CryptoError::ChainDoesNotBuild(format!(
                "no trusted issuer found for {}",
                current.tbs_certificate.subject
            )));
        };
        chain.push(next.clone());
        current = next.clone();
    }
    Err(CryptoError::ChainDoesNotBuild("chain exceeds maximum depth".to_string()))
}

/// Extracts identity attributes from a certificate.
#[must_use]
pub fn certificate_identity(certificate: &Certificate) -> CertificateIdentity {
    let subject = &certificate.tbs_certificate.subject;
    let mut identity = CertificateIdentity {
        common_names: name_values(subject, OID_COMMON_NAME),
        organizations: name_values(subject, OID_ORGANIZATION),
        ..CertificateIdentity::default()
    };
    if let Ok(Some((_, san))) = certificate.tbs_certificate.get::<SubjectAltName>() {
        for name in san.0 {
            match name {
                GeneralName::DnsName(value) => identity.dns_names.push(value.to_string()),
                GeneralName::Rfc822Name(value) => identity.emails.push(value.to_string()),
                GeneralName::UniformResourceIdentifier(value) => {
                    identity.uris.push(value.to_string());
                }
                _ => {}
            }
        }
    }
    identity
}

/// Collects string values of one attribute type from a distinguished name.
fn name_values(name: &Name, oid: ObjectIdentifier) -> Vec<String> {
    let mut values = Vec::new();
    for rdn in &name.0 {
        for atv in rdn.0.iter() {
            if atv.oid != oid {
                continue;
            }
            if let Ok(value) = atv.value.decode_as::<Utf8StringRef<'_>>() {
                values.push(value.as_str().to_string());
            } else if let Ok(value) = atv.value.decode_as::<PrintableStringRef<'_>>() {
                values.push(value.as_str().to_string());
            } else if let Ok(value) = atv.value.decode_as::<Ia5StringRef<'_>>() {
                values.push(value.as_str().to_string());
            }
        }
    }
    values
}

/// Converts unix seconds to an instant, saturating at the epoch bounds.
fn unix_to_datetime(seconds: u64) -> OffsetDateTime {
    let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
    OffsetDateTime::from_unix_timestamp(seconds).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

// ============================================================================
// SECTION: X.509 Verifier
// ============================================================================

/// Verifier bound to a leaf certificate and its trust context.
///
/// # Invariants
/// - `trusted_time` is sampled once and reused by every chain check.
#[derive(Debug, Clone)]
pub struct X509Verifier {
    /// Leaf certificate.
    leaf: Certificate,
    /// Intermediate certificates available for chain building.
    intermediates: Vec<Certificate>,
    /// Trust roots.
    roots: Vec<Certificate>,
    /// Instant used for validity checks.
    trusted_time: OffsetDateTime,
    /// Verifier over the leaf public key.
    key: KeyVerifier,
}

impl X509Verifier {
    /// Creates a verifier for a leaf certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedKeyType`] when the leaf key is not
    /// supported.
    pub fn new(
        leaf: Certificate,
        intermediates: Vec<Certificate>,
        roots: Vec<Certificate>,
        trusted_time: OffsetDateTime,
    ) -> Result<Self, CryptoError> {
        let key = KeyVerifier::new(certificate_public_key(&leaf)?);
        Ok(Self {
            leaf,
            intermediates,
            roots,
            trusted_time,
            key,
        })
    }

    /// Returns the leaf certificate.
    #[must_use]
    pub const fn leaf(&self) -> &Certificate {
        &self.leaf
    }

    /// Returns the intermediate certificates.
    #[must_use]
    pub fn intermediates(&self) -> &[Certificate] {
        &self.intermediates
    }

    /// Returns the trust roots.
    #[must_use]
    pub fn roots(&self) -> &[Certificate] {
        &self.roots
    }

    /// Returns the instant used for validity checks.
    #[must_use]
    pub const fn trusted_time(&self) -> OffsetDateTime {
        self.trusted_time
    }

    /// Returns a copy with different roots and intermediates.
    #[must_use]
    pub fn with_trust(&self, intermediates: Vec<Certificate>, roots: Vec<Certificate>) -> Self {
        Self {
            intermediates,
            roots,
            ..self.clone()
        }
    }

    /// Returns a copy validating at a different instant.
    #[must_use]
    pub fn with_trusted_time(&self, trusted_time: OffsetDateTime) -> Self {
        Self {
            trusted_time,
            ..self.clone()
        }
    }

    /// Builds the chain at the trusted instant.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::ChainDoesNotBuild`] when no chain validates.
    pub fn verify_chain(&self) -> Result<Vec<Certificate>, CryptoError> {
        build_chain(&self.leaf, &self.intermediates, &self.roots, self.trusted_time)
    }

    /// Returns the identity attributes of the leaf certificate.
    #[must_use]
    pub fn identity(&self) -> CertificateIdentity {
        certificate_identity(&self.leaf)
    }
}

impl Verifier for X509Verifier {
    fn key_id(&self) -> Result<String, CryptoError> {
        self.key.key_id()
    }

    fn verify(&self, data: &mut dyn Read, signature: &[u8]) -> Result<(), CryptoError> {
        self.verify_chain()?;
        self.key.verify(data, signature)
    }

    fn bytes(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(certificate_to_pem(&self.leaf)?.into_bytes())
    }

    fn as_x509(&self) -> Option<&X509Verifier> {
        Some(self)
    }
}

// ============================================================================
// SECTION: X.509 Signer
// ============================================================================

/// Signer bound to a leaf certificate and intermediates.
pub struct X509Signer {
    /// Underlying key signer.
    inner: Box<dyn Signer>,
    /// Leaf certificate.
    leaf: Certificate,
    /// Intermediate certificates, leaf-ward first.
    intermediates: Vec<Certificate>,
    /// Trust roots handed to the verifier.
    roots: Vec<Certificate>,
}

impl X509Signer {
    /// Binds a key signer to a certificate chain.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Config`] when the leaf certificate does not carry
    /// the signer's public key.
    pub fn new(
        inner: Box<dyn Signer>,
        leaf: Certificate,
        intermediates: Vec<Certificate>,
        roots: Vec<Certificate>,
    ) -> Result<Self, CryptoError> {
        let leaf_key_id = certificate_public_key(&leaf)?.key_id()?;
        if leaf_key_id != inner.key_id()? {
            return Err(CryptoError::Config(
                "certificate public key does not match signing key".to_string(),
            ));
        }
        Ok(Self {
            inner,
            leaf,
            intermediates,
            roots,
        })
    }

    /// Returns the leaf certificate.
    #[must_use]
    pub const fn leaf(&self) -> &Certificate {
        &self.leaf
    }
}

impl Signer for X509Signer {
    fn key_id(&self) -> Result<String, CryptoError> {
        self.inner.key_id()
    }

    fn sign(&self, data: &mut dyn Read) -> Result<Vec<u8>, CryptoError> {
        self.inner.sign(data)
    }

    fn verifier(&self) -> Result<Box<dyn Verifier>, CryptoError> {
        Ok(Box::new(X509Verifier::new(
            self.leaf.clone(),
            self.intermediates.clone(),
            self.roots.clone(),
            OffsetDateTime::now_utc(),
        )?))
    }

    fn certificate_chain(&self) -> Option<CertificateChain> {
        let leaf_pem = certificate_to_pem(&self.leaf).ok()?.into_bytes();
        let intermediates_pem = self
            .intermediates
            .iter()
            .map(|cert| certificate_to_pem(cert).map(String::into_bytes))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        Some(CertificateChain {
            leaf_pem,
            intermediates_pem,
        })
    }
}
