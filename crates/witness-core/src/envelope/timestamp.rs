// crates/witness-core/src/envelope/timestamp.rs
// ============================================================================
// Module: Signature Timestamping
// Description: Timestamp acquisition and verification traits plus RFC 3161
//              adapters.
// Purpose: Bind trusted signing instants to envelope signatures.
// Dependencies: x509-tsp, cms, x509-cert, reqwest, sha2, time
// ============================================================================

//! ## Overview
//! A [`Timestamper`] returns an opaque token over signature bytes. A
//! [`TimestampVerifier`] checks a token against the same bytes and yields the
//! attested instant.
//!
//! The RFC 3161 adapters:
//! - [`Rfc3161Timestamper`] posts a DER `TimeStampReq` with a SHA-256 imprint
//!   and `certReq` set, and returns the DER `TimeStampToken` (CMS
//!   `ContentInfo`).
//! - [`Rfc3161TimestampVerifier`] decodes the CMS `SignedData`, checks the
//!   message imprint and the `messageDigest` signed attribute, verifies the
//!   signer-info signature, and chains the TSA certificate to a configured
//!   root at the token's generation time.
//!
//! Security posture: tokens are untrusted input; every field used for the
//! decision is re-derived from the verified structure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use cms::signed_data::SignerIdentifier;
use cms::signed_data::SignerInfo;
use reqwest::blocking::Client;
use sha2::Digest;
use sha2::Sha256;
use sha2::Sha384;
use sha2::Sha512;
use thiserror::Error;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use x509_cert::Certificate;
use x509_cert::der::Decode;
use x509_cert::der::Encode;
use x509_cert::der::asn1::OctetString;
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::spki::ObjectIdentifier;
use x509_tsp::MessageImprint;
use x509_tsp::TimeStampReq;
use x509_tsp::TimeStampResp;
use x509_tsp::TspVersion;
use x509_tsp::TstInfo;

use crate::crypto::SignatureScheme;
use crate::crypto::x509::build_chain;
use crate::crypto::x509::certificate_public_key;
use crate::crypto::x509::scheme_for_oid;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default network timeout for timestamp authorities.
pub const DEFAULT_TIMESTAMP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum accepted TSA response size.
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// `id-sha256`.
const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
/// `id-sha384`.
const OID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
/// `id-sha512`.
const OID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");
/// `rsaEncryption`.
const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// `id-messageDigest` signed attribute.
const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while acquiring or verifying timestamps.
#[derive(Debug, Error)]
pub enum TimestampError {
    /// Transport failure talking to the authority.
    #[error("timestamp authority request failed: {0}")]
    Transport(String),
    /// The authority answered without a token.
    #[error("timestamp authority returned no token")]
    NoToken,
    /// Token structure could not be decoded.
    #[error("malformed timestamp token: {0}")]
    Malformed(String),
    /// Imprint does not match the timestamped data.
    #[error("timestamp imprint does not match signed data")]
    ImprintMismatch,
    /// Token signature or chain is invalid.
    #[error("timestamp token not trusted: {0}")]
    Untrusted(String),
    /// Operation cancelled before completion.
    #[error("timestamp request cancelled")]
    Cancelled,
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Acquires timestamp tokens over data.
pub trait Timestamper: Send + Sync {
    /// Returns a token over `data`.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError`] when the authority cannot be reached or
    /// rejects the request.
    fn timestamp(&self, data: &[u8]) -> Result<Vec<u8>, TimestampError>;
}

/// Verifies timestamp tokens.
pub trait TimestampVerifier: Send + Sync {
    /// Verifies `token` over `data` and returns the attested instant.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError`] when the token is malformed or untrusted.
    fn verify(&self, token: &[u8], data: &[u8]) -> Result<OffsetDateTime, TimestampError>;
}

// ============================================================================
// SECTION: RFC 3161 Timestamper
// ============================================================================

/// RFC 3161 client over HTTP.
pub struct Rfc3161Timestamper {
    /// Authority URL.
    url: String,
    /// Blocking HTTP client.
    client: Client,
    /// Run cancellation token.
    cancel: Option<CancellationToken>,
}

impl Rfc3161Timestamper {
    /// Creates a client for a timestamp authority URL.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Transport`] when the HTTP client cannot be
    /// built.
    pub fn new(url: impl Into<String>) -> Result<Self, TimestampError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMESTAMP_TIMEOUT)
            .build()
            .map_err(|err| TimestampError::Transport(err.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
            cancel: None,
        })
    }

    /// Attaches a cancellation token checked before each request.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Returns the authority URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Timestamper for Rfc3161Timestamper {
    fn timestamp(&self, data: &[u8]) -> Result<Vec<u8>, TimestampError> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(TimestampError::Cancelled);
        }
        let request = build_request(data)?;
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/timestamp-query")
            .body(request)
            .send()
            .map_err(|err| TimestampError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TimestampError::Transport(format!("unexpected status {status}")));
        }
        let body = response.bytes().map_err(|err| TimestampError::Transport(err.to_string()))?;
        if body.len() > MAX_RESPONSE_BYTES {
            return Err(TimestampError::Malformed("response exceeds size limit".to_string()));
        }
        token_from_response(&body)
    }
}

/// Encodes a `TimeStampReq` over the SHA-256 digest of `data`.
///
/// # Errors
///
/// Returns [`TimestampError::Malformed`] when encoding fails.
pub fn build_request(data: &[u8]) -> Result<Vec<u8>, TimestampError> {
    let hashed_message = OctetString::new(Sha256::digest(data).to_vec())
        .map_err(|err| TimestampError::Malformed(err.to_string()))?;
    let request = TimeStampReq {
        version: TspVersion::V1,
        message_imprint: MessageImprint {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: OID_SHA256,
                parameters: None,
            },
            hashed_message,
        },
        req_policy: None,
        nonce: None,
        cert_req: true,
        extensions: None,
    };
    request.to_der().map_err(|err| TimestampError::Malformed(err.to_string()))
}

/// Extracts the DER token from a `TimeStampResp`.
///
/// # Errors
///
/// Returns [`TimestampError::NoToken`] when the response carries no token.
pub fn token_from_response(body: &[u8]) -> Result<Vec<u8>, TimestampError> {
    let response =
        TimeStampResp::from_der(body).map_err(|err| TimestampError::Malformed(err.to_string()))?;
    let token = response.time_stamp_token.ok_or(TimestampError::NoToken)?;
    token.to_der().map_err(|err| TimestampError::Malformed(err.to_string()))
}

// ============================================================================
// SECTION: RFC 3161 Verifier
// ============================================================================

/// RFC 3161 token verifier anchored in TSA roots.
#[derive(Clone)]
pub struct Rfc3161TimestampVerifier {
    /// Trusted TSA roots.
    roots: Vec<Certificate>,
    /// Extra intermediates for TSA chains.
    intermediates: Vec<Certificate>,
}

impl Rfc3161TimestampVerifier {
    /// Creates a verifier trusting the given TSA roots.
    #[must_use]
    pub const fn new(roots: Vec<Certificate>, intermediates: Vec<Certificate>) -> Self {
        Self {
            roots,
            intermediates,
        }
    }
}

impl TimestampVerifier for Rfc3161TimestampVerifier {
    fn verify(&self, token: &[u8], data: &[u8]) -> Result<OffsetDateTime, TimestampError> {
        let content_info =
            ContentInfo::from_der(token).map_err(|err| TimestampError::Malformed(err.to_string()))?;
        let content_der = content_info
            .content
            .to_der()
            .map_err(|err| TimestampError::Malformed(err.to_string()))?;
        let signed_data = SignedData::from_der(&content_der)
            .map_err(|err| TimestampError::Malformed(err.to_string()))?;
        let econtent = signed_data
            .encap_content_info
            .econtent
            .as_ref()
            .ok_or_else(|| TimestampError::Malformed("missing encapsulated content".to_string()))?;
        let econtent_der =
            econtent.to_der().map_err(|err| TimestampError::Malformed(err.to_string()))?;
        let tst_octets = OctetString::from_der(&econtent_der)
            .map_err(|err| TimestampError::Malformed(err.to_string()))?;
        let tst_bytes = tst_octets.as_bytes();
        let tst_info =
            TstInfo::from_der(tst_bytes).map_err(|err| TimestampError::Malformed(err.to_string()))?;

        let imprint_alg = tst_info.message_imprint.hash_algorithm.oid;
        let expected_imprint = digest_for(imprint_alg, data)?;
        if tst_info.message_imprint.hashed_message.as_bytes() != expected_imprint.as_slice() {
            return Err(TimestampError::ImprintMismatch);
        }

        let mut certificates = Vec::new();
        if let Some(set) = &signed_data.certificates {
            for choice in set.0.iter() {
                if let CertificateChoices::Certificate(certificate) = choice {
                    certificates.push(certificate.clone());
                }
            }
        }
        let signer_info = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| TimestampError::Malformed("missing signer info".to_string()))?;
        let signer_cert = find_signer_certificate(signer_info, &certificates)?;
        verify_signer_info(signer_info, &signer_cert, tst_bytes)?;

        let gen_seconds = tst_info.gen_time.to_unix_duration().as_secs();
        let gen_time = OffsetDateTime::from_unix_timestamp(
            i64::try_from(gen_seconds).map_err(|err| TimestampError::Malformed(err.to_string()))?,
        )
        .map_err(|err| TimestampError::Malformed(err.to_string()))?;

        let mut pool = certificates;
        pool.extend(self.intermediates.iter().cloned());
        build_chain(&signer_cert, &pool, &self.roots, gen_time)
            .map_err(|err| TimestampError::Untrusted(err.to_string()))?;
        Ok(gen_time)
    }
}

/// Hashes `data` with the digest named by `oid`.
fn digest_for(oid: ObjectIdentifier, data: &[u8]) -> Result<Vec<u8>, TimestampError> {
    if oid == OID_SHA256 {
        Ok(Sha256::digest(data).to_vec())
    } else if oid == OID_SHA384 {
        Ok(Sha384::digest(data).to_vec())
    } else if oid == OID_SHA512 {
        Ok(Sha512::digest(data).to_vec())
    } else {
        Err(TimestampError::Malformed(format!("unsupported imprint algorithm {oid}")))
    }
}

/// Locates the certificate named by the signer identifier.
fn find_signer_certificate(
    signer_info: &SignerInfo,
    certificates: &[Certificate],
) -> Result<Certificate, TimestampError> {
    let found = match &signer_info.sid {
        SignerIdentifier::IssuerAndSerialNumber(id) => certificates.iter().find(|certificate| {
            certificate.tbs_certificate.issuer == id.issuer
                && certificate.tbs_certificate.serial_number == id.serial_number
        }),
        SignerIdentifier::SubjectKeyIdentifier(_) => certificates.first(),
    };
    found
        .cloned()
        .ok_or_else(|| TimestampError::Untrusted("signer certificate not embedded".to_string()))
}

/// Verifies the signed attributes and signature of a signer info.
fn verify_signer_info(
    signer_info: &SignerInfo,
    signer_cert: &Certificate,
    content: &[u8],
) -> Result<(), TimestampError> {
    let digest_alg = signer_info.digest_alg.oid;
    let content_digest = digest_for(digest_alg, content)?;
    let signed_attrs = signer_info
        .signed_attrs
        .as_ref()
        .ok_or_else(|| TimestampError::Malformed("missing signed attributes".to_string()))?;
    let message_digest = signed_attrs
        .iter()
        .find(|attr| attr.oid == OID_MESSAGE_DIGEST)
        .and_then(|attr| attr.values.iter().next())
        .ok_or_else(|| TimestampError::Malformed("missing message digest attribute".to_string()))?;
    let message_digest_der =
        message_digest.to_der().map_err(|err| TimestampError::Malformed(err.to_string()))?;
    let message_digest = OctetString::from_der(&message_digest_der)
        .map_err(|err| TimestampError::Malformed(err.to_string()))?;
    if message_digest.as_bytes() != content_digest.as_slice() {
        return Err(TimestampError::Untrusted("message digest attribute mismatch".to_string()));
    }
    let scheme = signer_scheme(signer_info.signature_algorithm.oid, digest_alg)?;
    let signed_bytes =
        signed_attrs.to_der().map_err(|err| TimestampError::Malformed(err.to_string()))?;
    let key = certificate_public_key(signer_cert)
        .map_err(|err| TimestampError::Untrusted(err.to_string()))?;
    key.verify_scheme(scheme, &signed_bytes, signer_info.signature.as_bytes())
        .map_err(|err| TimestampError::Untrusted(err.to_string()))
}

/// Resolves the signature scheme from the algorithm and digest OIDs.
fn signer_scheme(
    signature_alg: ObjectIdentifier,
    digest_alg: ObjectIdentifier,
) -> Result<SignatureScheme, TimestampError> {
    if signature_alg == OID_RSA_ENCRYPTION {
        return if digest_alg == OID_SHA256 {
            Ok(SignatureScheme::RsaPkcs1Sha256)
        } else if digest_alg == OID_SHA384 {
            Ok(SignatureScheme::RsaPkcs1Sha384)
        } else if digest_alg == OID_SHA512 {
            Ok(SignatureScheme::RsaPkcs1Sha512)
        } else {
            Err(TimestampError::Malformed(format!("unsupported digest {digest_alg}")))
        };
    }
    scheme_for_oid(signature_alg).map_err(|err| TimestampError::Untrusted(err.to_string()))
}
