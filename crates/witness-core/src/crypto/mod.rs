// crates/witness-core/src/crypto/mod.rs
// ============================================================================
// Module: Signer Abstraction
// Description: Sign/verify capabilities over raw keys and X.509 bindings.
// Purpose: Give envelopes and policies one polymorphic signing surface.
// Dependencies: rsa, p256, p384, ed25519-dalek, x509-cert, sha2
// ============================================================================

//! ## Overview
//! A [`Signer`] produces signatures over a byte stream and exposes its
//! [`Verifier`]. Key identifiers are the lowercase hex SHA-256 of the PEM
//! (`PUBLIC KEY`, PKIX DER) rendering of the public key, so a key has the same
//! identifier wherever it appears.
//!
//! Concrete implementations:
//! - [`KeySigner`] / [`KeyVerifier`] over RSA-PSS, ECDSA (P-256, P-384), and
//!   Ed25519 keys.
//! - [`X509Signer`] / [`X509Verifier`] binding a key to a certificate chain.
//!
//! Security posture: key material is loaded from PEM only and never logged.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod keys;
pub mod signer;
pub mod x509;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;

use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

pub use keys::PrivateKey;
pub use keys::PublicKey;
pub use keys::RsaHash;
pub use keys::SignatureScheme;
pub use signer::KeySigner;
pub use signer::KeyVerifier;
pub use signer::SignerProvider;
pub use signer::load_signer_from_pem;
pub use signer::load_verifier_from_pem;
pub use x509::CertificateChain;
pub use x509::CertificateIdentity;
pub use x509::X509Signer;
pub use x509::X509Verifier;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by signing and verification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key type or algorithm is not supported.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),
    /// PEM input could not be decoded.
    #[error("invalid pem: {0}")]
    InvalidPem(String),
    /// Certificate chain does not build to a trusted root.
    #[error("certificate chain does not build: {0}")]
    ChainDoesNotBuild(String),
    /// Signature did not verify.
    #[error("signature mismatch")]
    SignatureMismatch,
    /// Encoding or decoding failure.
    #[error("encoding error: {0}")]
    Encoding(String),
    /// Reading signed data failed.
    #[error("io error: {0}")]
    Io(String),
    /// Signer-provider configuration is incomplete.
    #[error("signer configuration error: {0}")]
    Config(String),
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Signing capability.
pub trait Signer: Send + Sync {
    /// Returns the key identifier of the signing key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when the public key cannot be encoded.
    fn key_id(&self) -> Result<String, CryptoError>;

    /// Signs the full contents of a reader.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when reading or signing fails.
    fn sign(&self, data: &mut dyn Read) -> Result<Vec<u8>, CryptoError>;

    /// Returns a verifier for signatures produced by this signer.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when the verifier cannot be constructed.
    fn verifier(&self) -> Result<Box<dyn Verifier>, CryptoError>;

    /// Returns the certificate chain bound to this signer, if any.
    fn certificate_chain(&self) -> Option<CertificateChain> {
        None
    }
}

/// Verification capability.
pub trait Verifier: Send + Sync {
    /// Returns the key identifier of the verification key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when the public key cannot be encoded.
    fn key_id(&self) -> Result<String, CryptoError>;

    /// Verifies a signature over the full contents of a reader.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureMismatch`] when the signature is invalid
    /// and other variants when the verifier cannot run.
    fn verify(&self, data: &mut dyn Read, signature: &[u8]) -> Result<(), CryptoError>;

    /// Returns the PEM encoding of the verification key or certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when encoding fails.
    fn bytes(&self) -> Result<Vec<u8>, CryptoError>;

    /// Returns the X.509 view of this verifier, if it is certificate-backed.
    fn as_x509(&self) -> Option<&X509Verifier> {
        None
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Computes a key identifier from PEM bytes.
#[must_use]
pub fn key_id_from_pem(pem: &[u8]) -> String {
    hex::encode(Sha256::digest(pem))
}

/// Reads a signing input to completion.
pub(crate) fn read_all(data: &mut dyn Read) -> Result<Vec<u8>, CryptoError> {
    let mut buffer = Vec::new();
    data.read_to_end(&mut buffer).map_err(|err| CryptoError::Io(err.to_string()))?;
    Ok(buffer)
}
