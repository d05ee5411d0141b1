// crates/witness-core/src/crypto/keys.rs
// ============================================================================
// Module: Key Material
// Description: Public and private key sum types with PEM codecs.
// Purpose: Detect key types from PEM and run scheme-specific primitives.
// Dependencies: rsa, p256, p384, ed25519-dalek, sha2, signature, rand
// ============================================================================

//! ## Overview
//! [`PublicKey`] and [`PrivateKey`] close over the supported algorithms.
//! Private keys are detected from PEM in a fixed order: PKCS#8 (RSA, P-256,
//! P-384, Ed25519), then PKCS#1 RSA, then SEC1 EC.
//!
//! RSA-PSS salt lengths:
//! - Signing always uses a salt as long as the digest (32 bytes for SHA-256).
//!   Verifiers that recover the salt length from the signature accept it.
//! - Verification tries the digest length first, then the maximum length
//!   `key_bytes - digest_len - 2`. Signers that pick the salt length
//!   automatically emit the maximum, so both conventions verify.
//! - Any other salt length is rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::pkcs8::LineEnding;
use rsa::pss;
use rsa::traits::PublicKeyParts;
use sha2::Digest;
use sha2::Sha256;
use sha2::Sha384;
use sha2::Sha512;
use signature::RandomizedSigner;
use signature::SignatureEncoding;
use signature::Signer as _;
use signature::Verifier as _;

use crate::crypto::CryptoError;
use crate::crypto::key_id_from_pem;

// ============================================================================
// SECTION: Schemes
// ============================================================================

/// Digest used by RSA-PSS signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RsaHash {
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl RsaHash {
    /// Digest output length in bytes.
    const fn output_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// Signature scheme used when verifying certificate and token signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// RSA PKCS#1 v1.5 with SHA-256.
    RsaPkcs1Sha256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    RsaPkcs1Sha384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    RsaPkcs1Sha512,
    /// RSA-PSS with the given digest.
    RsaPss(RsaHash),
    /// ECDSA with SHA-256 (P-256).
    EcdsaSha256,
    /// ECDSA with SHA-384 (P-384).
    EcdsaSha384,
    /// Ed25519.
    Ed25519,
}

impl SignatureScheme {
    /// Short scheme name for error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RsaPkcs1Sha256 => "rsa-pkcs1-sha256",
            Self::RsaPkcs1Sha384 => "rsa-pkcs1-sha384",
            Self::RsaPkcs1Sha512 => "rsa-pkcs1-sha512",
            Self::RsaPss(RsaHash::Sha256) => "rsa-pss-sha256",
            Self::RsaPss(RsaHash::Sha384) => "rsa-pss-sha384",
            Self::RsaPss(RsaHash::Sha512) => "rsa-pss-sha512",
            Self::EcdsaSha256 => "ecdsa-sha256",
            Self::EcdsaSha384 => "ecdsa-sha384",
            Self::Ed25519 => "ed25519",
        }
    }
}

// ============================================================================
// SECTION: Public Keys
// ============================================================================

/// Supported public keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// RSA public key.
    Rsa(RsaPublicKey),
    /// NIST P-256 public key.
    P256(p256::PublicKey),
    /// NIST P-384 public key.
    P384(p384::PublicKey),
    /// Ed25519 public key.
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    /// Decodes a PKIX `SubjectPublicKeyInfo` DER structure.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedKeyType`] when no supported algorithm
    /// accepts the structure.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        if let Ok(key) = RsaPublicKey::from_public_key_der(der) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = p256::PublicKey::from_public_key_der(der) {
            return Ok(Self::P256(key));
        }
        if let Ok(key) = p384::PublicKey::from_public_key_der(der) {
            return Ok(Self::P384(key));
        }
        if let Ok(key) = ed25519_dalek::VerifyingKey::from_public_key_der(der) {
            return Ok(Self::Ed25519(key));
        }
        Err(CryptoError::UnsupportedKeyType("unrecognized subject public key info".to_string()))
    }

    /// Decodes a `PUBLIC KEY` or `RSA PUBLIC KEY` PEM block.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPem`] when the input is not PEM and
    /// [`CryptoError::UnsupportedKeyType`] when the key is not supported.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        if !pem.contains("-----BEGIN") {
            return Err(CryptoError::InvalidPem("missing pem header".to_string()));
        }
        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = p256::PublicKey::from_public_key_pem(pem) {
            return Ok(Self::P256(key));
        }
        if let Ok(key) = p384::PublicKey::from_public_key_pem(pem) {
            return Ok(Self::P384(key));
        }
        if let Ok(key) = ed25519_dalek::VerifyingKey::from_public_key_pem(pem) {
            return Ok(Self::Ed25519(key));
        }
        if let Ok(key) = RsaPublicKey::from_pkcs1_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        Err(CryptoError::UnsupportedKeyType("unrecognized public key pem".to_string()))
    }

    /// Encodes the key as a `PUBLIC KEY` PEM block with LF line endings.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encoding`] when encoding fails.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        let encoded = match self {
            Self::Rsa(key) => key.to_public_key_pem(LineEnding::LF),
            Self::P256(key) => key.to_public_key_pem(LineEnding::LF),
            Self::P384(key) => key.to_public_key_pem(LineEnding::LF),
            Self::Ed25519(key) => key.to_public_key_pem(LineEnding::LF),
        };
        encoded.map_err(|err| CryptoError::Encoding(err.to_string()))
    }

    /// Returns the key identifier (hex SHA-256 of the PEM encoding).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encoding`] when encoding fails.
    pub fn key_id(&self) -> Result<String, CryptoError> {
        Ok(key_id_from_pem(self.to_pem()?.as_bytes()))
    }

    /// Returns a short algorithm label.
    #[must_use]
    pub const fn algorithm(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "rsa",
            Self::P256(_) => "ecdsa-p256",
            Self::P384(_) => "ecdsa-p384",
            Self::Ed25519(_) => "ed25519",
        }
    }

    /// Verifies a signature under an explicit scheme.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedKeyType`] when the scheme does not fit
    /// the key and [`CryptoError::SignatureMismatch`] when verification fails.
    pub fn verify_scheme(
        &self,
        scheme: SignatureScheme,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        match (self, scheme) {
            (Self::Rsa(key), SignatureScheme::RsaPkcs1Sha256) => {
                let verifier = pkcs1v15::VerifyingKey::<Sha256>::new(key.clone());
                verify_pkcs1v15(&verifier, message, signature)
            }
            (Self::Rsa(key), SignatureScheme::RsaPkcs1Sha384) => {
                let verifier = pkcs1v15::VerifyingKey::<Sha384>::new(key.clone());
                verify_pkcs1v15(&verifier, message, signature)
            }
            (Self::Rsa(key), SignatureScheme::RsaPkcs1Sha512) => {
                let verifier = pkcs1v15::VerifyingKey::<Sha512>::new(key.clone());
                verify_pkcs1v15(&verifier, message, signature)
            }
            (Self::Rsa(key), SignatureScheme::RsaPss(hash)) => {
                verify_pss(key, hash, message, signature)
            }
            (Self::P256(key), SignatureScheme::EcdsaSha256) => {
                let parsed = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|_| CryptoError::SignatureMismatch)?;
                p256::ecdsa::VerifyingKey::from(key)
                    .verify(message, &parsed)
                    .map_err(|_| CryptoError::SignatureMismatch)
            }
            (Self::P384(key), SignatureScheme::EcdsaSha384) => {
                let parsed = p384::ecdsa::Signature::from_der(signature)
                    .map_err(|_| CryptoError::SignatureMismatch)?;
                p384::ecdsa::VerifyingKey::from(key)
                    .verify(message, &parsed)
                    .map_err(|_| CryptoError::SignatureMismatch)
            }
            (Self::Ed25519(key), SignatureScheme::Ed25519) => {
                let parsed = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| CryptoError::SignatureMismatch)?;
                key.verify(message, &parsed).map_err(|_| CryptoError::SignatureMismatch)
            }
            (key, scheme) => Err(CryptoError::UnsupportedKeyType(format!(
                "scheme {} does not apply to {} keys",
                scheme.as_str(),
                key.algorithm()
            ))),
        }
    }

    /// Returns the default envelope scheme for this key.
    #[must_use]
    pub const fn default_scheme(&self, rsa_hash: RsaHash) -> SignatureScheme {
        match self {
            Self::Rsa(_) => SignatureScheme::RsaPss(rsa_hash),
            Self::P256(_) => SignatureScheme::EcdsaSha256,
            Self::P384(_) => SignatureScheme::EcdsaSha384,
            Self::Ed25519(_) => SignatureScheme::Ed25519,
        }
    }
}

// ============================================================================
// SECTION: Private Keys
// ============================================================================

/// Supported private keys.
#[derive(Clone)]
pub enum PrivateKey {
    /// RSA private key.
    Rsa(RsaPrivateKey),
    /// NIST P-256 signing key.
    P256(p256::ecdsa::SigningKey),
    /// NIST P-384 signing key.
    P384(p384::ecdsa::SigningKey),
    /// Ed25519 signing key.
    Ed25519(ed25519_dalek::SigningKey),
}

impl PrivateKey {
    /// Detects and decodes a private key PEM block.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPem`] for non-PEM input and
    /// [`CryptoError::UnsupportedKeyType`] when no decoder accepts the key.
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        if !pem.contains("-----BEGIN") {
            return Err(CryptoError::InvalidPem("missing pem header".to_string()));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::P256(key));
        }
        if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::P384(key));
        }
        if let Ok(key) = ed25519_dalek::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::Ed25519(key));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = p256::SecretKey::from_sec1_pem(pem) {
            return Ok(Self::P256(p256::ecdsa::SigningKey::from(key)));
        }
        if let Ok(key) = p384::SecretKey::from_sec1_pem(pem) {
            return Ok(Self::P384(p384::ecdsa::SigningKey::from(key)));
        }
        Err(CryptoError::UnsupportedKeyType("unrecognized private key pem".to_string()))
    }

    /// Returns the matching public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
            Self::P256(key) => PublicKey::P256(p256::PublicKey::from(key.verifying_key())),
            Self::P384(key) => PublicKey::P384(p384::PublicKey::from(key.verifying_key())),
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
        }
    }

    /// Signs a message with the key's envelope scheme.
    ///
    /// RSA keys sign with PSS and a digest-length salt.
    #[must_use]
    pub fn sign(&self, rsa_hash: RsaHash, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Rsa(key) => match rsa_hash {
                RsaHash::Sha256 => pss::BlindedSigningKey::<Sha256>::new(key.clone())
                    .sign_with_rng(&mut OsRng, message)
                    .to_vec(),
                RsaHash::Sha384 => pss::BlindedSigningKey::<Sha384>::new(key.clone())
                    .sign_with_rng(&mut OsRng, message)
                    .to_vec(),
                RsaHash::Sha512 => pss::BlindedSigningKey::<Sha512>::new(key.clone())
                    .sign_with_rng(&mut OsRng, message)
                    .to_vec(),
            },
            Self::P256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                signature.to_der().as_bytes().to_vec()
            }
            Self::P384(key) => {
                let signature: p384::ecdsa::Signature = key.sign(message);
                signature.to_der().as_bytes().to_vec()
            }
            Self::Ed25519(key) => key.sign(message).to_bytes().to_vec(),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Verifies an RSA PKCS#1 v1.5 signature.
fn verify_pkcs1v15<D>(
    key: &pkcs1v15::VerifyingKey<D>,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError>
where
    D: Digest,
    pkcs1v15::VerifyingKey<D>: signature::Verifier<pkcs1v15::Signature>,
{
    let parsed =
        pkcs1v15::Signature::try_from(signature).map_err(|_| CryptoError::SignatureMismatch)?;
    key.verify(message, &parsed).map_err(|_| CryptoError::SignatureMismatch)
}

/// Verifies an RSA-PSS signature with a digest-length or maximum-length
/// salt; other salt lengths are rejected.
fn verify_pss(
    key: &RsaPublicKey,
    hash: RsaHash,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let parsed = pss::Signature::try_from(signature).map_err(|_| CryptoError::SignatureMismatch)?;
    let max_salt = key.size().saturating_sub(hash.output_len() + 2);
    for salt_len in [hash.output_len(), max_salt] {
        let verified = match hash {
            RsaHash::Sha256 => pss::VerifyingKey::<Sha256>::new_with_salt_len(key.clone(), salt_len)
                .verify(message, &parsed)
                .is_ok(),
            RsaHash::Sha384 => pss::VerifyingKey::<Sha384>::new_with_salt_len(key.clone(), salt_len)
                .verify(message, &parsed)
                .is_ok(),
            RsaHash::Sha512 => pss::VerifyingKey::<Sha512>::new_with_salt_len(key.clone(), salt_len)
                .verify(message, &parsed)
                .is_ok(),
        };
        if verified {
            return Ok(());
        }
    }
    Err(CryptoError::SignatureMismatch)
}
