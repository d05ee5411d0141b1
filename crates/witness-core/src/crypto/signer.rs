// crates/witness-core/src/crypto/signer.rs
// ============================================================================
// Module: Key Signers
// Description: Raw-key signers, verifiers, PEM loaders, and signer providers.
// Purpose: Turn PEM files and provider option bags into signing capabilities.
// Dependencies: crate::crypto::keys, crate::crypto::x509, time
// ============================================================================

//! ## Overview
//! [`KeySigner`] and [`KeyVerifier`] wrap the key sum types. Loaders detect
//! key kinds from PEM input. [`SignerProvider`] is the sum type over provider
//! mechanisms: the file provider is built in and other mechanisms plug in as
//! already-constructed signers.
//!
//! Security posture: key files are read with a size cap and never echoed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use time::OffsetDateTime;

use crate::crypto::CryptoError;
use crate::crypto::PrivateKey;
use crate::crypto::PublicKey;
use crate::crypto::RsaHash;
use crate::crypto::Signer;
use crate::crypto::Verifier;
use crate::crypto::X509Signer;
use crate::crypto::X509Verifier;
use crate::crypto::read_all;
use crate::crypto::x509::parse_certificate_pem;
use crate::crypto::x509::parse_certificates_pem;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum size of key and certificate files.
pub const MAX_KEY_FILE_BYTES: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Key Signer
// ============================================================================

/// Signer over a raw private key.
#[derive(Clone)]
pub struct KeySigner {
    /// Private key.
    key: PrivateKey,
    /// Digest used for RSA-PSS.
    rsa_hash: RsaHash,
}

impl KeySigner {
    /// Creates a signer with the default RSA digest (SHA-256).
    #[must_use]
    pub fn new(key: PrivateKey) -> Self {
        Self {
            key,
            rsa_hash: RsaHash::default(),
        }
    }

    /// Overrides the RSA-PSS digest.
    #[must_use]
    pub const fn with_rsa_hash(mut self, rsa_hash: RsaHash) -> Self {
        self.rsa_hash = rsa_hash;
        self
    }

    /// Returns the public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }
}

impl Signer for KeySigner {
    fn key_id(&self) -> Result<String, CryptoError> {
        self.key.public_key().key_id()
    }

    fn sign(&self, data: &mut dyn Read) -> Result<Vec<u8>, CryptoError> {
        let message = read_all(data)?;
        Ok(self.key.sign(self.rsa_hash, &message))
    }

    fn verifier(&self) -> Result<Box<dyn Verifier>, CryptoError> {
        Ok(Box::new(KeyVerifier::new(self.key.public_key()).with_rsa_hash(self.rsa_hash)))
    }
}

// ============================================================================
// SECTION: Key Verifier
// ============================================================================

/// Verifier over a raw public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVerifier {
    /// Public key.
    key: PublicKey,
    /// Digest used for RSA-PSS.
    rsa_hash: RsaHash,
}

impl KeyVerifier {
    /// Creates a verifier with the default RSA digest (SHA-256).
    #[must_use]
    pub fn new(key: PublicKey) -> Self {
        Self {
            key,
            rsa_hash: RsaHash::default(),
        }
    }

    /// Overrides the RSA-PSS digest.
    #[must_use]
    pub const fn with_rsa_hash(mut self, rsa_hash: RsaHash) -> Self {
        self.rsa_hash = rsa_hash;
        self
    }

    /// Returns the public key.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.key
    }
}

impl Verifier for KeyVerifier {
    fn key_id(&self) -> Result<String, CryptoError> {
        self.key.key_id()
    }

    fn verify(&self, data: &mut dyn Read, signature: &[u8]) -> Result<(), CryptoError> {
        let message = read_all(data)?;
        self.key.verify_scheme(self.key.default_scheme(self.rsa_hash), &message, signature)
    }

    fn bytes(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(self.key.to_pem()?.into_bytes())
    }
}

// ============================================================================
// SECTION: Loaders
// ============================================================================

/// Loads a signer from a private key PEM, detecting the key type.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPem`] or [`CryptoError::UnsupportedKeyType`].
pub fn load_signer_from_pem(pem: &[u8]) -> Result<KeySigner, CryptoError> {
    let text = std::str::from_utf8(pem).map_err(|err| CryptoError::InvalidPem(err.to_string()))?;
    Ok(KeySigner::new(PrivateKey::from_pem(text)?))
}

/// Loads a verifier from a public key or certificate PEM.
///
/// Certificate input yields an [`X509Verifier`] without trust roots; callers
/// attach roots before chain validation.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPem`] or [`CryptoError::UnsupportedKeyType`].
pub fn load_verifier_from_pem(pem: &[u8]) -> Result<Box<dyn Verifier>, CryptoError> {
    let text = std::str::from_utf8(pem).map_err(|err| CryptoError::InvalidPem(err.to_string()))?;
    if text.contains("-----BEGIN CERTIFICATE-----") {
        let leaf = parse_certificate_pem(pem)?;
        return Ok(Box::new(X509Verifier::new(
            leaf,
            Vec::new(),
            Vec::new(),
            OffsetDateTime::now_utc(),
        )?));
    }
    Ok(Box::new(KeyVerifier::new(PublicKey::from_pem(text)?)))
}

/// Reads a key or certificate file with the size cap applied.
///
/// # Errors
///
/// Returns [`CryptoError::Io`] when reading fails or the file is too large.
pub fn read_key_file(path: &Path) -> Result<Vec<u8>, CryptoError> {
    let file = File::open(path)
        .map_err(|err| CryptoError::Io(format!("{}: {err}", path.display())))?;
    let mut bytes = Vec::new();
    file.take(MAX_KEY_FILE_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|err| CryptoError::Io(format!("{}: {err}", path.display())))?;
    if u64::try_from(bytes.len()).unwrap_or(u64::MAX) > MAX_KEY_FILE_BYTES {
        return Err(CryptoError::Io(format!(
            "{}: exceeds size limit of {MAX_KEY_FILE_BYTES} bytes",
            path.display()
        )));
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Signer Providers
// ============================================================================

/// Option bag for the file signer provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSignerOptions {
    /// Private key PEM path.
    pub key_path: PathBuf,
    /// Optional leaf certificate PEM path.
    pub cert_path: Option<PathBuf>,
    /// Intermediate certificate PEM paths, leaf-ward first.
    pub intermediate_paths: Vec<PathBuf>,
}

/// Signer acquisition mechanisms.
pub enum SignerProvider {
    /// Keys and certificates loaded from local PEM files.
    File(FileSignerOptions),
    /// Signer constructed elsewhere (KMS, Fulcio, SPIFFE).
    External(Box<dyn Signer>),
}

impl SignerProvider {
    /// Builds a provider from a named option bag.
    ///
    /// The file provider recognises `key-path`, `cert-path`, and
    /// `intermediate-paths`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Config`] for unknown providers or missing keys.
    pub fn from_options(
        provider: &str,
        options: &BTreeMap<String, Vec<String>>,
    ) -> Result<Self, CryptoError> {
        match provider {
            "file" => {
                let key_path = options
                    .get("key-path")
                    .and_then(|values| values.first())
                    .ok_or_else(|| {
                        CryptoError::Config("file signer requires key-path".to_string())
                    })?;
                let cert_path = options
                    .get("cert-path")
                    .and_then(|values| values.first())
                    .map(PathBuf::from);
                let intermediate_paths = options
                    .get("intermediate-paths")
                    .map(|values| values.iter().map(PathBuf::from).collect())
                    .unwrap_or_default();
                Ok(Self::File(FileSignerOptions {
                    key_path: PathBuf::from(key_path),
                    cert_path,
                    intermediate_paths,
                }))
            }
            other => Err(CryptoError::Config(format!("unknown signer provider: {other}"))),
        }
    }

    /// Resolves the provider into a signer.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] when files cannot be read or keys do not parse.
    pub fn into_signer(self) -> Result<Box<dyn Signer>, CryptoError> {
        match self {
            Self::External(signer) => Ok(signer),
            Self::File(options) => {
                let key = load_signer_from_pem(&read_key_file(&options.key_path)?)?;
                let Some(cert_path) = options.cert_path else {
                    return Ok(Box::new(key));
                };
                let leaf = parse_certificate_pem(&read_key_file(&cert_path)?)?;
                let mut intermediates = Vec::new();
                for path in &options.intermediate_paths {
                    intermediates.extend(parse_certificates_pem(&read_key_file(path)?)?);
                }
                Ok(Box::new(X509Signer::new(Box::new(key), leaf, intermediates, Vec::new())?))
            }
        }
    }
}
