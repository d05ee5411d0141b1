// crates/witness-attestors/src/aws.rs
// ============================================================================
// Module: AWS Instance Identity Attestor
// Description: Signed EC2 instance identity document.
// Purpose: Bind a build to the EC2 instance it ran on.
// Dependencies: base64, serde, witness-core
// ============================================================================

//! ## Overview
//! The attestor obtains an IMDSv2 session token, fetches the identity
//! document and its signature, and verifies the signature with RSA PKCS#1
//! v1.5 over SHA-256. The default verification key is the public EC2
//! identity certificate shipped with this crate; the `ca-pem` option points
//! at another certificate or public key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::AttestorOptions;
use witness_core::Capability;
use witness_core::DigestSet;
use witness_core::RunPhase;
use witness_core::core::encoding::decode_base64;
use witness_core::crypto::PublicKey;
use witness_core::crypto::SignatureScheme;
use witness_core::crypto::signer::read_key_file;
use witness_core::crypto::x509::certificate_public_key;
use witness_core::crypto::x509::parse_certificate_pem;

use crate::http::HttpFetcher;
use crate::subject::insert_value_subject;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "aws";

/// Predicate type URI.
pub const TYPE_URI: &str = "https://witness.dev/attestations/aws/v0.1";

/// Option key overriding the metadata service base URL.
pub const OPTION_METADATA_URL: &str = "metadata-url";

/// Option key naming a PEM certificate or public key file.
pub const OPTION_CA_PEM: &str = "ca-pem";

/// Default metadata service base URL.
pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254";

/// Public EC2 identity document signing certificate.
pub const AWS_IDENTITY_CERT_PEM: &str = include_str!("../certs/aws-ec2-identity.pem");

/// Session token endpoint.
const TOKEN_PATH: &str = "/latest/api/token";

/// Identity document endpoint.
const DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";

/// Identity signature endpoint.
const SIGNATURE_PATH: &str = "/latest/dynamic/instance-identity/signature";

/// Session token lifetime requested from IMDSv2.
const TOKEN_TTL_SECONDS: &str = "21600";

/// Declared capabilities.
const CAPABILITIES: &[Capability] = &[Capability::Subjects];

// ============================================================================
// SECTION: Types
// ============================================================================

/// EC2 instance identity document fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityDocument {
    /// Availability zone.
    pub availability_zone: String,
    /// Private IPv4 address.
    pub private_ip: String,
    /// Document version.
    pub version: String,
    /// Region.
    pub region: String,
    /// Instance identifier.
    pub instance_id: String,
    /// Instance type.
    pub instance_type: String,
    /// Account identifier.
    pub account_id: String,
    /// Launch time.
    pub pending_time: String,
    /// AMI identifier.
    pub image_id: String,
    /// Kernel identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel_id: Option<String>,
    /// Ramdisk identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramdisk_id: Option<String>,
    /// CPU architecture.
    pub architecture: String,
}

/// AWS payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsPredicate {
    /// Parsed identity document.
    #[serde(flatten)]
    pub document: IdentityDocument,
    /// Raw identity document.
    pub raw_iid: String,
    /// Raw base64 signature.
    pub raw_sig: String,
}

/// AWS instance identity attestor.
#[derive(Debug)]
pub struct AwsAttestor {
    /// Metadata service base URL.
    metadata_url: String,
    /// Verification key.
    key: PublicKey,
    /// Recorded payload.
    predicate: AwsPredicate,
    /// Derived subjects.
    subjects: BTreeMap<String, DigestSet>,
}

impl AwsAttestor {
    /// Creates an attestor with an explicit metadata URL and key.
    #[must_use]
    pub fn new(metadata_url: impl Into<String>, key: PublicKey) -> Self {
        Self {
            metadata_url: metadata_url.into(),
            key,
            predicate: AwsPredicate::default(),
            subjects: BTreeMap::new(),
        }
    }

    /// Returns the recorded payload.
    #[must_use]
    pub const fn predicate_data(&self) -> &AwsPredicate {
        &self.predicate
    }

    /// Registry factory reading `metadata-url` and `ca-pem`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::InvalidOption`] when the key cannot be
    /// loaded.
    pub fn factory(options: &AttestorOptions) -> Result<Box<dyn Attestor>, AttestationError> {
        let key = match options.get(OPTION_CA_PEM) {
            Some(path) => {
                let bytes = read_key_file(Path::new(path)).map_err(|err| invalid_ca(&err))?;
                verification_key(&bytes)?
            }
            None => verification_key(AWS_IDENTITY_CERT_PEM.as_bytes())?,
        };
        let url = options.get(OPTION_METADATA_URL).unwrap_or(DEFAULT_METADATA_URL);
        Ok(Box::new(Self::new(url, key)))
    }

    /// Verifies the raw document against the raw signature.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Failed`] when decoding or verification
    /// fails.
    pub fn verify(&self) -> Result<(), AttestationError> {
        let signature = decode_base64(self.predicate.raw_sig.trim())
            .map_err(|err| AttestationError::Failed(format!("invalid iid signature: {err}")))?;
        self.key
            .verify_scheme(
                SignatureScheme::RsaPkcs1Sha256,
                self.predicate.raw_iid.as_bytes(),
                &signature,
            )
            .map_err(|err| AttestationError::Failed(format!("iid verification failed: {err}")))
    }
}

impl Attestor for AwsAttestor {
    fn name(&self) -> &str {
        NAME
    }

    fn type_uri(&self) -> &str {
        TYPE_URI
    }

    fn phase(&self) -> RunPhase {
        RunPhase::PreMaterial
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn attest(&mut self, context: &AttestationContext) -> Result<(), AttestationError> {
        let fetcher = HttpFetcher::new()?;
        let base = self.metadata_url.trim_end_matches('/');
        let token = fetcher.put(context, &format!("{base}{TOKEN_PATH}"), &[(
            "X-aws-ec2-metadata-token-ttl-seconds",
            TOKEN_TTL_SECONDS,
        )])?;
        let token = String::from_utf8_lossy(&token).trim().to_string();
        let headers = [("X-aws-ec2-metadata-token", token.as_str())];
        let document = fetcher.get(context, &format!("{base}{DOCUMENT_PATH}"), &headers)?;
        let signature = fetcher.get(context, &format!("{base}{SIGNATURE_PATH}"), &headers)?;

        self.predicate.raw_iid = String::from_utf8_lossy(&document).into_owned();
        self.predicate.raw_sig = String::from_utf8_lossy(&signature).into_owned();
        self.verify()?;
        self.predicate.document = serde_json::from_str(&self.predicate.raw_iid)?;

        let document = &self.predicate.document;
        let hashes = context.hashes();
        let mut subjects = BTreeMap::new();
        insert_value_subject(&mut subjects, "instanceid", &document.instance_id, hashes)?;
        insert_value_subject(&mut subjects, "accountid", &document.account_id, hashes)?;
        insert_value_subject(&mut subjects, "imageid", &document.image_id, hashes)?;
        insert_value_subject(&mut subjects, "privateip", &document.private_ip, hashes)?;
        self.subjects = subjects;
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.predicate)?)
    }

    fn subjects(&self) -> BTreeMap<String, DigestSet> {
        self.subjects.clone()
    }
}

/// Loads a verification key from a certificate or public key PEM.
///
/// # Errors
///
/// Returns [`AttestationError::InvalidOption`] when no key can be decoded.
pub fn verification_key(pem: &[u8]) -> Result<PublicKey, AttestationError> {
    let text = String::from_utf8_lossy(pem);
    if text.contains("BEGIN CERTIFICATE") {
        let certificate = parse_certificate_pem(pem).map_err(|err| invalid_ca(&err))?;
        return certificate_public_key(&certificate).map_err(|err| invalid_ca(&err));
    }
    PublicKey::from_pem(&text).map_err(|err| invalid_ca(&err))
}

/// Builds the `ca-pem` option error.
fn invalid_ca(err: &dyn std::fmt::Display) -> AttestationError {
    AttestationError::InvalidOption {
        option: OPTION_CA_PEM.to_string(),
        message: err.to_string(),
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the AWS payload.
#[must_use]
pub fn schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "aws",
        "type": "object",
        "required": ["instanceId", "accountId", "raw_iid", "raw_sig"],
        "properties": {
            "availabilityZone": {"type": "string"},
            "privateIp": {"type": "string"},
            "version": {"type": "string"},
            "region": {"type": "string"},
            "instanceId": {"type": "string"},
            "instanceType": {"type": "string"},
            "accountId": {"type": "string"},
            "pendingTime": {"type": "string"},
            "imageId": {"type": "string"},
            "kernelId": {"type": "string"},
            "ramdiskId": {"type": "string"},
            "architecture": {"type": "string"},
            "raw_iid": {"type": "string"},
            "raw_sig": {"type": "string"},
        },
    })
}
