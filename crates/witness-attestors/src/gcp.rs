// crates/witness-attestors/src/gcp.rs
// ============================================================================
// Module: GCP Instance Identity Attestor
// Description: Verified Compute Engine identity token.
// Purpose: Bind a build to the GCP instance or workload it ran on.
// Dependencies: serde, witness-core
// ============================================================================

//! ## Overview
//! The identity token is fetched from the metadata server with the
//! `Metadata-Flavor: Google` header and verified through the JWT attestor
//! against the Google key set. Instance fields come from the token's
//! `google` claim; workload-identity tokens lack that claim, so the fields
//! are read from the metadata endpoints instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

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
use witness_core::LogEvent;
use witness_core::LogLevel;
use witness_core::RunPhase;

use crate::http::HttpFetcher;
use crate::jwt::JwtAttestor;
use crate::jwt::JwtPredicate;
use crate::subject::insert_value_subject;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "gcp-iit";

/// Predicate type URI.
pub const TYPE_URI: &str = "https://witness.dev/attestations/gcp-iit/v0.1";

/// Option key overriding the metadata server base URL.
pub const OPTION_METADATA_URL: &str = "metadata-url";

/// Option key overriding the key-set URL.
pub const OPTION_JWKS_URL: &str = "jwks-url";

/// Option key overriding the token audience.
pub const OPTION_AUDIENCE: &str = "audience";

/// Default metadata server base URL.
pub const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal";

/// Google OAuth2 key set.
pub const DEFAULT_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Default identity token audience.
pub const DEFAULT_AUDIENCE: &str = "witness-node-attestor";

/// Metadata request header.
const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");

/// Declared capabilities.
const CAPABILITIES: &[Capability] = &[Capability::Subjects];

// ============================================================================
// SECTION: Types
// ============================================================================

/// GCP payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpPredicate {
    /// Verified identity token.
    pub jwt: JwtPredicate,
    /// Project identifier.
    pub project_id: String,
    /// Project number.
    pub project_number: String,
    /// Instance zone.
    pub zone: String,
    /// Instance identifier.
    pub instance_id: String,
    /// Instance host name.
    pub instance_hostname: String,
    /// Instance creation time.
    pub instance_creation_timestamp: String,
    /// Confidential computing flag.
    pub instance_confidentiality: String,
    /// License identifiers.
    pub licence_id: Vec<String>,
    /// Service account email.
    pub email: String,
    /// GKE cluster name.
    pub cluster_name: String,
    /// GKE cluster identifier.
    pub cluster_uid: String,
    /// GKE cluster location.
    pub cluster_location: String,
}

/// GCP instance identity attestor.
#[derive(Debug)]
pub struct GcpAttestor {
    /// Metadata server base URL.
    metadata_url: String,
    /// Key-set URL.
    jwks_url: String,
    /// Token audience.
    audience: String,
    /// Recorded payload.
    predicate: GcpPredicate,
    /// Derived subjects.
    subjects: BTreeMap<String, DigestSet>,
}

impl Default for GcpAttestor {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_URL, DEFAULT_JWKS_URL)
    }
}

impl GcpAttestor {
    /// Creates an attestor with explicit endpoints.
    #[must_use]
    pub fn new(metadata_url: impl Into<String>, jwks_url: impl Into<String>) -> Self {
        Self {
            metadata_url: metadata_url.into(),
            jwks_url: jwks_url.into(),
            audience: DEFAULT_AUDIENCE.to_string(),
            predicate: GcpPredicate::default(),
            subjects: BTreeMap::new(),
        }
    }

    /// Returns the recorded payload.
    #[must_use]
    pub const fn predicate_data(&self) -> &GcpPredicate {
        &self.predicate
    }

    /// Registry factory reading `metadata-url`, `jwks-url`, and `audience`.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the registry factory type.
    pub fn factory(options: &AttestorOptions) -> Result<Box<dyn Attestor>, AttestationError> {
        let mut attestor = Self::new(
            options.get(OPTION_METADATA_URL).unwrap_or(DEFAULT_METADATA_URL),
            options.get(OPTION_JWKS_URL).unwrap_or(DEFAULT_JWKS_URL),
        );
        if let Some(audience) = options.get(OPTION_AUDIENCE) {
            attestor.audience = audience.to_string();
        }
        Ok(Box::new(attestor))
    }

    /// Returns a metadata URL for a path below `computeMetadata/v1`.
    fn metadata(&self, path: &str) -> String {
        format!("{}/computeMetadata/v1/{path}", self.metadata_url.trim_end_matches('/'))
    }

    /// Fills instance fields from metadata endpoints.
    fn read_workload_metadata(&mut self, context: &AttestationContext, fetcher: &HttpFetcher) {
        let fields: [(&str, &mut String); 8] = [
            ("instance/hostname", &mut self.predicate.instance_hostname),
            ("instance/id", &mut self.predicate.instance_id),
            ("instance/zone", &mut self.predicate.zone),
            ("instance/attributes/cluster-name", &mut self.predicate.cluster_name),
            ("instance/attributes/cluster-uid", &mut self.predicate.cluster_uid),
            ("instance/attributes/cluster-location", &mut self.predicate.cluster_location),
            ("project/project-id", &mut self.predicate.project_id),
            ("project/numeric-project-id", &mut self.predicate.project_number),
        ];
        let base = self.metadata_url.trim_end_matches('/');
        for (path, slot) in fields {
            let url = format!("{base}/computeMetadata/v1/{path}");
            match fetcher.get(context, &url, &[METADATA_FLAVOR]) {
                Ok(body) => *slot = String::from_utf8_lossy(&body).trim().to_string(),
                Err(err) => context.log(
                    &LogEvent::new("metadata_unavailable", LogLevel::Debug, NAME, err.to_string())
                        .with_field("path", path),
                ),
            }
        }
    }
}

impl Attestor for GcpAttestor {
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
        let token_url = format!(
            "{}?audience={}&format=full&licenses=TRUE",
            self.metadata("instance/service-accounts/default/identity"),
            self.audience
        );
        let token = fetcher.get(context, &token_url, &[METADATA_FLAVOR])?;
        let token = String::from_utf8_lossy(&token).trim().to_string();

        let mut jwt = JwtAttestor::new(token, self.jwks_url.clone());
        jwt.verify(context, &fetcher)?;
        self.predicate.jwt = jwt.predicate_data().clone();
        let claims = &self.predicate.jwt.claims;
        self.predicate.email = claims.get("email").map(claim_string).unwrap_or_default();

        match claims.get("google").and_then(|google| google.get("compute_engine")).cloned() {
            Some(engine) => {
                let field = |name: &str| engine.get(name).map(claim_string).unwrap_or_default();
                self.predicate.project_id = field("project_id");
                self.predicate.project_number = field("project_number");
                self.predicate.zone = field("zone");
                self.predicate.instance_id = field("instance_id");
                self.predicate.instance_hostname = field("instance_name");
                self.predicate.instance_creation_timestamp = field("instance_creation_timestamp");
                self.predicate.instance_confidentiality = field("instance_confidentiality");
                self.predicate.licence_id = engine
                    .get("license_id")
                    .and_then(Value::as_array)
                    .map(|ids| ids.iter().map(claim_string).collect())
                    .unwrap_or_default();
            }
            None => self.read_workload_metadata(context, &fetcher),
        }

        let hashes = context.hashes();
        let predicate = &self.predicate;
        let mut subjects = BTreeMap::new();
        insert_value_subject(&mut subjects, "instanceid", &predicate.instance_id, hashes)?;
        insert_value_subject(&mut subjects, "instancename", &predicate.instance_hostname, hashes)?;
        insert_value_subject(&mut subjects, "projectid", &predicate.project_id, hashes)?;
        insert_value_subject(&mut subjects, "projectnumber", &predicate.project_number, hashes)?;
        insert_value_subject(&mut subjects, "clusteruid", &predicate.cluster_uid, hashes)?;
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

/// Renders a claim value as a string.
fn claim_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the GCP payload.
#[must_use]
pub fn schema() -> Value {
    let text = json!({"type": "string"});
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "gcp-iit",
        "type": "object",
        "required": ["jwt", "instance_id", "project_id"],
        "properties": {
            "jwt": crate::jwt::schema(),
            "project_id": text,
            "project_number": text,
            "zone": text,
            "instance_id": text,
            "instance_hostname": text,
            "instance_creation_timestamp": text,
            "instance_confidentiality": text,
            "licence_id": {"type": "array", "items": text},
            "email": text,
            "cluster_name": text,
            "cluster_uid": text,
            "cluster_location": text,
        },
    })
}
