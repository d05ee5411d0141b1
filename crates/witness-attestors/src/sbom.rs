// crates/witness-attestors/src/sbom.rs
// ============================================================================
// Module: SBOM Attestor
// Description: Software bill of materials captured from the products.
// Purpose: Embed an SPDX or CycloneDX document a build step produced.
// Dependencies: serde, witness-core
// ============================================================================

//! ## Overview
//! SPDX JSON is recognised by `spdxVersion`, CycloneDX JSON by `bomFormat`.
//! The document becomes an `sbom:<path>` subject.

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
use witness_core::RunPhase;

use crate::ingest::find_candidate;
use crate::ingest::read_json;
use crate::mime::JSON_MIME;
use crate::mime::TEXT_MIME;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "sbom";

/// Predicate type URI.
pub const TYPE_URI: &str = "https://witness.dev/attestations/sbom/v0.1";

/// Accepted product MIME types.
const ACCEPTED: &[&str] = &[JSON_MIME, TEXT_MIME];

/// Declared capabilities.
const CAPABILITIES: &[Capability] = &[Capability::Subjects];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Recognised SBOM formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SbomFormat {
    /// SPDX JSON.
    #[default]
    Spdx,
    /// CycloneDX JSON.
    CycloneDx,
}

/// SBOM payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SbomPredicate {
    /// Document format.
    pub format: SbomFormat,
    /// Parsed document.
    pub sbom: Value,
    /// Document path relative to the working directory.
    #[serde(rename = "reportFileName")]
    pub report_file_name: String,
    /// Document digest.
    #[serde(rename = "reportDigestSet")]
    pub report_digest_set: DigestSet,
}

/// SBOM attestor.
#[derive(Debug, Default)]
pub struct SbomAttestor {
    /// Recorded payload.
    predicate: SbomPredicate,
}

impl SbomAttestor {
    /// Creates an SBOM attestor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded payload.
    #[must_use]
    pub const fn predicate_data(&self) -> &SbomPredicate {
        &self.predicate
    }

    /// Registry factory.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the registry factory type.
    pub fn factory(_options: &AttestorOptions) -> Result<Box<dyn Attestor>, AttestationError> {
        Ok(Box::new(Self::new()))
    }
}

/// Returns the SBOM format of a document, if any.
#[must_use]
pub fn sbom_format(document: &Value) -> Option<SbomFormat> {
    if document.get("spdxVersion").is_some_and(Value::is_string) {
        Some(SbomFormat::Spdx)
    } else if document.get("bomFormat").and_then(Value::as_str) == Some("CycloneDX") {
        Some(SbomFormat::CycloneDx)
    } else {
        None
    }
}

impl Attestor for SbomAttestor {
    fn name(&self) -> &str {
        NAME
    }

    fn type_uri(&self) -> &str {
        TYPE_URI
    }

    fn phase(&self) -> RunPhase {
        RunPhase::PostProduct
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn attest(&mut self, context: &AttestationContext) -> Result<(), AttestationError> {
        let candidate = find_candidate(context, ACCEPTED, "no sbom document found", |_, path| {
            let document = read_json(path)?;
            sbom_format(&document).map(|format| (format, document))
        })?;
        let (format, sbom) = candidate.parsed;
        self.predicate = SbomPredicate {
            format,
            sbom,
            report_file_name: candidate.path,
            report_digest_set: candidate.digest,
        };
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.predicate)?)
    }

    fn subjects(&self) -> BTreeMap<String, DigestSet> {
        if self.predicate.report_file_name.is_empty() {
            return BTreeMap::new();
        }
        BTreeMap::from([(
            format!("sbom:{}", self.predicate.report_file_name),
            self.predicate.report_digest_set.clone(),
        )])
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the SBOM payload.
#[must_use]
pub fn schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "sbom",
        "type": "object",
        "required": ["format", "sbom", "reportFileName", "reportDigestSet"],
        "properties": {
            "format": {"enum": ["spdx", "cyclonedx"]},
            "sbom": {"type": "object"},
            "reportFileName": {"type": "string"},
            "reportDigestSet": crate::registry::digest_set_schema(),
        },
    })
}
