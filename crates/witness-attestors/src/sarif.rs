// crates/witness-attestors/src/sarif.rs
// ============================================================================
// Module: SARIF Attestor
// Description: Static-analysis report captured from the products.
// Purpose: Embed the SARIF report a build step produced.
// Dependencies: serde, witness-core
// ============================================================================

//! ## Overview
//! The first JSON or text product carrying a `version` string and a `runs`
//! array is embedded. The report becomes a `sarif:<path>` subject.

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
pub const NAME: &str = "sarif";

/// Predicate type URI.
pub const TYPE_URI: &str = "https://witness.dev/attestations/sarif/v0.1";

/// Accepted product MIME types.
const ACCEPTED: &[&str] = &[JSON_MIME, TEXT_MIME];

/// Declared capabilities.
const CAPABILITIES: &[Capability] = &[Capability::Subjects];

// ============================================================================
// SECTION: Types
// ============================================================================

/// SARIF payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SarifPredicate {
    /// Parsed report.
    pub report: Value,
    /// Report path relative to the working directory.
    #[serde(rename = "reportFileName")]
    pub report_file_name: String,
    /// Report digest.
    #[serde(rename = "reportDigestSet")]
    pub report_digest_set: DigestSet,
}

/// SARIF attestor.
#[derive(Debug, Default)]
pub struct SarifAttestor {
    /// Recorded payload.
    predicate: SarifPredicate,
}

impl SarifAttestor {
    /// Creates a SARIF attestor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded payload.
    #[must_use]
    pub const fn predicate_data(&self) -> &SarifPredicate {
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

/// Returns true when a document looks like a SARIF log.
#[must_use]
pub fn is_sarif(document: &Value) -> bool {
    document.get("version").is_some_and(Value::is_string)
        && document.get("runs").is_some_and(Value::is_array)
}

impl Attestor for SarifAttestor {
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
        let candidate = find_candidate(context, ACCEPTED, "no sarif report found", |_, path| {
            read_json(path).filter(is_sarif)
        })?;
        self.predicate = SarifPredicate {
            report: candidate.parsed,
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
            format!("sarif:{}", self.predicate.report_file_name),
            self.predicate.report_digest_set.clone(),
        )])
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the SARIF payload.
#[must_use]
pub fn schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "sarif",
        "type": "object",
        "required": ["report", "reportFileName", "reportDigestSet"],
        "properties": {
            "report": {
                "type": "object",
                "required": ["version", "runs"],
                "properties": {
                    "version": {"type": "string"},
                    "runs": {"type": "array"},
                },
            },
            "reportFileName": {"type": "string"},
            "reportDigestSet": crate::registry::digest_set_schema(),
        },
    })
}
