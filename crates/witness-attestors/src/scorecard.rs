// crates/witness-attestors/src/scorecard.rs
// ============================================================================
// Module: Scorecard Attestor
// Description: OpenSSF scorecard result captured from the products.
// Purpose: Embed a repository security score with its source revision.
// Dependencies: serde, witness-core
// ============================================================================

//! ## Overview
//! A scorecard result is a JSON object with `repo.name`, a `scorecard`
//! version block, and a `checks` array. Subjects are `reponame:<name>`,
//! hashed over the name, and `commithash:<sha>` with a SHA-1 digest.

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
use witness_core::HashFunction;
use witness_core::RunPhase;

use crate::ingest::find_candidate;
use crate::ingest::read_json;
use crate::mime::JSON_MIME;
use crate::mime::TEXT_MIME;
use crate::subject::insert_value_subject;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "scorecard";

/// Predicate type URI.
pub const TYPE_URI: &str = "https://witness.dev/attestations/scorecard/v0.1";

/// Accepted product MIME types.
const ACCEPTED: &[&str] = &[JSON_MIME, TEXT_MIME];

/// Declared capabilities.
const CAPABILITIES: &[Capability] = &[Capability::Subjects];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Scorecard payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorecardPredicate {
    /// Parsed scorecard result.
    pub scorecard: Value,
    /// Report path relative to the working directory.
    #[serde(rename = "reportFileName")]
    pub report_file_name: String,
    /// Report digest.
    #[serde(rename = "reportDigestSet")]
    pub report_digest_set: DigestSet,
}

/// Scorecard attestor.
#[derive(Debug, Default)]
pub struct ScorecardAttestor {
    /// Recorded payload.
    predicate: ScorecardPredicate,
    /// Derived subjects.
    subjects: BTreeMap<String, DigestSet>,
}

impl ScorecardAttestor {
    /// Creates a scorecard attestor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

/// Returns true when a document looks like a scorecard result.
#[must_use]
pub fn is_scorecard(document: &Value) -> bool {
    document.pointer("/repo/name").is_some_and(Value::is_string)
        && document.get("scorecard").is_some_and(Value::is_object)
        && document.get("checks").is_some_and(Value::is_array)
}

impl Attestor for ScorecardAttestor {
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
        let candidate =
            find_candidate(context, ACCEPTED, "no scorecard result found", |_, path| {
                read_json(path).filter(is_scorecard)
            })?;

        let repo = candidate.parsed.pointer("/repo/name").and_then(Value::as_str).unwrap_or("");
        let commit = candidate.parsed.pointer("/repo/commit").and_then(Value::as_str).unwrap_or("");
        let mut subjects = BTreeMap::new();
        insert_value_subject(&mut subjects, "reponame", repo, context.hashes())?;
        if !commit.is_empty() {
            let mut digest = DigestSet::new();
            digest.insert(HashFunction::Sha1, commit);
            subjects.insert(format!("commithash:{commit}"), digest);
        }
        self.subjects = subjects;
        self.predicate = ScorecardPredicate {
            scorecard: candidate.parsed,
            report_file_name: candidate.path,
            report_digest_set: candidate.digest,
        };
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.predicate)?)
    }

    fn subjects(&self) -> BTreeMap<String, DigestSet> {
        self.subjects.clone()
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the scorecard payload.
#[must_use]
pub fn schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "scorecard",
        "type": "object",
        "required": ["scorecard", "reportFileName", "reportDigestSet"],
        "properties": {
            "scorecard": {
                "type": "object",
                "required": ["repo", "scorecard", "checks"],
                "properties": {
                    "date": {"type": "string"},
                    "repo": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "commit": {"type": "string"},
                        },
                    },
                    "scorecard": {"type": "object"},
                    "score": {"type": "number"},
                    "checks": {"type": "array"},
                },
            },
            "reportFileName": {"type": "string"},
            "reportDigestSet": crate::registry::digest_set_schema(),
        },
    })
}
