// crates/witness-core/src/intoto.rs
// ============================================================================
// Module: In-toto Statements
// Description: Statement wrapper binding subjects to a typed predicate.
// Purpose: Produce canonical statement bytes for envelope payloads.
// Dependencies: serde, serde_json, crate::core::digest
// ============================================================================

//! ## Overview
//! Statements are built from an ordered subject map, so the subject array is
//! sorted by name and each digest set is sorted by hash name. Predicates are
//! held as [`serde_json::Value`], whose object keys serialize in sorted order;
//! decoding and re-encoding a statement therefore reproduces its bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::digest::DigestSet;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Statement type URI.
pub const STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v0.1";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Statement subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject name.
    pub name: String,
    /// Subject digests.
    pub digest: DigestSet,
}

/// In-toto statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement type URI.
    #[serde(rename = "_type")]
    pub statement_type: String,
    /// Subjects sorted by name.
    pub subject: Vec<Subject>,
    /// Predicate type URI.
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    /// Predicate body.
    pub predicate: Value,
}

/// Errors raised while building or decoding statements.
#[derive(Debug, Error)]
pub enum StatementError {
    /// A subject carried an empty digest set.
    #[error("subject {0} has an empty digest set")]
    EmptyDigest(String),
    /// Statement JSON could not be decoded or encoded.
    #[error("invalid statement: {0}")]
    Codec(String),
    /// Statement type is not the supported in-toto version.
    #[error("unsupported statement type: {0}")]
    UnsupportedType(String),
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl Statement {
    /// Builds a statement from a predicate and an ordered subject map.
    ///
    /// # Errors
    ///
    /// Returns [`StatementError::EmptyDigest`] when any subject has no digests.
    pub fn new(
        predicate_type: impl Into<String>,
        predicate: Value,
        subjects: &BTreeMap<String, DigestSet>,
    ) -> Result<Self, StatementError> {
        let mut subject = Vec::with_capacity(subjects.len());
        for (name, digest) in subjects {
            if digest.is_empty() {
                return Err(StatementError::EmptyDigest(name.clone()));
            }
            subject.push(Subject {
                name: name.clone(),
                digest: digest.clone(),
            });
        }
        Ok(Self {
            statement_type: STATEMENT_TYPE.to_string(),
            subject,
            predicate_type: predicate_type.into(),
            predicate,
        })
    }

    /// Encodes the statement as JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StatementError::Codec`] when serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, StatementError> {
        serde_json::to_vec(self).map_err(|err| StatementError::Codec(err.to_string()))
    }

    /// Decodes a statement from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StatementError::Codec`] for malformed JSON and
    /// [`StatementError::UnsupportedType`] for other statement versions.
    pub fn from_json(bytes: &[u8]) -> Result<Self, StatementError> {
        let statement: Self =
            serde_json::from_slice(bytes).map_err(|err| StatementError::Codec(err.to_string()))?;
        if statement.statement_type != STATEMENT_TYPE {
            return Err(StatementError::UnsupportedType(statement.statement_type));
        }
        Ok(statement)
    }
}
