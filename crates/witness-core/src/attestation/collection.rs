// crates/witness-core/src/attestation/collection.rs
// ============================================================================
// Module: Attestation Collection
// Description: Ordered bundle of attestor payloads from one run.
// Purpose: Assemble the statement predicate and the subject union, and read
//          materials and products back out of decoded collections.
// Dependencies: serde, serde_json, time, crate::attestation, crate::logging
// ============================================================================

//! ## Overview
//! A [`Collection`] keeps attestor payloads in completion order. The subject
//! set is the union of every completed attestor's subjects; on a key
//! collision the later attestor wins and the collision is logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::attestation::AttestationError;
use crate::attestation::MATERIAL_TYPE;
use crate::attestation::PRODUCT_TYPE;
use crate::attestation::Product;
use crate::attestation::context::CompletedAttestation;
use crate::core::digest::DigestSet;
use crate::logging::LogEvent;
use crate::logging::LogLevel;
use crate::logging::LogSink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Predicate type URI of attestation collections.
pub const COLLECTION_TYPE: &str = "https://witness.testifysec.com/attestation-collection/v0.1";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Named, ordered attestation bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Step name.
    pub name: String,
    /// Attestations in completion order.
    pub attestations: Vec<CollectionAttestation>,
}

/// One attestor payload inside a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionAttestation {
    /// Predicate type URI.
    #[serde(rename = "type")]
    pub type_uri: String,
    /// Attestor payload.
    pub attestation: Value,
    /// Instant the attestor started.
    #[serde(with = "time::serde::rfc3339")]
    pub starttime: OffsetDateTime,
    /// Instant the attestor finished.
    #[serde(with = "time::serde::rfc3339")]
    pub endtime: OffsetDateTime,
}

// ============================================================================
// SECTION: Assembly
// ============================================================================

impl Collection {
    /// Builds a collection from completed attestors.
    #[must_use]
    pub fn from_completed(name: impl Into<String>, completed: &[CompletedAttestation]) -> Self {
        Self {
            name: name.into(),
            attestations: completed
                .iter()
                .map(|entry| CollectionAttestation {
                    type_uri: entry.type_uri.clone(),
                    attestation: entry.predicate.clone(),
                    starttime: entry.start_time,
                    endtime: entry.end_time,
                })
                .collect(),
        }
    }

    /// Returns the first attestation payload with a type URI.
    #[must_use]
    pub fn attestation(&self, type_uri: &str) -> Option<&Value> {
        self.attestations
            .iter()
            .find(|entry| entry.type_uri == type_uri)
            .map(|entry| &entry.attestation)
    }

    /// Indexes payloads by type URI (first occurrence wins).
    #[must_use]
    pub fn by_type(&self) -> BTreeMap<&str, &Value> {
        let mut index = BTreeMap::new();
        for entry in &self.attestations {
            index.entry(entry.type_uri.as_str()).or_insert(&entry.attestation);
        }
        index
    }

    /// Decodes the material map from a material payload.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Serialization`] when the payload is
    /// malformed.
    pub fn materials(&self) -> Result<BTreeMap<String, DigestSet>, AttestationError> {
        match self.attestation(MATERIAL_TYPE) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(BTreeMap::new()),
        }
    }

    /// Decodes the product map from a product payload.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Serialization`] when the payload is
    /// malformed.
    pub fn products(&self) -> Result<BTreeMap<String, Product>, AttestationError> {
        match self.attestation(PRODUCT_TYPE) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(BTreeMap::new()),
        }
    }
}

/// Unions subjects across completed attestors in completion order.
pub fn collect_subjects(
    completed: &[CompletedAttestation],
    log: &dyn LogSink,
) -> BTreeMap<String, DigestSet> {
    let mut subjects: BTreeMap<String, DigestSet> = BTreeMap::new();
    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    for entry in completed {
        for (name, digest) in &entry.subjects {
            if let Some(previous) = owners.get(name) {
                log.record(
                    &LogEvent::new(
                        "subject_collision",
                        LogLevel::Warn,
                        "collection",
                        format!("subject {name} overwritten"),
                    )
                    .with_field("subject", name.clone())
                    .with_field("previous", previous.clone())
                    .with_field("attestor", entry.name.clone()),
                );
            }
            owners.insert(name.clone(), entry.name.clone());
            subjects.insert(name.clone(), digest.clone());
        }
    }
    subjects
}
