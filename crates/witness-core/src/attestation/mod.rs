// crates/witness-core/src/attestation/mod.rs
// ============================================================================
// Module: Attestation Model
// Description: Attestor trait, run phases, capabilities, and option bags.
// Purpose: Define the plugin surface shared by the attestor set, the runner,
//          and the policy verifier.
// Dependencies: serde, serde_json, thiserror, crate::core::digest
// ============================================================================

//! ## Overview
//! An [`Attestor`] observes one facet of a build and contributes a typed
//! predicate plus optional subjects, materials, products, and back-references.
//! Attestors declare the capabilities they satisfy; the context queries
//! completed attestors by capability rather than by concrete type.
//!
//! Run phases order execution:
//! `pre-material -> material -> execute -> product -> post-product`.
//! Always-run attestors (material and product) are flagged in the registry and
//! lead their phase.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod collection;
pub mod context;
pub mod registry;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::digest::DigestError;
use crate::core::digest::DigestSet;

pub use context::AttestationContext;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Type URI of the material attestor.
pub const MATERIAL_TYPE: &str = "https://witness.dev/attestations/material/v0.1";
/// Type URI of the product attestor.
pub const PRODUCT_TYPE: &str = "https://witness.dev/attestations/product/v0.1";
/// Type URI of the command-run attestor.
pub const COMMAND_RUN_TYPE: &str = "https://witness.dev/attestations/command-run/v0.1";

// ============================================================================
// SECTION: Phases and Capabilities
// ============================================================================

/// Run phase of an attestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunPhase {
    /// Before materials are recorded.
    PreMaterial,
    /// Material snapshot.
    Material,
    /// Command execution.
    Execute,
    /// Product snapshot.
    Product,
    /// After products are recorded.
    PostProduct,
}

impl RunPhase {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreMaterial => "pre-material",
            Self::Material => "material",
            Self::Execute => "execute",
            Self::Product => "product",
            Self::PostProduct => "post-product",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities an attestor can satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Contributes statement subjects.
    Subjects,
    /// Records materials.
    Materials,
    /// Records products.
    Products,
    /// Contributes back-references.
    Backrefs,
}

// ============================================================================
// SECTION: Artifact Records
// ============================================================================

/// Product record: inferred MIME type plus digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// MIME type inferred from leading content bytes.
    pub mime_type: String,
    /// Content digests.
    pub digest: DigestSet,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by attestors.
#[derive(Debug, Error)]
pub enum AttestationError {
    /// The attestor could not observe its domain.
    #[error("{0}")]
    Failed(String),
    /// A recomputed digest disagreed with the recorded product digest.
    #[error("integrity error: {0}")]
    Integrity(String),
    /// No product matched the attestor's acceptance list.
    #[error("no suitable candidate found: {0}")]
    NoCandidate(String),
    /// The user command exited unsuccessfully.
    #[error("command exited with code {code}")]
    CommandFailed {
        /// Exit code, or -1 when terminated by a signal.
        code: i32,
    },
    /// The run was cancelled.
    #[error("attestation cancelled")]
    Cancelled,
    /// Materials were recorded from a different directory.
    #[error("working directory {actual} does not match material directory {expected}")]
    WorkingDirMismatch {
        /// Directory materials were recorded from.
        expected: String,
        /// Directory the command ran in.
        actual: String,
    },
    /// Invalid attestor option.
    #[error("invalid option {option}: {message}")]
    InvalidOption {
        /// Option key.
        option: String,
        /// Failure detail.
        message: String,
    },
    /// Hashing failure.
    #[error(transparent)]
    Digest(#[from] DigestError),
    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(String),
    /// Network failure.
    #[error("network error: {0}")]
    Network(String),
}

impl From<serde_json::Error> for AttestationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AttestationError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// ============================================================================
// SECTION: Options
// ============================================================================

/// Per-run attestor options keyed by option name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttestorOptions {
    /// Option values in insertion order per key.
    values: BTreeMap<String, Vec<String>>,
}

impl AttestorOptions {
    /// Creates an empty option bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_default().push(value.into());
    }

    /// Appends a value and returns the bag.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the last value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|values| values.last()).map(String::as_str)
    }

    /// Returns every value for `key`.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map_or(&[], Vec::as_slice)
    }

    /// Parses a boolean option.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::InvalidOption`] for non-boolean values.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, AttestationError> {
        match self.get(key) {
            None => Ok(None),
            Some("true" | "1" | "yes") => Ok(Some(true)),
            Some("false" | "0" | "no") => Ok(Some(false)),
            Some(other) => Err(AttestationError::InvalidOption {
                option: key.to_string(),
                message: format!("expected a boolean, got {other}"),
            }),
        }
    }

    /// Iterates option keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

// ============================================================================
// SECTION: Attestor Trait
// ============================================================================

/// A component observing one facet of a build.
pub trait Attestor: Send {
    /// Stable attestor name.
    fn name(&self) -> &str;

    /// Predicate type URI.
    fn type_uri(&self) -> &str;

    /// Declared run phase.
    fn phase(&self) -> RunPhase;

    /// Declared capabilities.
    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    /// Observes the build and records the attestor's payload.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError`] when observation fails.
    fn attest(&mut self, context: &AttestationContext) -> Result<(), AttestationError>;

    /// Serializes the recorded payload.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Serialization`] when encoding fails.
    fn predicate(&self) -> Result<Value, AttestationError>;

    /// Subjects contributed to the statement.
    fn subjects(&self) -> BTreeMap<String, DigestSet> {
        BTreeMap::new()
    }

    /// Materials recorded by this attestor.
    fn materials(&self) -> BTreeMap<String, DigestSet> {
        BTreeMap::new()
    }

    /// Products recorded by this attestor.
    fn products(&self) -> BTreeMap<String, Product> {
        BTreeMap::new()
    }

    /// Back-references to related evidence.
    fn backrefs(&self) -> BTreeMap<String, DigestSet> {
        BTreeMap::new()
    }

    /// Directory materials were recorded from, for material recorders.
    fn material_dir(&self) -> Option<PathBuf> {
        None
    }
}
