// crates/witness-core/src/attestation/registry.rs
// ============================================================================
// Module: Attestor Registry
// Description: Name- and type-keyed table of attestor factories.
// Purpose: Resolve requested attestors to fresh instances with their phase,
//          schema, and documentation.
// Dependencies: serde_json, thiserror, crate::attestation
// ============================================================================

//! ## Overview
//! Each [`RegistryEntry`] carries a factory, the declared run phase, an
//! always-run flag, a JSON-schema reflector, and optional documentation.
//! Registration rejects duplicate names and duplicate type URIs. The table is
//! written during process start and read-only afterwards.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::attestation::AttestationError;
use crate::attestation::Attestor;
use crate::attestation::AttestorOptions;
use crate::attestation::RunPhase;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Factory producing a fresh attestor from run options.
pub type AttestorFactory = fn(&AttestorOptions) -> Result<Box<dyn Attestor>, AttestationError>;

/// Documentation record for an attestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestorDocs {
    /// One-paragraph summary.
    pub summary: &'static str,
    /// Option names with descriptions.
    pub options: &'static [(&'static str, &'static str)],
}

/// Registry row.
#[derive(Clone, Copy)]
pub struct RegistryEntry {
    /// Attestor name.
    pub name: &'static str,
    /// Predicate type URI.
    pub type_uri: &'static str,
    /// Declared run phase.
    pub phase: RunPhase,
    /// Scheduled on every run regardless of the requested list.
    pub always_run: bool,
    /// Instance factory.
    pub factory: AttestorFactory,
    /// JSON-schema reflector for the predicate.
    pub schema: fn() -> Value,
    /// Optional documentation.
    pub docs: Option<AttestorDocs>,
}

/// Errors raised by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Name or type URI already registered.
    #[error("attestor already registered: {0}")]
    Duplicate(String),
    /// No attestor matched.
    #[error("attestor not found: {0}")]
    NotFound(String),
    /// Factory failed.
    #[error("failed to create attestor {name}: {source}")]
    Factory {
        /// Attestor name.
        name: String,
        /// Factory failure.
        #[source]
        source: AttestationError,
    },
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Attestor registry keyed by name and type URI.
#[derive(Default, Clone)]
pub struct AttestorRegistry {
    /// Entries keyed by name.
    by_name: BTreeMap<&'static str, RegistryEntry>,
    /// Type URI to name index.
    by_type: BTreeMap<&'static str, &'static str>,
}

impl AttestorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the name or type URI is taken.
    pub fn register(&mut self, entry: RegistryEntry) -> Result<(), RegistryError> {
        if self.by_name.contains_key(entry.name) {
            return Err(RegistryError::Duplicate(entry.name.to_string()));
        }
        if self.by_type.contains_key(entry.type_uri) {
            return Err(RegistryError::Duplicate(entry.type_uri.to_string()));
        }
        self.by_type.insert(entry.type_uri, entry.name);
        self.by_name.insert(entry.name, entry);
        Ok(())
    }

    /// Looks up an entry by name or type URI.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when nothing matches.
    pub fn get(&self, name_or_type: &str) -> Result<&RegistryEntry, RegistryError> {
        self.by_name
            .get(name_or_type)
            .or_else(|| self.by_type.get(name_or_type).and_then(|name| self.by_name.get(name)))
            .ok_or_else(|| RegistryError::NotFound(name_or_type.to_string()))
    }

    /// Creates a fresh attestor by name or type URI.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] or [`RegistryError::Factory`].
    pub fn create(
        &self,
        name_or_type: &str,
        options: &AttestorOptions,
    ) -> Result<Box<dyn Attestor>, RegistryError> {
        let entry = self.get(name_or_type)?;
        (entry.factory)(options).map_err(|source| RegistryError::Factory {
            name: entry.name.to_string(),
            source,
        })
    }

    /// Iterates entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.by_name.values()
    }

    /// Returns the always-run entries in name order.
    #[must_use]
    pub fn always_run(&self) -> Vec<&RegistryEntry> {
        self.by_name.values().filter(|entry| entry.always_run).collect()
    }
}
