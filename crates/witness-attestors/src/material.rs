// crates/witness-attestors/src/material.rs
// ============================================================================
// Module: Material Attestor
// Description: Pre-execution snapshot of the working directory.
// Purpose: Record every file's digest before the command runs.
// Dependencies: serde_json, witness-core
// ============================================================================

//! ## Overview
//! The material attestor always runs and leads the material phase. Its
//! payload is a JSON map of relative path to digest set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use serde_json::json;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::AttestorOptions;
use witness_core::Capability;
use witness_core::DigestSet;
use witness_core::RunPhase;
use witness_core::attestation::MATERIAL_TYPE;

use crate::file::record_artifacts;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "material";

/// Declared capabilities.
const CAPABILITIES: &[Capability] = &[Capability::Materials];

// ============================================================================
// SECTION: Attestor
// ============================================================================

/// Working-directory snapshot taken before execution.
#[derive(Debug, Default)]
pub struct MaterialAttestor {
    /// Recorded materials keyed by relative path.
    materials: BTreeMap<String, DigestSet>,
    /// Directory the snapshot was taken from.
    directory: Option<PathBuf>,
}

impl MaterialAttestor {
    /// Creates an empty material attestor.
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

impl Attestor for MaterialAttestor {
    fn name(&self) -> &str {
        NAME
    }

    fn type_uri(&self) -> &str {
        MATERIAL_TYPE
    }

    fn phase(&self) -> RunPhase {
        RunPhase::Material
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn attest(&mut self, context: &AttestationContext) -> Result<(), AttestationError> {
        self.materials = record_artifacts(
            context.working_dir(),
            &BTreeMap::new(),
            context.hashes(),
            Some(context),
        )?;
        self.directory = Some(context.working_dir().to_path_buf());
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.materials)?)
    }

    fn materials(&self) -> BTreeMap<String, DigestSet> {
        self.materials.clone()
    }

    fn material_dir(&self) -> Option<PathBuf> {
        self.directory.clone()
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the material payload.
#[must_use]
pub fn schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "material",
        "type": "object",
        "additionalProperties": crate::registry::digest_set_schema(),
    })
}
