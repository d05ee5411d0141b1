// crates/witness-attestors/src/product.rs
// ============================================================================
// Module: Product Attestor
// Description: Post-execution snapshot of new and modified files.
// Purpose: Record products with MIME labels and expose them as subjects.
// Dependencies: glob, serde_json, witness-core
// ============================================================================

//! ## Overview
//! The product attestor always runs and leads the product phase. It walks the
//! working directory against the material baseline, so unchanged files are
//! omitted and deleted files never appear. Optional include and exclude glob
//! patterns filter the recorded paths; exclusion wins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use glob::Pattern;
use serde_json::Value;
use serde_json::json;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::AttestorOptions;
use witness_core::Capability;
use witness_core::DigestSet;
use witness_core::Product;
use witness_core::RunPhase;
use witness_core::attestation::PRODUCT_TYPE;

use crate::file::record_artifacts;
use crate::mime::detect_file_mime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "product";

/// Option key for the include glob.
pub const OPTION_INCLUDE_GLOB: &str = "include-glob";

/// Option key for the exclude glob.
pub const OPTION_EXCLUDE_GLOB: &str = "exclude-glob";

/// Declared capabilities.
const CAPABILITIES: &[Capability] = &[Capability::Products, Capability::Subjects];

// ============================================================================
// SECTION: Attestor
// ============================================================================

/// Snapshot of files created or modified by the command.
#[derive(Debug, Default)]
pub struct ProductAttestor {
    /// Recorded products keyed by relative path.
    products: BTreeMap<String, Product>,
    /// Paths that must match at least one pattern, when non-empty.
    include: Vec<Pattern>,
    /// Paths matching any pattern are dropped.
    exclude: Vec<Pattern>,
}

impl ProductAttestor {
    /// Creates a product attestor without filters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds include and exclude filters.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::InvalidOption`] for malformed patterns.
    pub fn with_filters(
        mut self,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self, AttestationError> {
        self.include = compile(OPTION_INCLUDE_GLOB, include)?;
        self.exclude = compile(OPTION_EXCLUDE_GLOB, exclude)?;
        Ok(self)
    }

    /// Registry factory reading `include-glob` and `exclude-glob`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::InvalidOption`] for malformed patterns.
    pub fn factory(options: &AttestorOptions) -> Result<Box<dyn Attestor>, AttestationError> {
        Ok(Box::new(Self::new().with_filters(
            options.get_all(OPTION_INCLUDE_GLOB),
            options.get_all(OPTION_EXCLUDE_GLOB),
        )?))
    }

    /// Returns true when a path passes the filters.
    fn selected(&self, path: &str) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|pattern| pattern.matches(path));
        included && !self.exclude.iter().any(|pattern| pattern.matches(path))
    }
}

impl Attestor for ProductAttestor {
    fn name(&self) -> &str {
        NAME
    }

    fn type_uri(&self) -> &str {
        PRODUCT_TYPE
    }

    fn phase(&self) -> RunPhase {
        RunPhase::Product
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn attest(&mut self, context: &AttestationContext) -> Result<(), AttestationError> {
        let baseline = context.materials();
        let changed =
            record_artifacts(context.working_dir(), &baseline, context.hashes(), Some(context))?;
        self.products = changed
            .into_iter()
            .filter(|(path, _)| self.selected(path))
            .map(|(path, digest)| {
                let mime_type = detect_file_mime(&context.working_dir().join(&path));
                (path, Product {
                    mime_type,
                    digest,
                })
            })
            .collect();
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.products)?)
    }

    fn products(&self) -> BTreeMap<String, Product> {
        self.products.clone()
    }

    fn subjects(&self) -> BTreeMap<String, DigestSet> {
        self.products
            .iter()
            .map(|(path, product)| (path.clone(), product.digest.clone()))
            .collect()
    }
}

/// Compiles glob patterns for one option.
fn compile(option: &str, patterns: &[String]) -> Result<Vec<Pattern>, AttestationError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|err| AttestationError::InvalidOption {
                option: option.to_string(),
                message: err.to_string(),
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the product payload.
#[must_use]
pub fn schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "product",
        "type": "object",
        "additionalProperties": {
            "type": "object",
            "required": ["mime_type", "digest"],
            "properties": {
                "mime_type": {"type": "string"},
                "digest": crate::registry::digest_set_schema(),
            },
        },
    })
}
