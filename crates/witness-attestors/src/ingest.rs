// crates/witness-attestors/src/ingest.rs
// ============================================================================
// Module: Product Ingest
// Description: Candidate selection for attestors that parse build outputs.
// Purpose: Pick the first product with an accepted MIME type that re-hashes
//          to its recorded digest and parses successfully.
// Dependencies: serde_json, witness-core
// ============================================================================

//! ## Overview
//! Candidates are visited in path order. Each candidate is re-hashed before
//! parsing; a digest mismatch aborts with [`AttestationError::Integrity`]
//! because the file changed after the product snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::DigestSet;
use witness_core::Product;

use crate::mime::mime_matches;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Upper bound on documents read into memory for parsing.
pub const MAX_DOCUMENT_BYTES: u64 = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Product accepted by an ingest attestor.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<T> {
    /// Product path relative to the working directory.
    pub path: String,
    /// Absolute path on disk.
    pub full_path: PathBuf,
    /// Verified product digest.
    pub digest: DigestSet,
    /// Parsed content.
    pub parsed: T,
}

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Returns the first verified product that `parse` accepts.
///
/// # Errors
///
/// Returns [`AttestationError::Integrity`] when a candidate no longer matches
/// its product digest and [`AttestationError::NoCandidate`] when nothing
/// parses.
pub fn find_candidate<T>(
    context: &AttestationContext,
    accepted: &[&str],
    what: &str,
    mut parse: impl FnMut(&str, &Path) -> Option<T>,
) -> Result<Candidate<T>, AttestationError> {
    for (path, product) in context.products() {
        context.check_cancelled()?;
        if !mime_matches(&product.mime_type, accepted) {
            continue;
        }
        let full_path = verify_product(context, &path, &product)?;
        if let Some(parsed) = parse(&path, &full_path) {
            return Ok(Candidate {
                path,
                full_path,
                digest: product.digest,
                parsed,
            });
        }
    }
    Err(AttestationError::NoCandidate(what.to_string()))
}

/// Re-hashes a product and requires equality with the recorded digest.
///
/// # Errors
///
/// Returns [`AttestationError::Integrity`] on mismatch.
pub fn verify_product(
    context: &AttestationContext,
    path: &str,
    product: &Product,
) -> Result<PathBuf, AttestationError> {
    let full_path = context.working_dir().join(path);
    let current = DigestSet::from_file(&full_path, context.hashes())?;
    if !current.equal(&product.digest) {
        return Err(AttestationError::Integrity(format!(
            "{path} changed after the product snapshot"
        )));
    }
    Ok(full_path)
}

/// Reads a bounded file, returning `None` when unreadable or oversized.
#[must_use]
pub fn read_document(path: &Path) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    let mut bytes = Vec::new();
    file.take(MAX_DOCUMENT_BYTES.saturating_add(1)).read_to_end(&mut bytes).ok()?;
    let limit = usize::try_from(MAX_DOCUMENT_BYTES).ok()?;
    (bytes.len() <= limit).then_some(bytes)
}

/// Reads and parses a bounded JSON document.
#[must_use]
pub fn read_json(path: &Path) -> Option<Value> {
    serde_json::from_slice(&read_document(path)?).ok()
}
