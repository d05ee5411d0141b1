// crates/witness-attestors/src/subject.rs
// ============================================================================
// Module: Value Subjects
// Description: Subjects derived from identifying strings.
// Purpose: Give instance, pipeline, and package identifiers a digest so they
//          can appear as statement subjects.
// Dependencies: witness-core
// ============================================================================

//! Subjects derived from identifying strings, giving instance, pipeline, and
//! package identifiers a digest so they can appear as statement subjects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use witness_core::AttestationError;
use witness_core::DigestSet;
use witness_core::HashFunction;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Inserts `prefix:value` hashed over the value bytes; empty values are skipped.
///
/// # Errors
///
/// Returns [`AttestationError::Digest`] when hashing fails.
pub fn insert_value_subject(
    subjects: &mut BTreeMap<String, DigestSet>,
    prefix: &str,
    value: &str,
    hashes: &[HashFunction],
) -> Result<(), AttestationError> {
    if value.is_empty() {
        return Ok(());
    }
    let digest = DigestSet::from_bytes(value.as_bytes(), hashes)?;
    subjects.insert(format!("{prefix}:{value}"), digest);
    Ok(())
}
