// crates/witness-runner/src/error.rs
// ============================================================================
// Module: Run Errors
// Description: Failures that end an attestation run.
// Purpose: Carry classified causes so callers can pick exit codes.
// Dependencies: thiserror, witness-core
// ============================================================================

//! ## Overview
//! Aborting failures keep their [`ClassifiedError`] as `source()`, so
//! [`witness_core::is_attestor_error`] and
//! [`witness_core::is_infrastructure_error`] see through [`RunError`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use witness_core::ClassifiedError;
use witness_core::attestation::registry::RegistryError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Run options are incomplete or contradictory.
    #[error("invalid run options: {0}")]
    InvalidOptions(String),
    /// A requested attestor could not be resolved or created.
    #[error("failed to prepare attestors: {0}")]
    Registry(#[from] RegistryError),
    /// The run was cancelled; nothing was signed.
    #[error("run cancelled")]
    Cancelled,
    /// The user command failed; its envelope was still signed and exported.
    #[error("command failed: {0}")]
    CommandFailed(#[source] ClassifiedError),
    /// An attestor or infrastructure failure the continuation flags did not
    /// cover.
    #[error("run aborted: {0}")]
    Aborted(#[source] ClassifiedError),
    /// The statement could not be assembled.
    #[error("failed to build statement: {0}")]
    Statement(String),
}
