// crates/witness-core/src/core/errors.rs
// ============================================================================
// Module: Error Classification
// Description: Attestor and infrastructure error classes with cause chains.
// Purpose: Let the runner and CLI decide continuation and exit codes by
//          walking an error's source chain.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Failures that cross the runner boundary are wrapped in
//! [`ClassifiedError`]. The attestor class names the attestor that failed; the
//! infrastructure class names the operation (signing, timestamping, export).
//! Both keep the original cause as their `source()` so callers can report the
//! first human-readable cause. [`is_attestor_error`] and
//! [`is_infrastructure_error`] search the whole chain, so further wrapping does
//! not hide the class.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error;
use std::iter;

use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Boxed error cause carried by classified errors.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Classified failure with a preserved cause.
#[derive(Debug, Error)]
pub enum ClassifiedError {
    /// A specific attestor failed to observe or record its domain.
    #[error("attestor error ({name}): {source}")]
    Attestor {
        /// Attestor name.
        name: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
    /// A subsystem the run depends on failed.
    #[error("infrastructure error ({operation}): {source}")]
    Infrastructure {
        /// Operation label.
        operation: String,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
}

impl ClassifiedError {
    /// Wraps a cause as an attestor error.
    #[must_use]
    pub fn attestor(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Attestor {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Wraps a cause as an infrastructure error.
    #[must_use]
    pub fn infrastructure(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Infrastructure {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Returns the attestor name or operation label.
    #[must_use]
    pub fn component(&self) -> &str {
        match self {
            Self::Attestor {
                name, ..
            } => name,
            Self::Infrastructure {
                operation, ..
            } => operation,
        }
    }
}

// ============================================================================
// SECTION: Predicates
// ============================================================================

/// Iterates an error and every cause beneath it.
pub fn error_chain<'a>(
    err: &'a (dyn Error + 'static),
) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    iter::successors(Some(err), |&current| current.source())
}

/// Returns true when the chain contains an attestor-class error.
#[must_use]
pub fn is_attestor_error(err: &(dyn Error + 'static)) -> bool {
    error_chain(err).any(|current| {
        matches!(current.downcast_ref::<ClassifiedError>(), Some(ClassifiedError::Attestor { .. }))
    })
}

/// Returns true when the chain contains an infrastructure-class error.
#[must_use]
pub fn is_infrastructure_error(err: &(dyn Error + 'static)) -> bool {
    error_chain(err).any(|current| {
        matches!(
            current.downcast_ref::<ClassifiedError>(),
            Some(ClassifiedError::Infrastructure { .. })
        )
    })
}

/// Returns the deepest cause message in the chain.
#[must_use]
pub fn root_cause_message(err: &(dyn Error + 'static)) -> String {
    error_chain(err).last().map_or_else(|| err.to_string(), ToString::to_string)
}
