// crates/witness-cli/src/error.rs
// ============================================================================
// Module: CLI Errors
// Description: CLI error type and process exit-code mapping.
// Purpose: Map every failure onto the documented exit codes.
// Dependencies: thiserror, witness-core, witness-policy, witness-runner
// ============================================================================

//! ## Overview
//! Exit codes: 0 success, 1 generic failure, 2 attestor failure, 3
//! infrastructure failure, 4 policy denial. Attestor and infrastructure
//! classes are found by walking the error's cause chain.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::error::Error as StdError;

use thiserror::Error;
use witness_core::ClassifiedError;
use witness_core::is_attestor_error;
use witness_core::is_infrastructure_error;
use witness_policy::PolicyError;
use witness_runner::RunError;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Generic failure.
pub const EXIT_FAILURE: u8 = 1;
/// An attestor failed.
pub const EXIT_ATTESTOR: u8 = 2;
/// Infrastructure (signing, storage, network) failed.
pub const EXIT_INFRASTRUCTURE: u8 = 3;
/// The policy denied the attestations.
pub const EXIT_POLICY_DENIED: u8 = 4;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failure.
#[derive(Debug, Error)]
pub enum CliError {
    /// Usage, input, or local I/O failure.
    #[error("{0}")]
    Message(String),
    /// The attestation run failed.
    #[error(transparent)]
    Run(#[from] RunError),
    /// Policy loading or verification failed.
    #[error("{tag}: {0}", tag = .0.tag())]
    Policy(#[from] PolicyError),
    /// A classified failure outside the runner.
    #[error("{0}")]
    Classified(#[from] ClassifiedError),
}

impl CliError {
    /// Constructs a message error.
    #[must_use]
    pub const fn new(message: String) -> Self {
        Self::Message(message)
    }

    /// Returns the process exit code for this failure.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        let classified: &(dyn StdError + 'static) = match self {
            Self::Message(_) => return EXIT_FAILURE,
            Self::Policy(err) => {
                return if err.is_denial() { EXIT_POLICY_DENIED } else { EXIT_FAILURE };
            }
            Self::Run(err) => err,
            Self::Classified(err) => err,
        };
        if is_attestor_error(classified) {
            EXIT_ATTESTOR
        } else if is_infrastructure_error(classified) {
            EXIT_INFRASTRUCTURE
        } else {
            EXIT_FAILURE
        }
    }
}

/// CLI result alias.
pub type CliResult<T> = Result<T, CliError>;
