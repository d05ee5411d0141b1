// crates/witness-cli/src/lib.rs
// ============================================================================
// Module: Witness CLI
// Description: Command-line front end for attestation runs and verification.
// Purpose: Parse flags and config, then drive the runner and policy crates.
// Dependencies: clap, witness-core, witness-attestors, witness-runner,
//               witness-policy
// ============================================================================

//! ## Overview
//! The `witness` binary is a thin wrapper over this library. [`cli`] holds
//! the clap tree (plus registry-generated attestor flags), [`commands`] one
//! handler per subcommand, and [`error`] the exit-code mapping:
//! 0 success, 1 failure, 2 attestor failure, 3 infrastructure failure,
//! 4 policy denial.
//! Invariants:
//! - Flags override `.witness.toml` values.
//! - Every file read is size bounded.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod messages;
pub mod oci;
pub mod signal;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cli::Cli;
pub use cli::Invocation;
pub use cli::parse_args;
pub use commands::CommandContext;
pub use commands::dispatch;
pub use error::CliError;
pub use error::CliResult;
