// crates/witness-runner/src/lib.rs
// ============================================================================
// Module: Witness Runner
// Description: Attestation run orchestration and envelope export.
// Purpose: Turn a step definition and a user command into a signed
//          collection envelope delivered to the configured sinks.
// Dependencies: witness-core, witness-attestors, reqwest
// ============================================================================

//! ## Overview
//! [`Runner`] drives the attestor pipeline for one step, signs the resulting
//! statement with every configured signer, and hands the envelope to each
//! [`ExportSink`]. [`ArchivistaClient`] is the HTTP adapter for the archival
//! store consumed by the archive sink and the policy loader.
//! Invariants:
//! - A failed user command is still signed and exported, then fails the run
//!   regardless of continuation flags.
//! - Cancellation never yields a signed envelope.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod archivista;
pub mod error;
pub mod export;
pub mod options;
pub mod runner;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use archivista::ArchivistaClient;
pub use error::RunError;
pub use export::ArchiveSink;
pub use export::ExportError;
pub use export::ExportSink;
pub use export::FileSink;
pub use export::OciReferrerSink;
pub use options::ContinuePolicy;
pub use options::RunOptions;
pub use runner::RunResult;
pub use runner::Runner;
