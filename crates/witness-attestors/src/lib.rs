// crates/witness-attestors/src/lib.rs
// ============================================================================
// Module: Witness Attestors
// Description: Built-in attestor implementations.
// Purpose: Provide the filesystem recorders, the command-run attestor, and
//          the context and ingest attestors behind one registry.
// Dependencies: witness-core, reqwest, jsonwebtoken, nix, quick-xml, tar
// ============================================================================

//! ## Overview
//! Every attestor implements [`witness_core::Attestor`] and is registered in
//! [`builtin_registry`]. Filesystem snapshots share [`file::record_artifacts`];
//! ingest attestors share [`ingest::find_candidate`], which re-hashes each
//! candidate product before it is parsed.
//! Invariants:
//! - Ingest attestors never parse a product whose digest changed after the
//!   product snapshot.
//! - Network attestors check the run cancellation token before each request.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod aws;
pub mod command_run;
pub mod environment;
pub mod file;
pub mod gcp;
pub mod git;
pub mod gitlab;
pub mod http;
pub mod ingest;
pub mod jwt;
pub mod material;
pub mod maven;
pub mod mime;
pub mod oci;
pub mod product;
pub mod registry;
pub mod sarif;
pub mod sbom;
pub mod scorecard;
pub mod subject;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use aws::AwsAttestor;
pub use command_run::CommandRunAttestor;
pub use environment::EnvironmentAttestor;
pub use gcp::GcpAttestor;
pub use git::GitAttestor;
pub use gitlab::GitlabAttestor;
pub use jwt::JwtAttestor;
pub use material::MaterialAttestor;
pub use maven::MavenAttestor;
pub use oci::OciAttestor;
pub use product::ProductAttestor;
pub use registry::builtin_registry;
pub use sarif::SarifAttestor;
pub use sbom::SbomAttestor;
pub use scorecard::ScorecardAttestor;
