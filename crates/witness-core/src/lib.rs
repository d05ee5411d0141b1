// crates/witness-core/src/lib.rs
// ============================================================================
// Module: Witness Core
// Description: Shared primitives for build provenance.
// Purpose: Provide digests, signers, envelopes, statements, the attestor
//          model, and structured logging to the rest of the workspace.
// Dependencies: sha2, rsa, p256, p384, ed25519-dalek, x509-cert, cms, serde
// ============================================================================

//! ## Overview
//! `witness-core` holds the leaf layers of the provenance pipeline:
//! content digests, the polymorphic signer and verifier surface, the DSSE
//! envelope codec with RFC 3161 timestamps, in-toto statements, and the
//! attestor model (registry, context, collection).
//! Invariants:
//! - A persisted digest set is never empty.
//! - Envelope verification takes exactly one clock reading, supplied by the
//!   caller.
//! - Completed attestors are frozen; later attestors observe only snapshots.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod attestation;
pub mod core;
pub mod crypto;
pub mod envelope;
pub mod interfaces;
pub mod intoto;
pub mod logging;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use attestation::AttestationContext;
pub use attestation::AttestationError;
pub use attestation::Attestor;
pub use attestation::AttestorOptions;
pub use attestation::Capability;
pub use attestation::Product;
pub use attestation::RunPhase;
pub use attestation::collection::COLLECTION_TYPE;
pub use attestation::collection::Collection;
pub use attestation::registry::AttestorRegistry;
pub use attestation::registry::RegistryEntry;
pub use crate::core::digest::DigestError;
pub use crate::core::digest::DigestSet;
pub use crate::core::digest::HashFunction;
pub use crate::core::errors::ClassifiedError;
pub use crate::core::errors::is_attestor_error;
pub use crate::core::errors::is_infrastructure_error;
pub use crypto::CryptoError;
pub use crypto::Signer;
pub use crypto::Verifier;
pub use envelope::Envelope;
pub use envelope::EnvelopeError;
pub use interfaces::ArchiveStore;
pub use interfaces::OciStore;
pub use interfaces::StoreError;
pub use intoto::Statement;
pub use logging::LogEvent;
pub use logging::LogLevel;
pub use logging::LogSink;
pub use logging::SharedLogSink;
