// crates/witness-core/src/interfaces.rs
// ============================================================================
// Module: External Store Interfaces
// Description: Traits for the archival store and the OCI registry.
// Purpose: Keep remote collaborators behind narrow, swappable seams.
// Dependencies: thiserror, crate::envelope
// ============================================================================

//! ## Overview
//! The archival store keeps envelopes addressed by gitoid. The OCI registry is
//! an opaque blob store used to attach envelopes to images as referrers.
//! Implementations must be thread-safe; callers share them behind `Arc`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::envelope::Envelope;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by external stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transport failure.
    #[error("store transport error: {0}")]
    Transport(String),
    /// The store answered with an unexpected status.
    #[error("store returned status {status}: {message}")]
    Status {
        /// HTTP-like status code.
        status: u16,
        /// Response detail.
        message: String,
    },
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),
    /// The response body could not be decoded.
    #[error("invalid store response: {0}")]
    Decode(String),
    /// No adapter is configured for this store.
    #[error("store not configured: {0}")]
    NotConfigured(String),
}

// ============================================================================
// SECTION: Archive Store
// ============================================================================

/// Archival storage for signed envelopes.
pub trait ArchiveStore: Send + Sync {
    /// Stores an envelope and returns its gitoid.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the upload fails.
    fn store(&self, envelope: &Envelope) -> Result<String, StoreError>;

    /// Downloads the envelope addressed by `gitoid`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the download fails.
    fn download(&self, gitoid: &str) -> Result<Envelope, StoreError>;
}

// ============================================================================
// SECTION: OCI Store
// ============================================================================

/// Blob layer pushed to a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciLayer {
    /// Layer media type.
    pub media_type: String,
    /// Layer content.
    pub data: Vec<u8>,
}

/// Opaque OCI registry.
pub trait OciStore: Send + Sync {
    /// Pushes layers under `repository:tag` and returns the manifest digest.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the push fails.
    fn put(&self, repository: &str, tag: &str, layers: &[OciLayer]) -> Result<String, StoreError>;

    /// Fetches the manifest bytes for a reference.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the fetch fails.
    fn get(&self, reference: &str) -> Result<Vec<u8>, StoreError>;
}
