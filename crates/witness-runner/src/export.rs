// crates/witness-runner/src/export.rs
// ============================================================================
// Module: Export Sinks
// Description: Destinations for the signed envelope of a run.
// Purpose: Write the primary envelope and push copies to the archive store
//          and OCI registries.
// Dependencies: hex, sha2, thiserror, witness-core
// ============================================================================

//! ## Overview
//! Sinks receive the envelope after signing, in configuration order. The
//! [`FileSink`] writes the primary envelope to a path or standard output; the
//! [`ArchiveSink`] and [`OciReferrerSink`] push copies through the external
//! store traits. A failing sink is classified as an infrastructure error by
//! the runner.
//! Invariants:
//! - Sinks never mutate the envelope.
//! - A referrer is tagged after the digest of the manifest it refers to.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;
use witness_core::ArchiveStore;
use witness_core::Envelope;
use witness_core::LogEvent;
use witness_core::LogLevel;
use witness_core::LogSink;
use witness_core::OciStore;
use witness_core::StoreError;
use witness_core::interfaces::OciLayer;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Media type of an attestation layer attached to an image.
pub const ATTESTATION_MEDIA_TYPE: &str = "application/vnd.in-toto.witness.attestation.v1+json";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors emitted by export sinks.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The envelope could not be encoded.
    #[error("failed to encode envelope: {0}")]
    Encode(String),
    /// Writing the envelope failed.
    #[error("failed to write envelope: {0}")]
    Write(String),
    /// The image reference is malformed.
    #[error("invalid image reference: {0}")]
    Reference(String),
    /// The external store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Sink Trait
// ============================================================================

/// Receives the signed envelope of a run.
pub trait ExportSink: Send + Sync {
    /// Returns the operation label used when classifying failures.
    fn name(&self) -> &str;

    /// Exports the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] when the export fails.
    fn export(&self, envelope: &Envelope, log: &dyn LogSink) -> Result<(), ExportError>;
}

// ============================================================================
// SECTION: File Sink
// ============================================================================

/// Writes the primary envelope to a file or standard output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSink {
    /// Output path; `None` writes to standard output.
    path: Option<PathBuf>,
}

impl FileSink {
    /// Creates a sink writing to `path`, or standard output when `None`.
    #[must_use]
    pub const fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
        }
    }
}

impl ExportSink for FileSink {
    fn name(&self) -> &'static str {
        "write-envelope"
    }

    fn export(&self, envelope: &Envelope, _log: &dyn LogSink) -> Result<(), ExportError> {
        let bytes = envelope.to_json().map_err(|err| ExportError::Encode(err.to_string()))?;
        match &self.path {
            Some(path) => {
                let mut file = File::create(path).map_err(|err| {
                    ExportError::Write(format!("{}: {err}", path.display()))
                })?;
                file.write_all(&bytes).map_err(|err| ExportError::Write(err.to_string()))?;
                file.flush().map_err(|err| ExportError::Write(err.to_string()))
            }
            None => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(&bytes).map_err(|err| ExportError::Write(err.to_string()))?;
                stdout.write_all(b"\n").map_err(|err| ExportError::Write(err.to_string()))?;
                stdout.flush().map_err(|err| ExportError::Write(err.to_string()))
            }
        }
    }
}

// ============================================================================
// SECTION: Archive Sink
// ============================================================================

/// Uploads the envelope to the archival store.
pub struct ArchiveSink {
    /// Backing store.
    store: Arc<dyn ArchiveStore>,
}

impl ArchiveSink {
    /// Wraps an archive store.
    #[must_use]
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self {
            store,
        }
    }
}

impl ExportSink for ArchiveSink {
    fn name(&self) -> &'static str {
        "archive-upload"
    }

    fn export(&self, envelope: &Envelope, log: &dyn LogSink) -> Result<(), ExportError> {
        let gitoid = self.store.store(envelope)?;
        log.record(
            &LogEvent::new(
                "archive_stored",
                LogLevel::Info,
                "export",
                format!("stored envelope with gitoid {gitoid}"),
            )
            .with_field("gitoid", gitoid),
        );
        Ok(())
    }
}

// ============================================================================
// SECTION: OCI Referrer Sink
// ============================================================================

/// Attaches the envelope to an image as a referrer.
pub struct OciReferrerSink {
    /// Registry adapter.
    store: Arc<dyn OciStore>,
    /// Image reference the envelope refers to.
    reference: String,
}

impl OciReferrerSink {
    /// Creates a sink attaching to `reference`.
    #[must_use]
    pub fn new(store: Arc<dyn OciStore>, reference: impl Into<String>) -> Self {
        Self {
            store,
            reference: reference.into(),
        }
    }
}

impl ExportSink for OciReferrerSink {
    fn name(&self) -> &'static str {
        "oci-attach"
    }

    fn export(&self, envelope: &Envelope, log: &dyn LogSink) -> Result<(), ExportError> {
        let digest = attach_envelope(self.store.as_ref(), &self.reference, envelope)?;
        log.record(
            &LogEvent::new(
                "referrer_attached",
                LogLevel::Info,
                "export",
                format!("attached envelope to {}", self.reference),
            )
            .with_field("reference", self.reference.clone())
            .with_field("digest", digest),
        );
        Ok(())
    }
}

/// Pushes an envelope as an attestation layer next to an image.
///
/// The image manifest is fetched first; the referrer is tagged
/// `sha256-<manifest digest>.att` in the image's repository. Returns the
/// digest reported by the registry.
///
/// # Errors
///
/// Returns [`ExportError::Reference`] for malformed references and
/// [`ExportError::Store`] when the registry fails.
pub fn attach_envelope(
    store: &dyn OciStore,
    reference: &str,
    envelope: &Envelope,
) -> Result<String, ExportError> {
    let repository = repository_of(reference)?;
    let manifest = store.get(reference)?;
    let tag = format!("sha256-{}.att", hex::encode(Sha256::digest(&manifest)));
    let data = envelope.to_json().map_err(|err| ExportError::Encode(err.to_string()))?;
    let layer = OciLayer {
        media_type: ATTESTATION_MEDIA_TYPE.to_string(),
        data,
    };
    Ok(store.put(repository, &tag, &[layer])?)
}

/// Strips the tag or digest from an image reference.
///
/// # Errors
///
/// Returns [`ExportError::Reference`] when no repository remains.
pub fn repository_of(reference: &str) -> Result<&str, ExportError> {
    let without_digest = reference.split_once('@').map_or(reference, |(repo, _)| repo);
    let name_start = without_digest.rfind('/').map_or(0, |index| index + 1);
    let repository = match without_digest[name_start ..].rfind(':') {
        Some(colon) => &without_digest[.. name_start + colon],
        None => without_digest,
    };
    if repository.is_empty() || repository.ends_with('/') {
        return Err(ExportError::Reference(reference.to_string()));
    }
    Ok(repository)
}
