// crates/witness-cli/src/oci.rs
// ============================================================================
// Module: CLI Registry Store
// Description: OCI store used when no registry client is configured.
// Purpose: Fail image attachment with an infrastructure error.
// Dependencies: witness-core
// ============================================================================

//! ## Overview
//! The CLI ships without an OCI registry client. Image attachment goes
//! through [`UnconfiguredOciStore`], which reports
//! [`StoreError::NotConfigured`] so the failure maps to the infrastructure
//! exit code instead of succeeding silently.

use witness_core::OciStore;
use witness_core::StoreError;
use witness_core::interfaces::OciLayer;

/// Message reported for every registry operation.
const NOT_CONFIGURED: &str = "no OCI registry client is configured";

/// [`OciStore`] that rejects every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredOciStore;

impl OciStore for UnconfiguredOciStore {
    fn put(
        &self,
        _repository: &str,
        _tag: &str,
        _layers: &[OciLayer],
    ) -> Result<String, StoreError> {
        Err(StoreError::NotConfigured(NOT_CONFIGURED.to_string()))
    }

    fn get(&self, _reference: &str) -> Result<Vec<u8>, StoreError> {
        Err(StoreError::NotConfigured(NOT_CONFIGURED.to_string()))
    }
}
