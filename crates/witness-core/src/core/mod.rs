// crates/witness-core/src/core/mod.rs
// ============================================================================
// Module: Core Primitives
// Description: Digest sets, base64 helpers, and classified errors.
// Purpose: Group the leaf primitives every other module builds on.
// Dependencies: sha1, sha2, base64, thiserror
// ============================================================================

//! ## Overview
//! Leaf primitives with no dependency on the rest of the crate.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod digest;
pub mod encoding;
pub mod errors;
