// crates/witness-attestors/src/mime.rs
// ============================================================================
// Module: MIME Sniffing
// Description: Content-type inference from leading file bytes.
// Purpose: Label products so ingest attestors can pick candidates.
// Dependencies: infer
// ============================================================================

//! ## Overview
//! Sniffing reads at most [`SNIFF_BYTES`] leading bytes. Binary signatures
//! come from `infer`; JSON and UTF-8 text are recognised by inspection.
//! Unreadable or empty files are labelled [`UNKNOWN_MIME`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::path::Path;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of leading bytes inspected.
pub const SNIFF_BYTES: u64 = 512;

/// Label for content whose type cannot be inferred.
pub const UNKNOWN_MIME: &str = "unknown";

/// Label for JSON documents.
pub const JSON_MIME: &str = "application/json";

/// Label for UTF-8 text.
pub const TEXT_MIME: &str = "text/plain";

/// Label for unrecognised binary content.
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

// ============================================================================
// SECTION: Detection
// ============================================================================

/// Infers a MIME type from leading bytes.
#[must_use]
pub fn detect_mime(head: &[u8]) -> String {
    if head.is_empty() {
        return UNKNOWN_MIME.to_string();
    }
    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }
    if !is_text(head) {
        return OCTET_STREAM_MIME.to_string();
    }
    let trimmed = head.trim_ascii_start();
    if trimmed.starts_with(b"{") || trimmed.starts_with(b"[") {
        return JSON_MIME.to_string();
    }
    TEXT_MIME.to_string()
}

/// Infers the MIME type of a file, returning [`UNKNOWN_MIME`] on read errors.
#[must_use]
pub fn detect_file_mime(path: &Path) -> String {
    let Ok(file) = File::open(path) else {
        return UNKNOWN_MIME.to_string();
    };
    let mut head = Vec::new();
    if file.take(SNIFF_BYTES).read_to_end(&mut head).is_err() {
        return UNKNOWN_MIME.to_string();
    }
    detect_mime(&head)
}

/// Returns true when a product label matches an accepted type.
#[must_use]
pub fn mime_matches(label: &str, accepted: &[&str]) -> bool {
    let base = label.split(';').next().unwrap_or(label).trim();
    accepted.iter().any(|candidate| candidate.eq_ignore_ascii_case(base))
}

/// Returns true for UTF-8 text, tolerating a code point cut at the end.
fn is_text(head: &[u8]) -> bool {
    match std::str::from_utf8(head) {
        Ok(text) => !text.chars().any(|c| c.is_control() && !c.is_ascii_whitespace()),
        Err(err) => err.error_len().is_none() && is_text(&head[.. err.valid_up_to()]),
    }
}

#[cfg(test)]
mod tests;
