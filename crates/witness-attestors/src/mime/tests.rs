// crates/witness-attestors/src/mime/tests.rs
// ============================================================================
// Module: MIME Sniffing Tests
// Description: Unit tests for content-type inference.
// Purpose: Pin labels used by ingest attestors.
// Dependencies: witness-attestors
// ============================================================================

//! ## Overview
//! Covers binary signatures, JSON, text, and the unknown fallback.

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::JSON_MIME;
use super::OCTET_STREAM_MIME;
use super::TEXT_MIME;
use super::UNKNOWN_MIME;
use super::detect_mime;
use super::mime_matches;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn text_and_json_are_recognised() {
    assert_eq!(detect_mime(b"hello\n"), TEXT_MIME);
    assert_eq!(detect_mime(b"  {\"a\": 1}"), JSON_MIME);
    assert_eq!(detect_mime(b"[1, 2]"), JSON_MIME);
}

#[test]
fn binary_signatures_come_from_infer() {
    let gzip = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00];
    assert_eq!(detect_mime(&gzip), "application/gzip");
    assert_eq!(detect_mime(&[0x00, 0x01, 0x02, 0xff]), OCTET_STREAM_MIME);
}

#[test]
fn empty_content_is_unknown() {
    assert_eq!(detect_mime(b""), UNKNOWN_MIME);
}

#[test]
fn labels_match_ignoring_parameters() {
    assert!(mime_matches("text/plain; charset=utf-8", &[TEXT_MIME]));
    assert!(!mime_matches("application/x-tar", &[TEXT_MIME, JSON_MIME]));
}
