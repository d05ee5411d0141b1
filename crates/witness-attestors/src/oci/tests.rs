// crates/witness-attestors/src/oci/tests.rs
// ============================================================================
// Module: OCI Attestor Tests
// Description: Unit tests for saved-image inspection.
// Purpose: Pin image ID and layer diff ID derivation.
// Dependencies: witness-attestors, tar, flate2, tempfile, time
// ============================================================================

//! ## Overview
//! Builds a small saved-image archive with one plain and one gzip layer.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use time::OffsetDateTime;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::DigestSet;
use witness_core::HashFunction;
use witness_core::attestation::context::CompletedAttestation;

use super::OciAttestor;
use super::inspect_image;
use crate::product::ProductAttestor;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Config blob contents.
const CONFIG: &[u8] = br#"{"architecture":"amd64","os":"linux"}"#;

/// Uncompressed contents of both layers.
const LAYER: &[u8] = b"layer contents";

/// Appends one file member to an archive.
fn append(builder: &mut tar::Builder<File>, name: &str, bytes: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(u64::try_from(bytes.len()).unwrap());
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, bytes).unwrap();
}

/// Writes a saved-image archive to `path`.
fn write_image(path: &Path) {
    let mut gzip = GzEncoder::new(Vec::new(), Compression::default());
    gzip.write_all(LAYER).unwrap();
    let compressed = gzip.finish().unwrap();
    let manifest = br#"[{"Config":"config.json","RepoTags":["demo:latest"],"Layers":["a/layer.tar","b/layer.tar.gz"]}]"#;

    let mut builder = tar::Builder::new(File::create(path).unwrap());
    append(&mut builder, "b/layer.tar.gz", &compressed);
    append(&mut builder, "a/layer.tar", LAYER);
    append(&mut builder, "config.json", CONFIG);
    append(&mut builder, "manifest.json", manifest);
    builder.finish().unwrap();
}

/// Runs the product attestor and freezes it into the context.
fn record_products(context: &mut AttestationContext) {
    let mut product = ProductAttestor::default();
    let start = OffsetDateTime::now_utc();
    product.attest(context).unwrap();
    let completed =
        CompletedAttestation::freeze(&product, start, OffsetDateTime::now_utc()).unwrap();
    context.record_completed(completed);
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn image_id_and_diff_ids_follow_manifest_order() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("image.tar");
    write_image(&archive);

    let hashes = [HashFunction::Sha256];
    let predicate = inspect_image(&archive, &hashes).unwrap().unwrap();
    let layer = DigestSet::from_bytes(LAYER, &hashes).unwrap();
    assert!(predicate.imageid.equal(&DigestSet::from_bytes(CONFIG, &hashes).unwrap()));
    assert_eq!(predicate.diffids.len(), 2);
    assert!(predicate.diffids.iter().all(|diffid| diffid.equal(&layer)));
    assert_eq!(predicate.imagetags, vec!["demo:latest".to_string()]);
}

#[test]
fn archive_without_manifest_is_not_an_image() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("plain.tar");
    let mut builder = tar::Builder::new(File::create(&archive).unwrap());
    append(&mut builder, "readme.txt", b"hello");
    builder.finish().unwrap();

    assert!(inspect_image(&archive, &[HashFunction::Sha256]).unwrap().is_none());
}

#[test]
fn attest_emits_image_subjects() {
    let dir = tempfile::tempdir().unwrap();
    write_image(&dir.path().join("image.tar"));
    let mut context = AttestationContext::new(dir.path());
    record_products(&mut context);

    let mut attestor = OciAttestor::new();
    attestor.attest(&context).unwrap();
    let subjects = attestor.subjects();
    assert!(subjects.keys().any(|key| key.starts_with("tardigest:")));
    assert!(subjects.keys().any(|key| key.starts_with("imageid:")));
    assert!(subjects.keys().any(|key| key.starts_with("layerdiffid00:")));
    assert!(subjects.keys().any(|key| key.starts_with("layerdiffid01:")));
}

#[test]
fn attest_without_tarball_reports_no_candidate() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
    let mut context = AttestationContext::new(dir.path());
    record_products(&mut context);

    let err = OciAttestor::new().attest(&context).unwrap_err();
    assert!(matches!(err, AttestationError::NoCandidate(_)));
}
