// crates/witness-attestors/tests/pipeline.rs
// ============================================================================
// Module: Attestation Pipeline Tests
// Description: Material, command-run, and product attestors end to end.
// Purpose: Pin snapshot deltas, command capture, and process tracing.
// Dependencies: witness-attestors, tempfile, jsonschema
// ============================================================================

//! ## Overview
//! Drives the filesystem recorders around a real command in a temporary
//! working directory and validates the payloads against their schemas.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::fs;

use witness_attestors::CommandRunAttestor;
use witness_attestors::MaterialAttestor;
use witness_attestors::ProductAttestor;
use witness_attestors::command_run;
use witness_attestors::material;
use witness_attestors::product;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::HashFunction;
use witness_core::attestation::COMMAND_RUN_TYPE;
use witness_core::attestation::MATERIAL_TYPE;
use witness_core::attestation::PRODUCT_TYPE;

use crate::common::assert_schema;
use crate::common::drive;

/// Builds an argv from string slices.
fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

/// Material, command-run, and product attestors for one command.
fn pipeline(cmd: &[&str]) -> Vec<Box<dyn Attestor>> {
    vec![
        Box::new(ProductAttestor::new()),
        Box::new(MaterialAttestor::new()),
        Box::new(CommandRunAttestor::new(argv(cmd)).with_silent(true)),
    ]
}

#[cfg(unix)]
#[test]
fn new_file_becomes_the_only_product() {
    let dir = tempfile::tempdir().unwrap();
    let mut context = AttestationContext::new(dir.path());
    let errors = drive(&mut context, pipeline(&["sh", "-c", "echo 'hello' > out.txt"]));
    assert!(errors.is_empty());

    assert!(context.materials().is_empty());
    let products = context.products();
    assert_eq!(products.len(), 1);
    let product = &products["out.txt"];
    assert_eq!(
        product.digest.get(HashFunction::Sha256),
        Some("5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03")
    );
    assert_eq!(product.mime_type, "text/plain");
    assert!(context.subjects().contains_key("out.txt"));
}

#[cfg(unix)]
#[test]
fn unchanged_tree_has_no_products() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested/b.txt"), "beta").unwrap();
    let mut context = AttestationContext::new(dir.path());
    let errors = drive(&mut context, pipeline(&["true"]));
    assert!(errors.is_empty());

    let materials = context.materials();
    assert_eq!(materials.keys().collect::<Vec<_>>(), vec!["a.txt", "nested/b.txt"]);
    assert!(context.products().is_empty());
}

#[cfg(unix)]
#[test]
fn modified_files_are_products_and_deleted_files_are_not() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("keep.txt"), "same").unwrap();
    fs::write(dir.path().join("edit.txt"), "before").unwrap();
    fs::write(dir.path().join("gone.txt"), "bye").unwrap();
    let mut context = AttestationContext::new(dir.path());
    let errors =
        drive(&mut context, pipeline(&["sh", "-c", "echo after > edit.txt; rm gone.txt"]));
    assert!(errors.is_empty());

    let products = context.products();
    assert_eq!(products.keys().collect::<Vec<_>>(), vec!["edit.txt"]);
}

#[cfg(unix)]
#[test]
fn failed_command_still_records_products() {
    let dir = tempfile::tempdir().unwrap();
    let mut context = AttestationContext::new(dir.path());
    let errors = drive(&mut context, pipeline(&["sh", "-c", "echo x > partial.bin; exit 2"]));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "command-run");
    assert!(matches!(errors[0].1, AttestationError::CommandFailed { code: 2 }));

    let run = context.completed(COMMAND_RUN_TYPE).unwrap();
    assert_eq!(run.predicate["exitcode"], 2);
    assert!(run.error.is_some());
    assert!(context.products().contains_key("partial.bin"));
}

#[cfg(unix)]
#[test]
fn payloads_match_reflected_schemas() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("input.txt"), "in").unwrap();
    let mut context = AttestationContext::new(dir.path());
    let errors = drive(&mut context, pipeline(&["sh", "-c", "echo '{}' > out.json"]));
    assert!(errors.is_empty());

    assert_schema(&material::schema(), &context.completed(MATERIAL_TYPE).unwrap().predicate);
    assert_schema(&product::schema(), &context.completed(PRODUCT_TYPE).unwrap().predicate);
    assert_schema(
        &command_run::schema(),
        &context.completed(COMMAND_RUN_TYPE).unwrap().predicate,
    );
}

#[cfg(all(
    target_os = "linux",
    target_env = "gnu",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
#[test]
fn traced_command_counts_opened_files() {
    let scratch = tempfile::tempdir().unwrap();
    let target = scratch.path().join("x");
    fs::write(&target, "traced").unwrap();
    let target = target.to_string_lossy().into_owned();

    let dir = tempfile::tempdir().unwrap();
    let context = AttestationContext::new(dir.path());
    let mut attestor =
        CommandRunAttestor::new(argv(&["cat", &target])).with_tracing(true).with_silent(true);
    attestor.attest(&context).unwrap();

    let predicate = attestor.predicate_data();
    assert_eq!(predicate.stdout, "traced");
    assert!(!predicate.processes.is_empty());
    let count: u64 =
        predicate.processes.iter().filter_map(|process| process.openedfiles.get(&target)).sum();
    assert!(count >= 1, "opened files: {:?}", predicate.processes);
    assert_schema(&command_run::schema(), &attestor.predicate().unwrap());
}

#[cfg(all(
    target_os = "linux",
    target_env = "gnu",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
#[test]
fn traced_command_waits_for_background_children() {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let dir = tempfile::tempdir().unwrap();
        let context = AttestationContext::new(dir.path());
        let mut attestor = CommandRunAttestor::new(argv(&["sh", "-c", "sleep 1 & echo hi"]))
            .with_tracing(true)
            .with_silent(true);
        let outcome = attestor.attest(&context);
        let _ = sender.send((outcome, attestor.predicate_data().clone()));
    });

    let (outcome, predicate) =
        receiver.recv_timeout(Duration::from_secs(30)).expect("traced run did not finish");
    outcome.unwrap();
    assert_eq!(predicate.stdout, "hi\n");
    assert_eq!(predicate.exitcode, 0);
    assert!(predicate.processes.len() >= 2, "processes: {:?}", predicate.processes);
}
