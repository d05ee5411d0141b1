// crates/witness-runner/tests/run.rs
// ============================================================================
// Module: Runner Integration Tests
// Description: Full runs around real commands in temporary directories.
// Purpose: Pin assembly, continuation, cancellation, signing, and export.
// Dependencies: witness-runner, tempfile
// ============================================================================

//! ## Overview
//! Each test runs a step in a fresh working directory with an Ed25519 signer
//! and inspects the returned collection and envelope.

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

use std::sync::Arc;

use time::OffsetDateTime;
use witness_core::COLLECTION_TYPE;
use witness_core::ClassifiedError;
use witness_core::Collection;
use witness_core::Envelope;
use witness_core::HashFunction;
use witness_core::LogSink;
use witness_core::Signer;
use witness_core::Statement;
use witness_core::attestation::COMMAND_RUN_TYPE;
use witness_core::attestation::MATERIAL_TYPE;
use witness_core::attestation::PRODUCT_TYPE;
use witness_core::envelope;
use witness_core::envelope::INTOTO_PAYLOAD_TYPE;
use witness_core::envelope::VerifyOptions;
use witness_core::is_attestor_error;
use witness_core::is_infrastructure_error;
use witness_core::logging::MemoryLogSink;
use witness_runner::ContinuePolicy;
use witness_runner::ExportError;
use witness_runner::ExportSink;
use witness_runner::FileSink;
use witness_runner::RunError;
use witness_runner::RunOptions;
use witness_runner::Runner;

use crate::common::FAILING_TYPE;
use crate::common::argv;
use crate::common::ed25519_signer;
use crate::common::test_registry;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Sink that always fails.
struct BrokenSink;

impl ExportSink for BrokenSink {
    fn name(&self) -> &'static str {
        "broken-sink"
    }

    fn export(&self, _envelope: &Envelope, _log: &dyn LogSink) -> Result<(), ExportError> {
        Err(ExportError::Write("disk full".to_string()))
    }
}

/// Options for a silent sha256 run of `cmd` in `dir`.
fn options(dir: &std::path::Path, cmd: &[&str]) -> RunOptions {
    RunOptions::new("build", dir)
        .with_command(argv(cmd))
        .with_hashes(vec![HashFunction::Sha256])
        .with_silent(true)
}

/// Decodes the statement carried by an envelope.
fn statement_of(envelope: &Envelope) -> Statement {
    assert_eq!(envelope.payload_type, INTOTO_PAYLOAD_TYPE);
    Statement::from_json(&envelope.payload).unwrap()
}

/// Returns the attestation type URIs of a run in collection order.
fn types_of(result: &witness_runner::RunResult) -> Vec<&str> {
    result.collection.attestations.iter().map(|entry| entry.type_uri.as_str()).collect()
}

// ============================================================================
// SECTION: Signing
// ============================================================================

#[cfg(unix)]
#[test]
fn run_signs_collection_with_products_as_subjects() {
    let dir = tempfile::tempdir().unwrap();
    let signer = ed25519_signer();
    let verifier = signer.verifier().unwrap();
    let registry = test_registry();
    let runner = Runner::new(&registry).with_signer(Box::new(signer));

    let result = runner.run(&options(dir.path(), &["sh", "-c", "echo 'hello' > out.txt"])).unwrap();

    assert_eq!(types_of(&result), vec![MATERIAL_TYPE, COMMAND_RUN_TYPE, PRODUCT_TYPE]);
    assert!(result.collection.materials().unwrap().is_empty());
    assert!(result.errors.is_empty());

    let statement = statement_of(&result.envelope);
    assert_eq!(statement.predicate_type, COLLECTION_TYPE);
    assert_eq!(statement.subject.len(), 1);
    assert_eq!(statement.subject[0].name, "out.txt");
    assert_eq!(
        statement.subject[0].digest.get(HashFunction::Sha256),
        Some("5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03")
    );

    let passed = envelope::verify(
        &result.envelope,
        &VerifyOptions::new(vec![verifier.as_ref()], OffsetDateTime::now_utc()),
    )
    .unwrap();
    assert_eq!(passed.len(), 1);
}

#[cfg(unix)]
#[test]
fn signatures_follow_signer_order() {
    let dir = tempfile::tempdir().unwrap();
    let first = ed25519_signer();
    let second = ed25519_signer();
    let expected = vec![first.key_id().unwrap(), second.key_id().unwrap()];
    let registry = test_registry();
    let runner =
        Runner::new(&registry).with_signer(Box::new(first)).with_signer(Box::new(second));

    let result = runner.run(&options(dir.path(), &["true"])).unwrap();
    let key_ids: Vec<String> =
        result.envelope.signatures.iter().map(|signature| signature.key_id.clone()).collect();
    assert_eq!(key_ids, expected);
}

#[test]
fn runs_without_command_skip_command_run() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();
    let runner = Runner::new(&registry).with_signer(Box::new(ed25519_signer()));

    let result = runner.run(&RunOptions::new("build", dir.path())).unwrap();
    assert_eq!(types_of(&result), vec![MATERIAL_TYPE, PRODUCT_TYPE]);
}

#[test]
fn missing_step_or_signer_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();

    let unsigned = Runner::new(&registry).run(&RunOptions::new("build", dir.path()));
    assert!(matches!(unsigned, Err(RunError::InvalidOptions(_))));

    let unnamed = Runner::new(&registry)
        .with_signer(Box::new(ed25519_signer()))
        .run(&RunOptions::new(" ", dir.path()));
    assert!(matches!(unnamed, Err(RunError::InvalidOptions(_))));
}

#[test]
fn unknown_attestor_is_a_registry_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();
    let runner = Runner::new(&registry).with_signer(Box::new(ed25519_signer()));
    let result = runner.run(&RunOptions::new("build", dir.path()).with_attestor("no-such-attestor"));
    assert!(matches!(result, Err(RunError::Registry(_))));
}

// ============================================================================
// SECTION: Assembly
// ============================================================================

#[test]
fn duplicate_requests_are_skipped_and_logged() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(MemoryLogSink::new());
    let registry = test_registry();
    let runner = Runner::new(&registry).with_signer(Box::new(ed25519_signer()));
    let run_options = RunOptions::new("build", dir.path())
        .with_attestor("environment")
        .with_attestor("https://witness.dev/attestations/environment/v0.1")
        .with_attestor("material")
        .with_log_sink(log.clone());

    let result = runner.run(&run_options).unwrap();
    let environment_count = result
        .collection
        .attestations
        .iter()
        .filter(|entry| entry.type_uri.ends_with("/environment/v0.1"))
        .count();
    assert_eq!(environment_count, 1);
    assert_eq!(
        log.events().iter().filter(|event| event.event == "duplicate_attestor").count(),
        2
    );
}

#[test]
fn user_subjects_join_the_statement() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();
    let runner = Runner::new(&registry).with_signer(Box::new(ed25519_signer()));
    let run_options = RunOptions::new("build", dir.path())
        .with_hashes(vec![HashFunction::Sha256])
        .with_subject("release", "v1.2.3");

    let result = runner.run(&run_options).unwrap();
    let statement = statement_of(&result.envelope);
    let names: Vec<&str> = statement.subject.iter().map(|subject| subject.name.as_str()).collect();
    assert_eq!(names, vec!["release"]);
}

// ============================================================================
// SECTION: Continuation
// ============================================================================

#[cfg(unix)]
#[test]
fn attestor_failure_aborts_without_flag() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();
    let runner = Runner::new(&registry).with_signer(Box::new(ed25519_signer()));

    let err = runner.run(&options(dir.path(), &["true"]).with_attestor("failing")).unwrap_err();
    assert!(matches!(err, RunError::Aborted(ClassifiedError::Attestor { .. })));
    assert!(is_attestor_error(&err));
}

#[cfg(unix)]
#[test]
fn continue_on_attestor_error_still_signs_when_command_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();
    let runner = Runner::new(&registry).with_signer(Box::new(ed25519_signer()));
    let policy = ContinuePolicy {
        on_attestor_error: true,
        ..ContinuePolicy::default()
    };

    let result = runner
        .run(&options(dir.path(), &["true"]).with_attestor("failing").with_continue_policy(policy))
        .unwrap();
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].component(), "failing");
    assert!(!types_of(&result).contains(&FAILING_TYPE));
    assert_eq!(result.envelope.signatures.len(), 1);
}

#[cfg(unix)]
#[test]
fn failed_command_is_signed_and_exported_before_failing_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("build.json");
    let signer = ed25519_signer();
    let verifier = signer.verifier().unwrap();
    let registry = test_registry();
    let runner = Runner::new(&registry)
        .with_signer(Box::new(signer))
        .with_sink(Box::new(FileSink::new(Some(path.clone()))));
    let policy = ContinuePolicy {
        on_attestor_error: true,
        on_infrastructure_error: true,
        on_all_errors: true,
    };

    let err = runner
        .run(
            &options(dir.path(), &["sh", "-c", "echo 'partial' > out.txt; exit 3"])
                .with_continue_policy(policy),
        )
        .unwrap_err();
    assert!(matches!(err, RunError::CommandFailed(_)));
    assert!(is_attestor_error(&err));

    let written = Envelope::from_json(&std::fs::read(&path).unwrap()).unwrap();
    let passed = envelope::verify(
        &written,
        &VerifyOptions::new(vec![verifier.as_ref()], OffsetDateTime::now_utc()),
    )
    .unwrap();
    assert_eq!(passed.len(), 1);

    let statement = statement_of(&written);
    assert_eq!(statement.subject[0].name, "out.txt");
    let collection: Collection = serde_json::from_value(statement.predicate).unwrap();
    let command = collection.attestation(COMMAND_RUN_TYPE).unwrap();
    assert_eq!(command["exitcode"], 3);
    assert!(collection.attestation(PRODUCT_TYPE).is_some());
}

#[cfg(unix)]
#[test]
fn flags_stop_applying_once_the_command_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("build.json");
    let registry = test_registry();
    let runner = Runner::new(&registry)
        .with_signer(Box::new(ed25519_signer()))
        .with_sink(Box::new(FileSink::new(Some(path.clone()))));
    let policy = ContinuePolicy {
        on_attestor_error: true,
        on_infrastructure_error: true,
        on_all_errors: true,
    };

    let err = runner
        .run(
            &options(dir.path(), &["sh", "-c", "exit 3"])
                .with_attestor("failing")
                .with_continue_policy(policy),
        )
        .unwrap_err();
    assert!(matches!(err, RunError::Aborted(ClassifiedError::Attestor { .. })));
    assert!(!path.exists());
}

#[cfg(unix)]
#[test]
fn sink_failures_follow_the_infrastructure_flag() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();

    let strict = Runner::new(&registry)
        .with_signer(Box::new(ed25519_signer()))
        .with_sink(Box::new(BrokenSink));
    let err = strict.run(&options(dir.path(), &["true"])).unwrap_err();
    assert!(is_infrastructure_error(&err));

    let lenient = Runner::new(&registry)
        .with_signer(Box::new(ed25519_signer()))
        .with_sink(Box::new(BrokenSink));
    let policy = ContinuePolicy {
        on_infrastructure_error: true,
        ..ContinuePolicy::default()
    };
    let result = lenient.run(&options(dir.path(), &["true"]).with_continue_policy(policy)).unwrap();
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].component(), "broken-sink");
}

#[cfg(unix)]
#[test]
fn file_sink_receives_the_primary_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("build.json");
    let registry = test_registry();
    let runner = Runner::new(&registry)
        .with_signer(Box::new(ed25519_signer()))
        .with_sink(Box::new(FileSink::new(Some(path.clone()))));

    let result = runner.run(&options(dir.path(), &["true"])).unwrap();
    let written = Envelope::from_json(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written, result.envelope);
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

#[test]
fn cancelled_token_signs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("never.json");
    let registry = test_registry();
    let runner = Runner::new(&registry)
        .with_signer(Box::new(ed25519_signer()))
        .with_sink(Box::new(FileSink::new(Some(path.clone()))));
    let run_options = RunOptions::new("build", dir.path());
    run_options.cancel.cancel();

    assert!(matches!(runner.run(&run_options), Err(RunError::Cancelled)));
    assert!(!path.exists());
}

#[test]
fn cancellation_mid_run_skips_remaining_attestors() {
    let dir = tempfile::tempdir().unwrap();
    let registry = test_registry();
    let runner = Runner::new(&registry).with_signer(Box::new(ed25519_signer()));
    let policy = ContinuePolicy {
        on_all_errors: true,
        ..ContinuePolicy::default()
    };
    let run_options =
        RunOptions::new("build", dir.path()).with_attestor("cancelling").with_continue_policy(policy);

    assert!(matches!(runner.run(&run_options), Err(RunError::Cancelled)));
    assert!(run_options.cancel.is_cancelled());
}
