// crates/witness-cli/tests/cli.rs
// ============================================================================
// Module: CLI Binary Tests
// Description: End-to-end runs of the witness binary.
// Purpose: Pin subcommand behavior and the exit-code contract.
// Dependencies: witness binary, rcgen, tempfile
// ============================================================================

//! ## Overview
//! Each test drives the compiled binary in a throwaway directory. The
//! attested command is `sh -c`, so the run tests assume a POSIX shell.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;

use common::Workspace;
use common::arg;
use common::exit_code;
use common::stderr;
use common::stdout;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Attests `echo hi > out.txt` as step `build` and returns the envelope path.
fn attest_build(workspace: &Workspace) -> PathBuf {
    let envelope = workspace.path("build.json");
    let output = workspace.witness(&[
        "run",
        "-s",
        "build",
        "-k",
        &arg(&workspace.private_key),
        "-o",
        &arg(&envelope),
        "-d",
        &arg(&workspace.build_dir),
        "--",
        "sh",
        "-c",
        "echo hi > out.txt",
    ]);
    assert_eq!(exit_code(&output), 0, "{}", stderr(&output));
    assert!(stderr(&output).contains("Attestation for step build written"));
    envelope
}

/// Generates a one-step policy trusting the workspace key.
fn generate_build_policy(workspace: &Workspace) -> PathBuf {
    let policy = workspace.path("policy.json");
    let mapping = format!("build={}", arg(&workspace.public_key));
    let output = workspace.witness(&[
        "policy",
        "generate",
        "--step",
        "build",
        "--public-key",
        &mapping,
        "-o",
        &arg(&policy),
    ]);
    assert_eq!(exit_code(&output), 0, "{}", stderr(&output));
    policy
}

// ============================================================================
// SECTION: Attestors
// ============================================================================

#[test]
fn attestors_list_shows_builtin_attestors() {
    let workspace = Workspace::new();
    let output = workspace.witness(&["attestors", "list"]);
    assert_eq!(exit_code(&output), 0);
    let text = stdout(&output);
    assert!(text.starts_with("NAME\tTYPE\tPHASE"));
    for name in ["material", "product", "command-run", "environment", "git"] {
        assert!(text.lines().any(|line| line.starts_with(&format!("{name}\t"))), "{name}");
    }
}

#[test]
fn attestors_schema_and_docs_resolve_names() {
    let workspace = Workspace::new();
    let schema = workspace.witness(&["attestors", "schema", "command-run"]);
    assert_eq!(exit_code(&schema), 0);
    let value: serde_json::Value = serde_json::from_str(&stdout(&schema)).unwrap();
    assert!(value.is_object());

    let docs = workspace.witness(&["attestors", "docs", "product"]);
    assert_eq!(exit_code(&docs), 0);
    assert!(stdout(&docs).contains("--attestor-product-include-glob"));

    let unknown = workspace.witness(&["attestors", "schema", "nope"]);
    assert_eq!(exit_code(&unknown), 1);
    assert!(stderr(&unknown).contains("Unknown attestor: nope"));
}

// ============================================================================
// SECTION: Policy
// ============================================================================

#[test]
fn generated_policies_pass_check() {
    let workspace = Workspace::new();
    let policy = generate_build_policy(&workspace);
    let text = workspace.witness(&["policy", "check", &arg(&policy)]);
    assert_eq!(exit_code(&text), 0, "{}", stdout(&text));

    let json = workspace.witness(&["policy", "check", &arg(&policy), "--format", "json"]);
    assert_eq!(exit_code(&json), 0);
    let report: serde_json::Value = serde_json::from_str(&stdout(&json)).unwrap();
    assert_eq!(report["valid"], serde_json::Value::Bool(true));
}

#[test]
fn broken_policies_fail_check() {
    let workspace = Workspace::new();
    let policy = workspace.path("broken.json");
    fs::write(&policy, br#"{"expires":"2020-01-01T00:00:00Z","steps":{}}"#).unwrap();
    let output = workspace.witness(&["policy", "check", &arg(&policy)]);
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("Policy validation failed"));
}

#[test]
fn policy_generate_rejects_unknown_steps() {
    let workspace = Workspace::new();
    let mapping = format!("deploy={}", arg(&workspace.public_key));
    let output = workspace.witness(&[
        "policy",
        "generate",
        "--step",
        "build",
        "--public-key",
        &mapping,
    ]);
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("policy-invalid"), "{}", stderr(&output));
}

// ============================================================================
// SECTION: Run And Verify
// ============================================================================

#[test]
fn run_then_verify_with_unsigned_policy() {
    let workspace = Workspace::new();
    let envelope = attest_build(&workspace);
    let policy = generate_build_policy(&workspace);
    let artifact = workspace.build_dir.join("out.txt");
    assert_eq!(fs::read_to_string(&artifact).unwrap(), "hi\n");

    let output = workspace.witness(&[
        "verify",
        "-p",
        &arg(&policy),
        "--allow-unsigned-policy",
        "-a",
        &arg(&envelope),
        "-f",
        &arg(&artifact),
    ]);
    assert_eq!(exit_code(&output), 0, "{}", stderr(&output));
    assert!(stdout(&output).contains("Verification succeeded for steps: build"));
}

#[test]
fn verify_denies_unknown_subjects() {
    let workspace = Workspace::new();
    let envelope = attest_build(&workspace);
    let policy = generate_build_policy(&workspace);
    let subject = format!("sha256:{}", "0".repeat(64));
    let output = workspace.witness(&[
        "verify",
        "-p",
        &arg(&policy),
        "--allow-unsigned-policy",
        "-a",
        &arg(&envelope),
        "-s",
        &subject,
    ]);
    assert_eq!(exit_code(&output), 4, "{}", stderr(&output));
}

#[test]
fn unsigned_policies_need_explicit_opt_in() {
    let workspace = Workspace::new();
    let envelope = attest_build(&workspace);
    let policy = generate_build_policy(&workspace);
    let artifact = workspace.build_dir.join("out.txt");
    let output = workspace.witness(&[
        "verify",
        "-p",
        &arg(&policy),
        "-a",
        &arg(&envelope),
        "-f",
        &arg(&artifact),
    ]);
    assert_eq!(exit_code(&output), 4);
    assert!(stderr(&output).contains("functionary-mismatch"), "{}", stderr(&output));
}

#[test]
fn signed_policies_verify_with_the_public_key() {
    let workspace = Workspace::new();
    let envelope = attest_build(&workspace);
    let policy = generate_build_policy(&workspace);
    let signed = workspace.path("policy.signed.json");
    let sign = workspace.witness(&[
        "sign",
        "-f",
        &arg(&policy),
        "-o",
        &arg(&signed),
        "-k",
        &arg(&workspace.private_key),
    ]);
    assert_eq!(exit_code(&sign), 0, "{}", stderr(&sign));

    let artifact = workspace.build_dir.join("out.txt");
    let output = workspace.witness(&[
        "verify",
        "-p",
        &arg(&signed),
        "-k",
        &arg(&workspace.public_key),
        "-a",
        &arg(&envelope),
        "-f",
        &arg(&artifact),
    ]);
    assert_eq!(exit_code(&output), 0, "{}", stderr(&output));
}

#[test]
fn failing_commands_exit_with_the_attestor_code() {
    let workspace = Workspace::new();
    let envelope = workspace.path("failed.json");
    let output = workspace.witness(&[
        "run",
        "-s",
        "build",
        "-k",
        &arg(&workspace.private_key),
        "-o",
        &arg(&envelope),
        "-d",
        &arg(&workspace.build_dir),
        "--",
        "sh",
        "-c",
        "exit 3",
    ]);
    assert_eq!(exit_code(&output), 2, "{}", stderr(&output));

    let written = witness_core::Envelope::from_json(&fs::read(&envelope).unwrap()).unwrap();
    assert_eq!(written.signatures.len(), 1);
    let statement = witness_core::Statement::from_json(&written.payload).unwrap();
    let collection: witness_core::Collection =
        serde_json::from_value(statement.predicate).unwrap();
    let command = collection.attestation(witness_core::attestation::COMMAND_RUN_TYPE).unwrap();
    assert_eq!(command["exitcode"], 3);
}

#[test]
fn run_requires_a_signing_key() {
    let workspace = Workspace::new();
    let output = workspace.witness(&["run", "-s", "build", "--", "true"]);
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("--signer-file-key-path"));
}

// ============================================================================
// SECTION: Config And Attach
// ============================================================================

#[test]
fn config_file_supplies_run_defaults() {
    let workspace = Workspace::new();
    let envelope = workspace.path("from-config.json");
    let config = format!(
        "[run]\nstep = \"build\"\nsigner-file-key-path = \"{}\"\noutfile = \"{}\"\n",
        arg(&workspace.private_key),
        arg(&envelope)
    );
    fs::write(workspace.path(".witness.toml"), config).unwrap();
    let output = workspace.witness(&["run", "-d", &arg(&workspace.build_dir), "--", "true"]);
    assert_eq!(exit_code(&output), 0, "{}", stderr(&output));
    assert!(envelope.is_file());
}

#[test]
fn unknown_config_keys_are_rejected() {
    let workspace = Workspace::new();
    let config = workspace.path("bad.toml");
    fs::write(&config, "[run]\nbogus = true\n").unwrap();
    let output = workspace.witness(&["-c", &arg(&config), "attestors", "list"]);
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("Invalid config file"));
}

#[test]
fn attach_without_a_registry_is_an_infrastructure_failure() {
    let workspace = Workspace::new();
    let payload = workspace.path("payload.json");
    fs::write(&payload, br#"{"hello":"world"}"#).unwrap();
    let envelope = workspace.path("payload.envelope.json");
    let sign = workspace.witness(&[
        "sign",
        "-f",
        &arg(&payload),
        "-t",
        "application/json",
        "-o",
        &arg(&envelope),
        "-k",
        &arg(&workspace.private_key),
    ]);
    assert_eq!(exit_code(&sign), 0, "{}", stderr(&sign));

    let output = workspace.witness(&[
        "attach",
        "attestation",
        "--attestation",
        &arg(&envelope),
        "registry.example.test/app:1.0",
    ]);
    assert_eq!(exit_code(&output), 3, "{}", stderr(&output));
}
