// crates/witness-cli/src/commands/run.rs
// ============================================================================
// Module: Run Command
// Description: `witness run` handler.
// Purpose: Attest a step around a user command and export the envelope.
// Dependencies: witness-runner, witness-core
// ============================================================================


//! Attest a step around a user command and export the envelope.
// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use witness_core::AttestorOptions;
use witness_runner::ArchiveSink;
use witness_runner::ContinuePolicy;
use witness_runner::FileSink;
use witness_runner::OciReferrerSink;
use witness_runner::RunOptions;
use witness_runner::Runner;

use super::CommandContext;
use super::archive_client;
use super::build_signer;
use super::build_timestampers;
use super::parse_hashes;
use super::parse_mapping;
use crate::cli::RunArgs;
use crate::config::pick;
use crate::config::pick_list;
use crate::config::pick_switch;
use crate::error::CliError;
use crate::error::CliResult;
use crate::io::write_stderr_line;
use crate::oci::UnconfiguredOciStore;
use crate::t;

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Executes `witness run`.
///
/// # Errors
///
/// Returns [`CliError`] for invalid flags, signer setup failures, and run
/// failures not tolerated by the continuation flags.
pub fn command_run(
    args: &RunArgs,
    attestor_options: BTreeMap<String, AttestorOptions>,
    context: &CommandContext,
) -> CliResult<ExitCode> {
    let config = &context.config.run;
    let step = pick(args.step.clone(), config.step.as_ref())
        .filter(|step| !step.trim().is_empty())
        .ok_or_else(|| CliError::new(t!("run.step_required")))?;
    let working_dir =
        resolve_working_dir(pick(args.workingdir.clone(), config.workingdir.as_ref()))?;
    let hashes = parse_hashes(&pick_list(&args.hashes, &config.hashes))?;
    let signer_config = config.signer();
    let signer = build_signer(&args.signer, &signer_config)?;
    let timestamp_servers =
        pick_list(&args.signer.timestamp_servers, &signer_config.timestamp_servers);

    let mut runner = Runner::new(context.registry).with_signer(signer);
    for timestamper in build_timestampers(&timestamp_servers, &context.cancel)? {
        runner = runner.with_timestamper(timestamper);
    }
    let outfile = pick(args.outfile.clone(), config.outfile.as_ref());
    runner = runner.with_sink(Box::new(FileSink::new(outfile)));
    if pick_switch(args.enable_archivista, config.enable_archivista) {
        let server = pick(args.archivista_server.clone(), config.archivista_server.as_ref());
        let client = archive_client(server, &context.cancel)?;
        runner = runner.with_sink(Box::new(ArchiveSink::new(Arc::new(client))));
    }
    if let Some(image) = &args.attach_image {
        let sink = OciReferrerSink::new(Arc::new(UnconfiguredOciStore), image.clone());
        runner = runner.with_sink(Box::new(sink));
    }

    let continue_policy = ContinuePolicy {
        on_attestor_error: pick_switch(
            args.continue_on_attestor_error,
            config.continue_on_attestor_error,
        ),
        on_infrastructure_error: pick_switch(
            args.continue_on_infra_error,
            config.continue_on_infra_error,
        ),
        on_all_errors: pick_switch(args.continue_on_errors, config.continue_on_errors),
    };
    let mut options = RunOptions::new(step.clone(), working_dir)
        .with_command(args.command.clone())
        .with_hashes(hashes)
        .with_tracing(pick_switch(args.trace, config.trace))
        .with_continue_policy(continue_policy)
        .with_cancellation(context.cancel.clone())
        .with_log_sink(Arc::clone(&context.log));
    for name in pick_list(&args.attestations, &config.attestations) {
        options = options.with_attestor(name);
    }
    for (name, bag) in attestor_options {
        options = options.with_attestor_options(name, bag);
    }
    for subject in &args.subjects {
        let (name, value) = parse_mapping("subject", subject)?;
        options = options.with_subject(name, value);
    }

    let result = runner.run(&options)?;
    for error in &result.errors {
        write_stderr_line(&t!("run.tolerated", error = error))?;
    }
    write_stderr_line(&t!(
        "run.done",
        step = step,
        count = result.collection.attestations.len()
    ))?;
    Ok(ExitCode::SUCCESS)
}

/// Returns the configured working directory or the current one.
fn resolve_working_dir(configured: Option<PathBuf>) -> CliResult<PathBuf> {
    match configured {
        Some(dir) => Ok(dir),
        None => std::env::current_dir()
            .map_err(|error| CliError::new(t!("run.working_dir_failed", error = error))),
    }
}
