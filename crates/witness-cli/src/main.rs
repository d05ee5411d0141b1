// crates/witness-cli/src/main.rs
// ============================================================================
// Module: Witness CLI Entry Point
// Description: Binary entry point for the witness command.
// Purpose: Parse arguments, set up logging and interrupts, and dispatch.
// Dependencies: witness-cli, witness-attestors, tokio-util
// ============================================================================

//! Binary entry point for the witness command: parse arguments, set up
//! logging and interrupts, and dispatch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use witness_attestors::registry::builtin_registry;
use witness_cli::CliError;
use witness_cli::CliResult;
use witness_cli::CommandContext;
use witness_cli::config::load_config;
use witness_cli::dispatch;
use witness_cli::error::EXIT_FAILURE;
use witness_cli::io::write_stderr_line;
use witness_cli::logging::build_log_sink;
use witness_cli::parse_args;
use witness_cli::signal::install_interrupt_handler;
use witness_cli::t;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err),
    }
}

/// Parses arguments and dispatches the selected command.
fn run() -> CliResult<ExitCode> {
    let registry = builtin_registry();
    let invocation = match parse_args(std::env::args_os(), registry) {
        Ok(invocation) => invocation,
        Err(err) => {
            let _ = err.print();
            return Ok(if err.use_stderr() {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            });
        }
    };

    let config = load_config(invocation.cli.config.as_deref())?;
    let level = invocation.cli.log_level.clone().or_else(|| config.log.level.clone());
    let file = invocation.cli.log_file.clone().or_else(|| config.log.file.clone());
    let log = build_log_sink(level.as_deref(), file.as_deref())?;
    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone())?;

    let context = CommandContext {
        config,
        log,
        cancel,
        registry,
    };
    let result = dispatch(invocation, &context);
    context.cancel.cancel();
    result
}

/// Writes an error to stderr and returns its exit code.
fn emit_error(err: &CliError) -> ExitCode {
    let _ = write_stderr_line(&t!("main.error", error = err));
    ExitCode::from(err.exit_code())
}
