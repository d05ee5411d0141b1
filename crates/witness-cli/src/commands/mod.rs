// crates/witness-cli/src/commands/mod.rs
// ============================================================================
// Module: CLI Commands
// Description: Subcommand dispatch and shared command helpers.
// Purpose: Route parsed invocations to their handlers.
// Dependencies: witness-core, witness-runner
// ============================================================================

//! ## Overview
//! Every handler returns `CliResult<ExitCode>`. Shared concerns (signer and
//! timestamper construction, archive clients, `key=value` flags) live here
//! so `run`, `sign`, and `verify` resolve them identically.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod attach;
pub mod attestors;
pub mod policy;
pub mod run;
pub mod sign;
pub mod verify;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use url::Url;
use witness_core::AttestorRegistry;
use witness_core::HashFunction;
use witness_core::SharedLogSink;
use witness_core::Signer;
use witness_core::crypto::SignerProvider;
use witness_core::crypto::signer::FileSignerOptions;
use witness_core::envelope::timestamp::Rfc3161Timestamper;
use witness_core::envelope::timestamp::Timestamper;
use witness_runner::ArchivistaClient;

use crate::cli::AttachCommand;
use crate::cli::AttestorsCommand;
use crate::cli::Commands;
use crate::cli::Invocation;
use crate::cli::PolicyCommand;
use crate::cli::SignerArgs;
use crate::config::SignerSection;
use crate::config::WitnessConfig;
use crate::config::pick;
use crate::config::pick_list;
use crate::error::CliError;
use crate::error::CliResult;
use crate::t;

/// Archive server used when none is configured.
pub const DEFAULT_ARCHIVISTA_SERVER: &str = "https://archivista.testifysec.io";

// ============================================================================
// SECTION: Context
// ============================================================================

/// State shared by every handler.
pub struct CommandContext {
    /// Loaded config file.
    pub config: WitnessConfig,
    /// Structured log sink.
    pub log: SharedLogSink,
    /// Cancelled on interrupt.
    pub cancel: CancellationToken,
    /// Attestor registry.
    pub registry: &'static AttestorRegistry,
}

/// Dispatches a parsed invocation.
///
/// # Errors
///
/// Returns the handler's [`CliError`].
pub fn dispatch(invocation: Invocation, context: &CommandContext) -> CliResult<ExitCode> {
    let Invocation {
        cli,
        attestor_options,
    } = invocation;
    match cli.command {
        Commands::Run(args) => run::command_run(&args, attestor_options, context),
        Commands::Sign(args) => sign::command_sign(&args, context),
        Commands::Verify(args) => verify::command_verify(&args, context),
        Commands::Policy {
            command,
        } => match command {
            PolicyCommand::Check(args) => policy::command_policy_check(&args),
            PolicyCommand::Generate(args) => policy::command_policy_generate(&args, context),
        },
        Commands::Attestors {
            command,
        } => match command {
            AttestorsCommand::List => attestors::command_attestors_list(context.registry),
            AttestorsCommand::Schema {
                name,
            } => attestors::command_attestors_schema(context.registry, &name),
            AttestorsCommand::Docs {
                name,
            } => attestors::command_attestors_docs(context.registry, name.as_deref()),
        },
        Commands::Attach {
            command,
        } => match command {
            AttachCommand::Attestation(args) => attach::command_attach_attestation(&args),
        },
    }
}

// ============================================================================
// SECTION: Shared Helpers
// ============================================================================

/// Splits a `key=value` flag value.
///
/// # Errors
///
/// Returns [`CliError::Message`] when the `=` is missing or either side is
/// empty.
pub fn parse_mapping(flag: &str, value: &str) -> CliResult<(String, String)> {
    match value.split_once('=') {
        Some((key, mapped)) if !key.trim().is_empty() && !mapped.is_empty() => {
            Ok((key.trim().to_string(), mapped.to_string()))
        }
        _ => Err(CliError::new(t!("flag.mapping_invalid", flag = flag, value = value))),
    }
}

/// Parses hash function names.
///
/// # Errors
///
/// Returns [`CliError::Message`] for unsupported names.
pub fn parse_hashes(names: &[String]) -> CliResult<Vec<HashFunction>> {
    names
        .iter()
        .map(|name| {
            name.parse::<HashFunction>()
                .map_err(|error| CliError::new(t!("flag.hash_invalid", error = error)))
        })
        .collect()
}

/// Builds the file signer from flags, falling back to config values.
///
/// # Errors
///
/// Returns [`CliError::Message`] when no key is configured or the key and
/// certificates fail to load.
pub fn build_signer(flags: &SignerArgs, config: &SignerSection) -> CliResult<Box<dyn Signer>> {
    let key_path: PathBuf = pick(flags.key_path.clone(), config.signer_file_key_path.as_ref())
        .ok_or_else(|| CliError::new(t!("signer.missing_key")))?;
    let options = FileSignerOptions {
        key_path,
        cert_path: pick(flags.cert_path.clone(), config.signer_file_cert_path.as_ref()),
        intermediate_paths: pick_list(
            &flags.intermediate_paths,
            &config.signer_file_intermediate_paths,
        ),
    };
    SignerProvider::File(options)
        .into_signer()
        .map_err(|error| CliError::new(t!("signer.load_failed", error = error)))
}

/// Builds RFC 3161 timestampers for the given URLs.
///
/// # Errors
///
/// Returns [`CliError::Message`] for non-HTTP URLs or client setup failures.
pub fn build_timestampers(
    urls: &[String],
    cancel: &CancellationToken,
) -> CliResult<Vec<Box<dyn Timestamper>>> {
    urls.iter()
        .map(|url| {
            let invalid = |error: &dyn std::fmt::Display| {
                CliError::new(t!("timestamp.invalid_server", url = url, error = error))
            };
            let parsed = Url::parse(url).map_err(|error| invalid(&error))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(invalid(&"expected an http or https URL"));
            }
            Rfc3161Timestamper::new(url.as_str())
                .map(|timestamper| {
                    Box::new(timestamper.with_cancellation(cancel.clone())) as Box<dyn Timestamper>
                })
                .map_err(|error| invalid(&error))
        })
        .collect()
}

/// Builds the archive client, defaulting the server URL.
///
/// # Errors
///
/// Returns [`CliError::Message`] for malformed URLs.
pub fn archive_client(
    url: Option<String>,
    cancel: &CancellationToken,
) -> CliResult<ArchivistaClient> {
    let url = url.unwrap_or_else(|| DEFAULT_ARCHIVISTA_SERVER.to_string());
    ArchivistaClient::new(&url)
        .map(|client| client.with_cancellation(cancel.clone()))
        .map_err(|error| CliError::new(t!("archive.client_failed", error = error)))
}

#[cfg(test)]
mod tests;
