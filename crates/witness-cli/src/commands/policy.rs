// crates/witness-cli/src/commands/policy.rs
// ============================================================================
// Module: Policy Commands
// Description: `witness policy check` and `witness policy generate`.
// Purpose: Validate policy documents and assemble new ones from flags.
// Dependencies: witness-policy, serde_json, time
// ============================================================================


//! Validate policy documents and assemble new ones from flags.
use std::process::ExitCode;

use time::OffsetDateTime;
use witness_policy::GenerateOptions;
use witness_policy::RegoRuleEvaluator;
use witness_policy::check::render_text;
use witness_policy::check_policy;
use witness_policy::generate_policy;

use super::CommandContext;
use crate::cli::OutputFormat;
use crate::cli::PolicyCheckArgs;
use crate::cli::PolicyGenerateArgs;
use crate::error::CliError;
use crate::error::CliResult;
use crate::error::EXIT_FAILURE;
use crate::io::MAX_DOCUMENT_BYTES;
use crate::io::read_input;
use crate::io::write_output;
use crate::io::write_stderr_line;
use crate::io::write_stdout_line;
use crate::t;

/// Executes `witness policy check`. Exits 1 when the report has errors.
///
/// # Errors
///
/// Returns [`CliError::Message`] when the file is unreadable or the report
/// cannot be written.
pub fn command_policy_check(args: &PolicyCheckArgs) -> CliResult<ExitCode> {
    let bytes = read_input(&args.file, MAX_DOCUMENT_BYTES, &t!("input.kind.policy"))?;
    let report = check_policy(&bytes, &RegoRuleEvaluator, OffsetDateTime::now_utc());
    match args.format {
        OutputFormat::Text => write_stdout_line(render_text(&report).trim_end())?,
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|error| CliError::new(t!("policy.encode_failed", error = error)))?;
            write_stdout_line(&json)?;
        }
    }
    if report.valid {
        Ok(ExitCode::SUCCESS)
    } else {
        write_stderr_line(&t!("policy.check.failed"))?;
        Ok(ExitCode::from(EXIT_FAILURE))
    }
}

/// Executes `witness policy generate`.
///
/// # Errors
///
/// Returns [`CliError::Policy`] for invalid flags or key material and
/// [`CliError::Message`] when the output cannot be written.
pub fn command_policy_generate(
    args: &PolicyGenerateArgs,
    context: &CommandContext,
) -> CliResult<ExitCode> {
    let options = GenerateOptions {
        steps: args.steps.clone(),
        public_keys: args.public_keys.clone(),
        root_cas: args.root_cas.clone(),
        intermediates: args.intermediates.clone(),
        tsa_cas: args.tsa_cas.clone(),
        attestations: args.attestations.clone(),
        cert_common_names: args.cert_common_names.clone(),
        cert_dns_names: args.cert_dns_names.clone(),
        cert_emails: args.cert_emails.clone(),
        cert_organizations: args.cert_organizations.clone(),
        cert_uris: args.cert_uris.clone(),
        artifacts_from: args.artifacts_from.clone(),
        expires_in: args.expires_in.clone(),
    };
    let policy = generate_policy(&options, context.registry, OffsetDateTime::now_utc())?;
    let bytes = policy.to_json()?;
    write_output(args.output.as_deref(), &bytes)?;
    if let Some(path) = &args.output {
        write_stderr_line(&t!("policy.generate.done", path = path.display()))?;
    }
    Ok(ExitCode::SUCCESS)
}
