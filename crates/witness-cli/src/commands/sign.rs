// crates/witness-cli/src/commands/sign.rs
// ============================================================================
// Module: Sign Command
// Description: `witness sign` handler.
// Purpose: Wrap an arbitrary payload (usually a policy) in a signed envelope.
// Dependencies: witness-core, witness-policy
// ============================================================================


//! Wrap an arbitrary payload (usually a policy) in a signed envelope.
use std::process::ExitCode;

use witness_core::ClassifiedError;
use witness_core::envelope::sign;
use witness_core::envelope::timestamp::Timestamper;
use witness_policy::POLICY_TYPE;

use super::CommandContext;
use super::build_signer;
use super::build_timestampers;
use crate::cli::SignArgs;
use crate::config::pick;
use crate::config::pick_list;
use crate::error::CliError;
use crate::error::CliResult;
use crate::io::MAX_DOCUMENT_BYTES;
use crate::io::read_input;
use crate::io::write_output;
use crate::io::write_stderr_line;
use crate::t;

/// Executes `witness sign`.
///
/// # Errors
///
/// Returns [`CliError::Message`] for unreadable inputs or signer setup
/// failures, and an infrastructure error when signing itself fails.
pub fn command_sign(args: &SignArgs, context: &CommandContext) -> CliResult<ExitCode> {
    let config = &context.config.sign;
    let payload = read_input(&args.infile, MAX_DOCUMENT_BYTES, &t!("input.kind.payload"))?;
    let datatype = pick(args.datatype.clone(), config.datatype.as_ref())
        .unwrap_or_else(|| POLICY_TYPE.to_string());
    let signer_config = config.signer();
    let signer = build_signer(&args.signer, &signer_config)?;
    let timestamp_servers =
        pick_list(&args.signer.timestamp_servers, &signer_config.timestamp_servers);
    let timestampers = build_timestampers(&timestamp_servers, &context.cancel)?;
    let timestamper_refs: Vec<&dyn Timestamper> = timestampers.iter().map(AsRef::as_ref).collect();

    let envelope = sign(&datatype, &payload, &[signer.as_ref()], &timestamper_refs)
        .map_err(|error| ClassifiedError::infrastructure("sign", error))?;
    let bytes = envelope
        .to_json()
        .map_err(|error| CliError::new(t!("sign.failed", error = error)))?;
    write_output(args.outfile.as_deref(), &bytes)?;
    if args.outfile.is_some() {
        write_stderr_line(&t!("sign.done"))?;
    }
    Ok(ExitCode::SUCCESS)
}
