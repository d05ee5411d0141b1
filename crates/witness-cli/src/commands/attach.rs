// crates/witness-cli/src/commands/attach.rs
// ============================================================================
// Module: Attach Command
// Description: `witness attach attestation`.
// Purpose: Push an envelope as a referrer of a container image.
// Dependencies: witness-runner, witness-core
// ============================================================================


//! Push an envelope as a referrer of a container image.
use std::process::ExitCode;

use witness_core::ClassifiedError;
use witness_runner::ExportError;
use witness_runner::export::attach_envelope;

use crate::cli::AttachAttestationArgs;
use crate::error::CliError;
use crate::error::CliResult;
use crate::io::read_envelope;
use crate::io::write_stdout_line;
use crate::oci::UnconfiguredOciStore;
use crate::t;

/// Executes `witness attach attestation`.
///
/// # Errors
///
/// Returns [`CliError::Message`] for unreadable envelopes or malformed
/// references, and an infrastructure error when the registry fails.
pub fn command_attach_attestation(args: &AttachAttestationArgs) -> CliResult<ExitCode> {
    let envelope = read_envelope(&args.attestation)?;
    let digest = attach_envelope(&UnconfiguredOciStore, &args.image, &envelope).map_err(|error| {
        match error {
            ExportError::Store(_) | ExportError::Write(_) => {
                CliError::from(ClassifiedError::infrastructure("attach", error))
            }
            ExportError::Reference(_) | ExportError::Encode(_) => {
                CliError::new(t!("attach.invalid", error = error))
            }
        }
    })?;
    write_stdout_line(&t!("attach.done", digest = digest, reference = args.image))?;
    Ok(ExitCode::SUCCESS)
}
