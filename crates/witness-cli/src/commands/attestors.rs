// crates/witness-cli/src/commands/attestors.rs
// ============================================================================
// Module: Attestor Commands
// Description: `witness attestors list|schema|docs`.
// Purpose: Expose registry metadata to users.
// Dependencies: witness-core, serde_json
// ============================================================================


//! Expose registry metadata to users.
use std::process::ExitCode;

use witness_core::AttestorRegistry;
use witness_core::RegistryEntry;

use crate::error::CliError;
use crate::error::CliResult;
use crate::io::write_stdout_line;
use crate::t;

/// Executes `witness attestors list`.
///
/// # Errors
///
/// Returns [`CliError::Message`] when stdout is closed.
pub fn command_attestors_list(registry: &AttestorRegistry) -> CliResult<ExitCode> {
    write_stdout_line(&t!("attestors.list.header"))?;
    for entry in registry.entries() {
        write_stdout_line(&t!(
            "attestors.list.entry",
            name = entry.name,
            type_uri = entry.type_uri,
            phase = entry.phase,
            always_run = entry.always_run
        ))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `witness attestors schema <name>`.
///
/// # Errors
///
/// Returns [`CliError::Message`] for unknown attestors.
pub fn command_attestors_schema(registry: &AttestorRegistry, name: &str) -> CliResult<ExitCode> {
    let entry = lookup(registry, name)?;
    let schema = serde_json::to_string_pretty(&(entry.schema)())
        .map_err(|error| CliError::new(t!("attestors.schema_failed", error = error)))?;
    write_stdout_line(&schema)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `witness attestors docs [name]`.
///
/// # Errors
///
/// Returns [`CliError::Message`] for unknown attestors.
pub fn command_attestors_docs(
    registry: &AttestorRegistry,
    name: Option<&str>,
) -> CliResult<ExitCode> {
    match name {
        Some(name) => render_docs(lookup(registry, name)?)?,
        None => {
            for entry in registry.entries() {
                render_docs(entry)?;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Resolves an attestor by name or type URI.
fn lookup<'a>(registry: &'a AttestorRegistry, name: &str) -> CliResult<&'a RegistryEntry> {
    registry.get(name).map_err(|_| CliError::new(t!("attestors.unknown", name = name)))
}

/// Writes one attestor's documentation block.
fn render_docs(entry: &RegistryEntry) -> CliResult<()> {
    write_stdout_line(&t!("attestors.docs.header", name = entry.name, type_uri = entry.type_uri))?;
    let Some(docs) = entry.docs else {
        return write_stdout_line(&t!("attestors.docs.no_summary"));
    };
    write_stdout_line(&t!("attestors.docs.summary", summary = docs.summary))?;
    if !docs.options.is_empty() {
        write_stdout_line(&t!("attestors.docs.options"))?;
        for (option, description) in docs.options {
            write_stdout_line(&t!(
                "attestors.docs.option",
                name = entry.name,
                option = option,
                description = description
            ))?;
        }
    }
    Ok(())
}
