// crates/witness-cli/src/messages.rs
// ============================================================================
// Module: CLI Message Catalog
// Description: User-facing strings for the witness CLI.
// Purpose: Keep every runtime message in one table with named placeholders.
// Dependencies: Standard library collections.
// ============================================================================

//! ## Overview
//! Runtime output is routed through the [`t!`](crate::t) macro, which looks a
//! key up in the catalog and substitutes `{placeholder}` arguments.
//!
//! ## Invariants
//! - The catalog is built once and read-only thereafter.
//! - Missing keys render as the key itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// A formatted message argument captured by the [`macro@crate::t`] macro.
#[derive(Clone)]
pub struct MessageArg {
    /// Placeholder name without braces.
    pub key: &'static str,
    /// Preformatted value.
    pub value: String,
}

impl MessageArg {
    /// Constructs an argument from a key and value.
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// Message templates keyed by identifier.
const CATALOG: &[(&str, &str)] = &[
    ("main.error", "Error: {error}"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
    ("input.read_failed", "Failed to read {kind} at {path}: {error}"),
    ("input.too_large", "{kind} at {path} exceeds the size limit ({size} > {limit} bytes)"),
    ("input.parse_failed", "Failed to parse {kind} at {path}: {error}"),
    ("input.kind.envelope", "envelope"),
    ("input.kind.policy", "policy"),
    ("input.kind.payload", "payload"),
    ("input.kind.config", "config file"),
    ("input.kind.key", "key file"),
    ("input.kind.certificate", "certificate file"),
    ("config.not_found", "Config file not found: {path}"),
    ("config.invalid", "Invalid config file {path}: {error}"),
    ("log.level_invalid", "Invalid log level: {error}"),
    ("log.open_failed", "Failed to open log file {path}: {error}"),
    ("signal.install_failed", "Failed to install the interrupt handler: {error}"),
    ("flag.mapping_invalid", "Invalid --{flag} value {value}: expected key=value"),
    ("flag.hash_invalid", "Invalid hash function: {error}"),
    ("signer.missing_key", "A signing key is required (--signer-file-key-path)"),
    ("signer.load_failed", "Failed to load the signer: {error}"),
    ("timestamp.invalid_server", "Invalid timestamp server {url}: {error}"),
    ("archive.client_failed", "Failed to configure the archive client: {error}"),
    ("run.step_required", "A step name is required (--step)"),
    ("run.working_dir_failed", "Failed to resolve the working directory: {error}"),
    ("run.tolerated", "Continued past error: {error}"),
    ("run.done", "Attestation for step {step} written ({count} attestors)"),
    ("sign.done", "Signed envelope written"),
    ("sign.failed", "Failed to sign the payload: {error}"),
    ("verify.policy_required", "A policy is required (--policy)"),
    ("verify.subject_required", "At least one --artifactfile or --subjects value is required"),
    (
        "verify.attestations_required",
        "At least one attestation envelope is required (--attestations)",
    ),
    ("verify.subject_invalid", "Invalid subject digest {value}: {error}"),
    ("verify.artifact_failed", "Failed to hash artifact {path}: {error}"),
    ("verify.trust_failed", "Failed to load policy trust material: {error}"),
    ("verify.passed", "Verification succeeded for steps: {steps}"),
    ("policy.check.failed", "Policy validation failed"),
    ("policy.generate.done", "Policy written to {path}"),
    ("policy.encode_failed", "Failed to encode the policy: {error}"),
    ("attestors.unknown", "Unknown attestor: {name}"),
    ("attestors.list.header", "NAME\tTYPE\tPHASE\tALWAYS RUN"),
    ("attestors.list.entry", "{name}\t{type_uri}\t{phase}\t{always_run}"),
    ("attestors.docs.header", "{name} ({type_uri})"),
    ("attestors.docs.summary", "  {summary}"),
    ("attestors.docs.no_summary", "  No documentation available."),
    ("attestors.docs.options", "  Options:"),
    ("attestors.docs.option", "    --attestor-{name}-{option}: {description}"),
    ("attestors.schema_failed", "Failed to render the schema: {error}"),
    ("attach.invalid", "Cannot attach the envelope: {error}"),
    ("attach.done", "Attached attestation {digest} to {reference}"),
];

/// Returns the message catalog.
fn catalog() -> &'static HashMap<&'static str, &'static str> {
    static CATALOG_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    CATALOG_MAP.get_or_init(|| CATALOG.iter().copied().collect())
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Renders `key` with `args` substituted.
#[must_use]
pub fn render(key: &str, args: Vec<MessageArg>) -> String {
    let template = catalog().get(key).copied().unwrap_or(key);
    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a catalog message from a key and named arguments.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::messages::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::messages::render($key, args)
    }};
}

#[cfg(test)]
mod tests;
