// crates/witness-attestors/src/registry.rs
// ============================================================================
// Module: Built-in Attestor Registry
// Description: Registration table for every attestor shipped in this crate.
// Purpose: Give the runner and CLI one process-wide name and type lookup.
// Dependencies: serde_json, witness-core
// ============================================================================

//! ## Overview
//! [`builtin_registry`] builds the table once per process. Material and
//! product are always-run; every other attestor is scheduled on request.
//! Command-run is registered for lookup and schema reflection, but the runner
//! only schedules it when a command is supplied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use serde_json::Value;
use serde_json::json;
use witness_core::AttestorRegistry;
use witness_core::HashFunction;
use witness_core::RegistryEntry;
use witness_core::RunPhase;
use witness_core::attestation::COMMAND_RUN_TYPE;
use witness_core::attestation::MATERIAL_TYPE;
use witness_core::attestation::PRODUCT_TYPE;
use witness_core::attestation::registry::AttestorDocs;
use witness_core::attestation::registry::RegistryError;

use crate::aws;
use crate::command_run;
use crate::environment;
use crate::gcp;
use crate::git;
use crate::gitlab;
use crate::jwt;
use crate::material;
use crate::maven;
use crate::oci;
use crate::product;
use crate::sarif;
use crate::sbom;
use crate::scorecard;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Process-wide built-in table.
static BUILTINS: OnceLock<AttestorRegistry> = OnceLock::new();

/// Returns the built-in attestor registry.
#[must_use]
pub fn builtin_registry() -> &'static AttestorRegistry {
    BUILTINS.get_or_init(|| build_registry().unwrap_or_default())
}

/// Registers every built-in entry into a fresh registry.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] when two entries share a name or type.
pub fn build_registry() -> Result<AttestorRegistry, RegistryError> {
    let mut registry = AttestorRegistry::new();
    for entry in builtin_entries() {
        registry.register(entry)?;
    }
    Ok(registry)
}

/// Returns the built-in entries in registration order.
#[must_use]
pub fn builtin_entries() -> Vec<RegistryEntry> {
    vec![
        RegistryEntry {
            name: material::NAME,
            type_uri: MATERIAL_TYPE,
            phase: RunPhase::Material,
            always_run: true,
            factory: material::MaterialAttestor::factory,
            schema: material::schema,
            docs: Some(AttestorDocs {
                summary: "Records the digest of every file in the working directory before the \
                          command runs.",
                options: &[],
            }),
        },
        RegistryEntry {
            name: product::NAME,
            type_uri: PRODUCT_TYPE,
            phase: RunPhase::Product,
            always_run: true,
            factory: product::ProductAttestor::factory,
            schema: product::schema,
            docs: Some(AttestorDocs {
                summary: "Records files created or modified by the command with their MIME \
                          types.",
                options: &[
                    (product::OPTION_INCLUDE_GLOB, "Only record paths matching this glob."),
                    (product::OPTION_EXCLUDE_GLOB, "Never record paths matching this glob."),
                ],
            }),
        },
        RegistryEntry {
            name: command_run::NAME,
            type_uri: COMMAND_RUN_TYPE,
            phase: RunPhase::Execute,
            always_run: false,
            factory: command_run::CommandRunAttestor::factory,
            schema: command_run::schema,
            docs: Some(AttestorDocs {
                summary: "Runs the build command, capturing its output, exit code, and \
                          optionally its traced process tree.",
                options: &[
                    (command_run::OPTION_CMD, "Command and arguments, one value per argument."),
                    (command_run::OPTION_TRACE, "Trace the process tree (Linux only)."),
                    (command_run::OPTION_SILENT, "Do not mirror output to the terminal."),
                ],
            }),
        },
        RegistryEntry {
            name: environment::NAME,
            type_uri: environment::TYPE_URI,
            phase: RunPhase::PreMaterial,
            always_run: false,
            factory: environment::EnvironmentAttestor::factory,
            schema: environment::schema,
            docs: Some(AttestorDocs {
                summary: "Records the operating system, hostname, user, and filtered \
                          environment variables.",
                options: &[
                    (environment::OPTION_BLOCK, "Additional variable name or glob to drop."),
                    (environment::OPTION_ALLOW, "Variable name or glob kept despite blocking."),
                ],
            }),
        },
        RegistryEntry {
            name: git::NAME,
            type_uri: git::TYPE_URI,
            phase: RunPhase::PreMaterial,
            always_run: false,
            factory: git::GitAttestor::factory,
            schema: git::schema,
            docs: Some(AttestorDocs {
                summary: "Records the HEAD commit, branch, and working tree status.",
                options: &[],
            }),
        },
        RegistryEntry {
            name: jwt::NAME,
            type_uri: jwt::TYPE_URI,
            phase: RunPhase::PreMaterial,
            always_run: false,
            factory: jwt::JwtAttestor::factory,
            schema: jwt::schema,
            docs: Some(AttestorDocs {
                summary: "Verifies a JSON web token against a JWKS endpoint and records its \
                          claims.",
                options: &[
                    (jwt::OPTION_TOKEN, "Token to verify."),
                    (jwt::OPTION_JWKS_URL, "URL of the key set."),
                ],
            }),
        },
        RegistryEntry {
            name: aws::NAME,
            type_uri: aws::TYPE_URI,
            phase: RunPhase::PreMaterial,
            always_run: false,
            factory: aws::AwsAttestor::factory,
            schema: aws::schema,
            docs: Some(AttestorDocs {
                summary: "Fetches and verifies the EC2 instance identity document.",
                options: &[
                    (aws::OPTION_METADATA_URL, "Instance metadata service base URL."),
                    (aws::OPTION_CA_PEM, "PEM certificate or key replacing the built-in one."),
                ],
            }),
        },
        RegistryEntry {
            name: gcp::NAME,
            type_uri: gcp::TYPE_URI,
            phase: RunPhase::PreMaterial,
            always_run: false,
            factory: gcp::GcpAttestor::factory,
            schema: gcp::schema,
            docs: Some(AttestorDocs {
                summary: "Fetches and verifies the GCP instance identity token.",
                options: &[
                    (gcp::OPTION_METADATA_URL, "Metadata server base URL."),
                    (gcp::OPTION_JWKS_URL, "URL of the Google key set."),
                    (gcp::OPTION_AUDIENCE, "Audience requested for the token."),
                ],
            }),
        },
        RegistryEntry {
            name: gitlab::NAME,
            type_uri: gitlab::TYPE_URI,
            phase: RunPhase::PreMaterial,
            always_run: false,
            factory: gitlab::GitlabAttestor::factory,
            schema: gitlab::schema,
            docs: Some(AttestorDocs {
                summary: "Records GitLab CI job metadata and verifies the job token.",
                options: &[],
            }),
        },
        RegistryEntry {
            name: maven::NAME,
            type_uri: maven::TYPE_URI,
            phase: RunPhase::PreMaterial,
            always_run: false,
            factory: maven::MavenAttestor::factory,
            schema: maven::schema,
            docs: Some(AttestorDocs {
                summary: "Records project and dependency coordinates from a Maven POM.",
                options: &[(maven::OPTION_POM_PATH, "POM path relative to the working directory.")],
            }),
        },
        RegistryEntry {
            name: sbom::NAME,
            type_uri: sbom::TYPE_URI,
            phase: RunPhase::PostProduct,
            always_run: false,
            factory: sbom::SbomAttestor::factory,
            schema: sbom::schema,
            docs: Some(AttestorDocs {
                summary: "Embeds an SPDX or CycloneDX document found among the products.",
                options: &[],
            }),
        },
        RegistryEntry {
            name: sarif::NAME,
            type_uri: sarif::TYPE_URI,
            phase: RunPhase::PostProduct,
            always_run: false,
            factory: sarif::SarifAttestor::factory,
            schema: sarif::schema,
            docs: Some(AttestorDocs {
                summary: "Embeds a SARIF report found among the products.",
                options: &[],
            }),
        },
        RegistryEntry {
            name: scorecard::NAME,
            type_uri: scorecard::TYPE_URI,
            phase: RunPhase::PostProduct,
            always_run: false,
            factory: scorecard::ScorecardAttestor::factory,
            schema: scorecard::schema,
            docs: Some(AttestorDocs {
                summary: "Embeds an OpenSSF scorecard result found among the products.",
                options: &[],
            }),
        },
        RegistryEntry {
            name: oci::NAME,
            type_uri: oci::TYPE_URI,
            phase: RunPhase::PostProduct,
            always_run: false,
            factory: oci::OciAttestor::factory,
            schema: oci::schema,
            docs: Some(AttestorDocs {
                summary: "Records image and layer identities from a saved image tarball.",
                options: &[],
            }),
        },
    ]
}

// ============================================================================
// SECTION: Shared Schemas
// ============================================================================

/// JSON schema of a serialized digest set.
#[must_use]
pub fn digest_set_schema() -> Value {
    let names: Vec<&str> = HashFunction::ALL.iter().map(|hash| hash.name()).collect();
    json!({
        "type": "object",
        "minProperties": 1,
        "propertyNames": {"enum": names},
        "additionalProperties": {"type": "string", "minLength": 1},
    })
}
