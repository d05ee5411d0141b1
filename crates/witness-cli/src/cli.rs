// crates/witness-cli/src/cli.rs
// ============================================================================
// Module: CLI Definitions
// Description: Clap command tree and per-attestor option flags.
// Purpose: Parse the witness command line into typed arguments.
// Dependencies: clap, witness-core, witness-policy
// ============================================================================

//! ## Overview
//! The static command tree is derived with clap. Each documented attestor
//! option is also exposed on `run` as `--attestor-<name>-<option>`; those
//! flags are generated from the registry at startup and collected into the
//! per-attestor option bags the runner consumes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

use clap::Arg;
use clap::ArgAction;
use clap::Args;
use clap::Command;
use clap::CommandFactory;
use clap::FromArgMatches;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use witness_core::AttestorOptions;
use witness_core::AttestorRegistry;
use witness_policy::generate::DEFAULT_EXPIRES_IN;

// ============================================================================
// SECTION: Top Level
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "witness", version, about = "Create and verify build provenance attestations")]
pub struct Cli {
    /// Config file (defaults to `.witness.toml` when present).
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Minimum log level: debug, info, warn, or error.
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,
    /// Append JSON-lines logs to this file instead of stderr.
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
    /// Selected subcommand.
    #[command(subcommand)]
    pub command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command and attest to its materials, products, and context.
    Run(RunArgs),
    /// Sign an arbitrary payload into an envelope.
    Sign(SignArgs),
    /// Verify attestations against a policy.
    Verify(VerifyArgs),
    /// Policy utilities.
    Policy {
        /// Selected policy subcommand.
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Attestor discovery.
    Attestors {
        /// Selected attestors subcommand.
        #[command(subcommand)]
        command: AttestorsCommand,
    },
    /// Attach artifacts to container images.
    Attach {
        /// Selected attach subcommand.
        #[command(subcommand)]
        command: AttachCommand,
    },
}

// ============================================================================
// SECTION: Signing Flags
// ============================================================================

/// File signer and timestamp flags shared by `run` and `sign`.
#[derive(Args, Debug, Clone, Default)]
pub struct SignerArgs {
    /// Private key PEM used to sign.
    #[arg(long = "signer-file-key-path", short = 'k', value_name = "PATH")]
    pub key_path: Option<PathBuf>,
    /// Certificate PEM for the signing key.
    #[arg(long = "signer-file-cert-path", value_name = "PATH")]
    pub cert_path: Option<PathBuf>,
    /// Intermediate certificate PEMs, leaf-ward first.
    #[arg(long = "signer-file-intermediate-paths", value_name = "PATH")]
    pub intermediate_paths: Vec<PathBuf>,
    /// RFC 3161 timestamp authority URLs.
    #[arg(long = "timestamp-servers", value_name = "URL")]
    pub timestamp_servers: Vec<String>,
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// Arguments for `witness run`.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Step name recorded in the collection.
    #[arg(long, short = 's')]
    pub step: Option<String>,
    /// Envelope output path (stdout when omitted).
    #[arg(long, short = 'o', value_name = "PATH")]
    pub outfile: Option<PathBuf>,
    /// Additional attestors by name or type URI.
    #[arg(long = "attestations", short = 'a', value_name = "NAME")]
    pub attestations: Vec<String>,
    /// Trace the command's process tree.
    #[arg(long)]
    pub trace: bool,
    /// Hash functions for material and product digests.
    #[arg(long, value_name = "HASH")]
    pub hashes: Vec<String>,
    /// Working directory for recorders and the command.
    #[arg(long = "workingdir", short = 'd', value_name = "DIR")]
    pub workingdir: Option<PathBuf>,
    /// Extra subject as name=value; the value bytes are hashed.
    #[arg(long = "subject", value_name = "NAME=VALUE")]
    pub subjects: Vec<String>,
    /// Continue past attestor errors.
    #[arg(long)]
    pub continue_on_attestor_error: bool,
    /// Continue past infrastructure errors.
    #[arg(long = "continue-on-infra-error")]
    pub continue_on_infra_error: bool,
    /// Continue past every error class.
    #[arg(long = "continue-on-errors")]
    pub continue_on_errors: bool,
    /// Signing flags.
    #[command(flatten)]
    pub signer: SignerArgs,
    /// Archive server URL.
    #[arg(long, value_name = "URL")]
    pub archivista_server: Option<String>,
    /// Upload the envelope to the archive.
    #[arg(long)]
    pub enable_archivista: bool,
    /// Push the envelope as a referrer of this image.
    #[arg(long = "attach-image", value_name = "IMAGE")]
    pub attach_image: Option<String>,
    /// Command to run, after `--`.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

// ============================================================================
// SECTION: Sign
// ============================================================================

/// Arguments for `witness sign`.
#[derive(Args, Debug, Clone)]
pub struct SignArgs {
    /// Payload to sign.
    #[arg(long = "infile", short = 'f', value_name = "PATH")]
    pub infile: PathBuf,
    /// Envelope output path (stdout when omitted).
    #[arg(long, short = 'o', value_name = "PATH")]
    pub outfile: Option<PathBuf>,
    /// Envelope payload type.
    #[arg(long = "datatype", short = 't', value_name = "TYPE")]
    pub datatype: Option<String>,
    /// Signing flags.
    #[command(flatten)]
    pub signer: SignerArgs,
}

// ============================================================================
// SECTION: Verify
// ============================================================================

/// Arguments for `witness verify`.
#[derive(Args, Debug, Clone, Default)]
pub struct VerifyArgs {
    /// Policy file path or archive gitoid.
    #[arg(long, short = 'p', value_name = "PATH")]
    pub policy: Option<String>,
    /// Public key that signed the policy.
    #[arg(long = "publickey", short = 'k', value_name = "PATH")]
    pub publickey: Option<PathBuf>,
    /// CA roots trusted to sign the policy.
    #[arg(long = "policy-ca-roots", value_name = "PATH")]
    pub policy_ca_roots: Vec<PathBuf>,
    /// Intermediates for the policy signing chain.
    #[arg(long = "policy-ca-intermediates", value_name = "PATH")]
    pub policy_ca_intermediates: Vec<PathBuf>,
    /// Timestamp authority roots for policy signatures.
    #[arg(long = "policy-timestamp-servers", value_name = "PATH")]
    pub policy_timestamp_servers: Vec<PathBuf>,
    /// Attestation envelopes to verify.
    #[arg(long = "attestations", short = 'a', value_name = "PATH")]
    pub attestations: Vec<PathBuf>,
    /// Artifact whose digest is the target subject.
    #[arg(long = "artifactfile", short = 'f', value_name = "PATH")]
    pub artifact_files: Vec<PathBuf>,
    /// Target subject digest as `hash:hex` or bare SHA-256 hex.
    #[arg(long = "subjects", short = 's', value_name = "DIGEST")]
    pub subjects: Vec<String>,
    /// Fetch the policy from the archive when it is not a local file.
    #[arg(long)]
    pub enable_archivista: bool,
    /// Archive server URL.
    #[arg(long, value_name = "URL")]
    pub archivista_server: Option<String>,
    /// Accept a bare policy without a signature.
    #[arg(long)]
    pub allow_unsigned_policy: bool,
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Policy subcommands.
#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Validate a policy without verifying attestations.
    Check(PolicyCheckArgs),
    /// Generate a policy from per-step flags.
    Generate(PolicyGenerateArgs),
}

/// Report formats.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON document.
    Json,
}

/// Arguments for `witness policy check`.
#[derive(Args, Debug, Clone)]
pub struct PolicyCheckArgs {
    /// Policy file (bare or signed envelope).
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Arguments for `witness policy generate`.
#[derive(Args, Debug, Clone)]
pub struct PolicyGenerateArgs {
    /// Step name; repeat for each step.
    #[arg(long = "step", required = true, value_name = "NAME")]
    pub steps: Vec<String>,
    /// Public key functionary as step=path.
    #[arg(long = "public-key", value_name = "STEP=PATH")]
    pub public_keys: Vec<String>,
    /// Root CA functionary as step=path.
    #[arg(long = "root-ca", value_name = "STEP=PATH")]
    pub root_cas: Vec<String>,
    /// Intermediate certificate as step=path.
    #[arg(long = "intermediate", value_name = "STEP=PATH")]
    pub intermediates: Vec<String>,
    /// Timestamp authority root certificate.
    #[arg(long = "tsa-ca", value_name = "PATH")]
    pub tsa_cas: Vec<String>,
    /// Required attestor as step=name.
    #[arg(long = "attestation", value_name = "STEP=NAME")]
    pub attestations: Vec<String>,
    /// Certificate common name constraint as step=value.
    #[arg(long = "cert-cn", value_name = "STEP=VALUE")]
    pub cert_common_names: Vec<String>,
    /// Certificate DNS name constraint as step=value.
    #[arg(long = "cert-dns", value_name = "STEP=VALUE")]
    pub cert_dns_names: Vec<String>,
    /// Certificate email constraint as step=value.
    #[arg(long = "cert-email", value_name = "STEP=VALUE")]
    pub cert_emails: Vec<String>,
    /// Certificate organization constraint as step=value.
    #[arg(long = "cert-org", value_name = "STEP=VALUE")]
    pub cert_organizations: Vec<String>,
    /// Certificate URI constraint as step=value.
    #[arg(long = "cert-uri", value_name = "STEP=VALUE")]
    pub cert_uris: Vec<String>,
    /// Upstream step as step=upstream.
    #[arg(long = "artifacts-from", value_name = "STEP=UPSTREAM")]
    pub artifacts_from: Vec<String>,
    /// Policy lifetime, e.g. 8760h or 720h30m.
    #[arg(long = "expires-in", default_value = DEFAULT_EXPIRES_IN, value_name = "DURATION")]
    pub expires_in: String,
    /// Output path (stdout when omitted).
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,
}

// ============================================================================
// SECTION: Attestors And Attach
// ============================================================================

/// Attestor discovery subcommands.
#[derive(Subcommand, Debug)]
pub enum AttestorsCommand {
    /// List registered attestors.
    List,
    /// Print an attestor's predicate JSON schema.
    Schema {
        /// Attestor name or type URI.
        name: String,
    },
    /// Print attestor documentation.
    Docs {
        /// Attestor name or type URI; every attestor when omitted.
        name: Option<String>,
    },
}

/// Attach subcommands.
#[derive(Subcommand, Debug)]
pub enum AttachCommand {
    /// Attach an attestation envelope to an image.
    Attestation(AttachAttestationArgs),
}

/// Arguments for `witness attach attestation`.
#[derive(Args, Debug, Clone)]
pub struct AttachAttestationArgs {
    /// Envelope to attach.
    #[arg(long, value_name = "PATH")]
    pub attestation: PathBuf,
    /// Image reference.
    #[arg(value_name = "IMAGE")]
    pub image: String,
}

// ============================================================================
// SECTION: Attestor Flags
// ============================================================================

/// One generated `--attestor-<name>-<option>` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestorFlag {
    /// Flag name and argument id.
    pub id: String,
    /// Attestor name.
    pub attestor: &'static str,
    /// Option key.
    pub option: &'static str,
    /// Help text.
    pub help: &'static str,
}

/// Returns a flag for every documented attestor option.
#[must_use]
pub fn attestor_flags(registry: &AttestorRegistry) -> Vec<AttestorFlag> {
    registry
        .entries()
        .filter_map(|entry| entry.docs.map(|docs| (entry.name, docs.options)))
        .flat_map(|(attestor, options)| {
            options.iter().map(move |&(option, help)| AttestorFlag {
                id: format!("attestor-{attestor}-{option}"),
                attestor,
                option,
                help,
            })
        })
        .collect()
}

/// Parsed invocation.
#[derive(Debug)]
pub struct Invocation {
    /// Static arguments.
    pub cli: Cli,
    /// Attestor option bags keyed by attestor name.
    pub attestor_options: BTreeMap<String, AttestorOptions>,
}

/// Builds the full command, including generated attestor flags.
#[must_use]
pub fn build_command(registry: &AttestorRegistry) -> Command {
    let flags = attestor_flags(registry);
    Cli::command().mut_subcommand("run", move |run| {
        flags.into_iter().fold(run, |run, flag| {
            run.arg(
                Arg::new(flag.id.clone())
                    .long(flag.id)
                    .value_name("VALUE")
                    .value_parser(clap::value_parser!(String))
                    .action(ArgAction::Append)
                    .help(flag.help),
            )
        })
    })
}

/// Parses arguments against the registry-augmented command.
///
/// # Errors
///
/// Returns the clap error for invalid usage, help, or version requests.
pub fn parse_args<I, T>(args: I, registry: &AttestorRegistry) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_command(registry).try_get_matches_from(args)?;
    let cli = Cli::from_arg_matches(&matches)?;
    let mut attestor_options: BTreeMap<String, AttestorOptions> = BTreeMap::new();
    if let Some(("run", run)) = matches.subcommand() {
        for flag in attestor_flags(registry) {
            let Some(values) = run.get_many::<String>(flag.id.as_str()) else {
                continue;
            };
            let bag = attestor_options.entry(flag.attestor.to_string()).or_default();
            for value in values {
                bag.insert(flag.option, value.clone());
            }
        }
    }
    Ok(Invocation {
        cli,
        attestor_options,
    })
}
