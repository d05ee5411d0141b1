// crates/witness-cli/src/commands/verify.rs
// ============================================================================
// Module: Verify Command
// Description: `witness verify` handler.
// Purpose: Check attestation envelopes against a trusted policy.
// Dependencies: witness-policy, witness-core, time
// ============================================================================

//! ## Overview
//! The policy envelope is verified against the supplied key, CA roots, or
//! both before any attestation is considered. Subjects come from artifact
//! files (hashed with SHA-256) and from explicit `--subjects` digests. The
//! clock is read once and shared by policy trust and step verification.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use time::OffsetDateTime;
use witness_core::ArchiveStore;
use witness_core::DigestSet;
use witness_core::HashFunction;
use witness_core::Verifier;
use witness_core::core::digest::DEFAULT_HASHES;
use witness_core::crypto::load_verifier_from_pem;
use witness_core::envelope::timestamp::Rfc3161TimestampVerifier;
use witness_core::envelope::timestamp::TimestampVerifier;
use witness_policy::PolicyTrust;
use witness_policy::PolicyVerifier;
use witness_policy::RegoRuleEvaluator;
use witness_policy::SubjectDigest;
use witness_policy::load_policy;
use witness_policy::open_policy;
use x509_cert::Certificate;

use super::CommandContext;
use super::archive_client;
use crate::cli::VerifyArgs;
use crate::config::pick;
use crate::config::pick_list;
use crate::config::pick_switch;
use crate::error::CliError;
use crate::error::CliResult;
use crate::io::MAX_KEY_BYTES;
use crate::io::read_certificates;
use crate::io::read_envelope;
use crate::io::read_input;
use crate::io::write_stdout_line;
use crate::t;

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Executes `witness verify`.
///
/// # Errors
///
/// Returns [`CliError::Message`] for missing or unreadable inputs and
/// [`CliError::Policy`] when the policy is untrusted or denies the
/// attestations.
pub fn command_verify(args: &VerifyArgs, context: &CommandContext) -> CliResult<ExitCode> {
    let config = &context.config.verify;
    let policy_spec = pick(args.policy.clone(), config.policy.as_ref())
        .ok_or_else(|| CliError::new(t!("verify.policy_required")))?;
    let subjects = collect_subjects(&args.artifact_files, &args.subjects)?;
    if subjects.is_empty() {
        return Err(CliError::new(t!("verify.subject_required")));
    }
    if args.attestations.is_empty() {
        return Err(CliError::new(t!("verify.attestations_required")));
    }

    let archive = if pick_switch(args.enable_archivista, config.enable_archivista) {
        let server = pick(args.archivista_server.clone(), config.archivista_server.as_ref());
        Some(archive_client(server, &context.cancel)?)
    } else {
        None
    };
    let policy_envelope =
        load_policy(&policy_spec, archive.as_ref().map(|client| client as &dyn ArchiveStore))?;

    let verifiers = match pick(args.publickey.clone(), config.publickey.as_ref()) {
        Some(path) => vec![load_public_key(&path)?],
        None => Vec::new(),
    };
    let roots = read_certificate_files(&pick_list(&args.policy_ca_roots, &config.policy_ca_roots))?;
    let intermediates = read_certificate_files(&pick_list(
        &args.policy_ca_intermediates,
        &config.policy_ca_intermediates,
    ))?;
    let tsa_roots = read_certificate_files(&pick_list(
        &args.policy_timestamp_servers,
        &config.policy_timestamp_servers,
    ))?;
    let has_tsa_roots = !tsa_roots.is_empty();
    let timestamp_verifier = Rfc3161TimestampVerifier::new(tsa_roots, Vec::new());
    let mut timestamp_verifiers: Vec<&dyn TimestampVerifier> = Vec::new();
    if has_tsa_roots {
        timestamp_verifiers.push(&timestamp_verifier);
    }
    let trust = PolicyTrust {
        verifiers: verifiers.iter().map(AsRef::as_ref).collect(),
        roots,
        intermediates,
        timestamp_verifiers,
    };

    let now = OffsetDateTime::now_utc();
    let allow_unsigned = pick_switch(args.allow_unsigned_policy, config.allow_unsigned_policy);
    let policy = open_policy(&policy_envelope, trust, allow_unsigned, now)?;
    let envelopes =
        args.attestations.iter().map(|path| read_envelope(path)).collect::<CliResult<Vec<_>>>()?;

    let evaluator = RegoRuleEvaluator;
    let report = PolicyVerifier::new(&policy, &evaluator)
        .with_log_sink(context.log.as_ref())
        .verify(&envelopes, &subjects, now)?;
    write_stdout_line(&t!("verify.passed", steps = report.order.join(", ")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Subjects
// ============================================================================

/// Collects target subjects from artifact files and digest flags.
///
/// # Errors
///
/// Returns [`CliError::Message`] when an artifact cannot be hashed or a
/// digest is malformed.
pub fn collect_subjects(
    artifacts: &[PathBuf],
    digests: &[String],
) -> CliResult<Vec<SubjectDigest>> {
    let mut subjects = Vec::with_capacity(artifacts.len() + digests.len());
    for path in artifacts {
        let digest = DigestSet::from_file(path, DEFAULT_HASHES).map_err(|error| {
            CliError::new(t!("verify.artifact_failed", path = path.display(), error = error))
        })?;
        subjects.push(SubjectDigest {
            name: Some(path.display().to_string()),
            digest,
        });
    }
    for value in digests {
        subjects.push(SubjectDigest {
            name: None,
            digest: parse_subject_digest(value)?,
        });
    }
    Ok(subjects)
}

/// Parses `hash:hex`, or bare hex as SHA-256.
///
/// # Errors
///
/// Returns [`CliError::Message`] for unknown hash names or non-hex values.
pub fn parse_subject_digest(value: &str) -> CliResult<DigestSet> {
    let invalid =
        |error: &str| CliError::new(t!("verify.subject_invalid", value = value, error = error));
    let (hash, hex) = match value.split_once(':') {
        Some((name, hex)) => {
            let hash = name.parse::<HashFunction>().map_err(|error| invalid(&error.to_string()))?;
            (hash, hex)
        }
        None => (HashFunction::Sha256, value),
    };
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("expected a hex digest"));
    }
    let mut digest = DigestSet::new();
    digest.insert(hash, hex.to_ascii_lowercase());
    Ok(digest)
}

// ============================================================================
// SECTION: Trust Material
// ============================================================================

/// Loads the policy signing key.
fn load_public_key(path: &Path) -> CliResult<Box<dyn Verifier>> {
    let bytes = read_input(path, MAX_KEY_BYTES, &t!("input.kind.key"))?;
    load_verifier_from_pem(&bytes)
        .map_err(|error| CliError::new(t!("verify.trust_failed", error = error)))
}

/// Reads every certificate in every file.
fn read_certificate_files(paths: &[PathBuf]) -> CliResult<Vec<Certificate>> {
    let mut certificates = Vec::new();
    for path in paths {
        certificates.extend(read_certificates(path)?);
    }
    Ok(certificates)
}
