// crates/witness-runner/src/runner.rs
// ============================================================================
// Module: Runner
// Description: Staged attestation run, signing, and export.
// Purpose: Drive attestors around a user command and emit a signed
//          collection statement.
// Dependencies: serde_json, time, witness-attestors, witness-core
// ============================================================================

//! ## Overview
//! A run assembles the attestor list (always-run recorders, then the
//! command-run attestor when a command is supplied, then requested attestors
//! with duplicates skipped), drives it in phase order, and wraps the
//! resulting collection in an in-toto statement signed by every signer.
//! Invariants:
//! - A failed user command keeps its payload: the run still finishes, signs,
//!   and exports, then reports [`RunError::CommandFailed`]. Once the command
//!   has failed, continuation flags no longer tolerate other failures.
//! - A cancelled run signs nothing.
//! - Signatures appear in signer order; sinks run in configuration order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use time::OffsetDateTime;
use witness_attestors::CommandRunAttestor;
use witness_attestors::command_run;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::AttestorRegistry;
use witness_core::COLLECTION_TYPE;
use witness_core::ClassifiedError;
use witness_core::Collection;
use witness_core::DigestSet;
use witness_core::Envelope;
use witness_core::HashFunction;
use witness_core::LogEvent;
use witness_core::LogLevel;
use witness_core::LogSink;
use witness_core::Signer;
use witness_core::Statement;
use witness_core::attestation::collection::collect_subjects;
use witness_core::attestation::context::CompletedAttestation;
use witness_core::envelope;
use witness_core::envelope::INTOTO_PAYLOAD_TYPE;
use witness_core::envelope::timestamp::Timestamper;

use crate::error::RunError;
use crate::export::ExportSink;
use crate::options::ContinuePolicy;
use crate::options::RunOptions;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome of a successful run.
#[derive(Debug)]
pub struct RunResult {
    /// Collection of completed attestors.
    pub collection: Collection,
    /// Signed statement envelope.
    pub envelope: Envelope,
    /// Errors tolerated by the continuation flags.
    pub errors: Vec<ClassifiedError>,
}

/// Attestation runner with its signers, timestampers, and sinks.
pub struct Runner<'a> {
    /// Attestor registry.
    registry: &'a AttestorRegistry,
    /// Signers in signature order.
    signers: Vec<Box<dyn Signer>>,
    /// Timestampers applied to every signature.
    timestampers: Vec<Box<dyn Timestamper>>,
    /// Export sinks in configuration order.
    sinks: Vec<Box<dyn ExportSink>>,
}

impl<'a> Runner<'a> {
    /// Creates a runner over a registry.
    #[must_use]
    pub fn new(registry: &'a AttestorRegistry) -> Self {
        Self {
            registry,
            signers: Vec::new(),
            timestampers: Vec::new(),
            sinks: Vec::new(),
        }
    }

    /// Appends a signer.
    #[must_use]
    pub fn with_signer(mut self, signer: Box<dyn Signer>) -> Self {
        self.signers.push(signer);
        self
    }

    /// Appends a timestamper.
    #[must_use]
    pub fn with_timestamper(mut self, timestamper: Box<dyn Timestamper>) -> Self {
        self.timestampers.push(timestamper);
        self
    }

    /// Appends an export sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn ExportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Runs one step.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Cancelled`] after cancellation,
    /// [`RunError::CommandFailed`] after the envelope of a failed user command
    /// has been signed and exported, and [`RunError::Aborted`] for failures
    /// the continuation flags do not cover.
    pub fn run(&self, options: &RunOptions) -> Result<RunResult, RunError> {
        if options.step_name.trim().is_empty() {
            return Err(RunError::InvalidOptions("step name is required".to_string()));
        }
        if self.signers.is_empty() {
            return Err(RunError::InvalidOptions("at least one signer is required".to_string()));
        }

        let mut attestors = self.assemble(options)?;
        let mut context = AttestationContext::new(options.working_dir.clone())
            .with_hashes(options.hashes.clone())
            .with_cancellation(options.cancel.clone())
            .with_log_sink(options.log.clone());
        context.schedule(&mut attestors);

        let mut tolerated = Vec::new();
        let mut command_failure = None;
        for attestor in &mut attestors {
            let failed = command_failure.is_some();
            let continue_policy = effective_policy(options.continue_policy, failed);
            let failure =
                drive_attestor(&mut context, attestor.as_mut(), continue_policy, &mut tolerated)?;
            if failure.is_some() {
                command_failure = failure;
            }
        }
        context.check_cancelled().map_err(|_| RunError::Cancelled)?;

        let log = context.log_sink();
        let hashes = context.hashes().to_vec();
        let completed = context.into_completed();
        let collection = Collection::from_completed(options.step_name.clone(), &completed);
        let subjects = merge_subjects(&completed, &options.subjects, &hashes, log.as_ref())?;
        let predicate = serde_json::to_value(&collection)
            .map_err(|err| RunError::Statement(err.to_string()))?;
        let body = Statement::new(COLLECTION_TYPE, predicate, &subjects)
            .and_then(|statement| statement.to_json())
            .map_err(|err| RunError::Statement(err.to_string()))?;

        if options.cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let signers: Vec<&dyn Signer> = self.signers.iter().map(Box::as_ref).collect();
        let timestampers: Vec<&dyn Timestamper> =
            self.timestampers.iter().map(Box::as_ref).collect();
        let envelope = envelope::sign(INTOTO_PAYLOAD_TYPE, &body, &signers, &timestampers)
            .map_err(|err| RunError::Aborted(ClassifiedError::infrastructure("sign", err)))?;

        let failed = command_failure.is_some();
        let continue_policy = effective_policy(options.continue_policy, failed);
        for sink in &self.sinks {
            if let Err(err) = sink.export(&envelope, log.as_ref()) {
                let classified = ClassifiedError::infrastructure(sink.name(), err);
                tolerate(continue_policy, classified, log.as_ref(), &mut tolerated)?;
            }
        }
        if let Some(failure) = command_failure {
            return Err(RunError::CommandFailed(failure));
        }

        Ok(RunResult {
            collection,
            envelope,
            errors: tolerated,
        })
    }

    /// Builds the attestor list in declaration order.
    fn assemble(&self, options: &RunOptions) -> Result<Vec<Box<dyn Attestor>>, RunError> {
        let options_for =
            |name: &str| options.attestor_options.get(name).cloned().unwrap_or_default();
        let mut seen = BTreeSet::new();
        let mut attestors: Vec<Box<dyn Attestor>> = Vec::new();

        for entry in self.registry.always_run() {
            seen.insert(entry.name);
            attestors.push(self.registry.create(entry.name, &options_for(entry.name))?);
        }
        if !options.command.is_empty() {
            seen.insert(command_run::NAME);
            attestors.push(Box::new(
                CommandRunAttestor::new(options.command.clone())
                    .with_tracing(options.trace)
                    .with_silent(options.silent),
            ));
        }
        for requested in &options.attestors {
            let entry = self.registry.get(requested)?;
            if !seen.insert(entry.name) {
                options.log.record(
                    &LogEvent::new(
                        "duplicate_attestor",
                        LogLevel::Warn,
                        "runner",
                        format!("attestor {} requested more than once; skipping", entry.name),
                    )
                    .with_field("attestor", entry.name),
                );
                continue;
            }
            attestors.push(self.registry.create(entry.name, &options_for(entry.name))?);
        }
        Ok(attestors)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the continuation policy in force; none once the command failed.
fn effective_policy(policy: ContinuePolicy, command_failed: bool) -> ContinuePolicy {
    if command_failed {
        ContinuePolicy::default()
    } else {
        policy
    }
}

/// Runs one attestor and records or classifies the outcome.
///
/// A failed user command is recorded with its payload and returned as
/// `Ok(Some(_))` so the run can still be signed.
fn drive_attestor(
    context: &mut AttestationContext,
    attestor: &mut dyn Attestor,
    policy: ContinuePolicy,
    tolerated: &mut Vec<ClassifiedError>,
) -> Result<Option<ClassifiedError>, RunError> {
    context.check_cancelled().map_err(|_| RunError::Cancelled)?;
    let start = OffsetDateTime::now_utc();
    let outcome = attestor.attest(context);
    let end = OffsetDateTime::now_utc();
    let error = match outcome {
        Ok(()) => match CompletedAttestation::freeze(&*attestor, start, end) {
            Ok(completed) => {
                context.record_completed(completed);
                return Ok(None);
            }
            Err(err) => err,
        },
        Err(err) => err,
    };
    if matches!(error, AttestationError::Cancelled) || context.is_cancelled() {
        return Err(RunError::Cancelled);
    }
    if attestor.name() == command_run::NAME {
        let message = error.to_string();
        let classified = ClassifiedError::attestor(attestor.name(), error);
        let Ok(mut completed) = CompletedAttestation::freeze(&*attestor, start, end) else {
            return Err(RunError::CommandFailed(classified));
        };
        completed.error = Some(message);
        context.record_completed(completed);
        return Ok(Some(classified));
    }
    let classified = ClassifiedError::attestor(attestor.name(), error);
    let log = context.log_sink();
    tolerate(policy, classified, log.as_ref(), tolerated).map(|()| None)
}

/// Records a tolerated error or aborts with it.
fn tolerate(
    policy: ContinuePolicy,
    error: ClassifiedError,
    log: &dyn LogSink,
    tolerated: &mut Vec<ClassifiedError>,
) -> Result<(), RunError> {
    if !policy.tolerates(&error) {
        return Err(RunError::Aborted(error));
    }
    log.record(
        &LogEvent::new("tolerated_error", LogLevel::Warn, "runner", error.to_string())
            .with_field("component", error.component().to_string()),
    );
    tolerated.push(error);
    Ok(())
}

/// Unions attestor subjects with user-defined subjects.
///
/// User subjects are hashed over their value bytes and override attestor
/// subjects with the same name.
fn merge_subjects(
    completed: &[CompletedAttestation],
    user_subjects: &BTreeMap<String, String>,
    hashes: &[HashFunction],
    log: &dyn LogSink,
) -> Result<BTreeMap<String, DigestSet>, RunError> {
    let mut subjects = collect_subjects(completed, log);
    for (name, value) in user_subjects {
        let digest = DigestSet::from_bytes(value.as_bytes(), hashes)
            .map_err(|err| RunError::Statement(format!("subject {name}: {err}")))?;
        if subjects.insert(name.clone(), digest).is_some() {
            log.record(
                &LogEvent::new(
                    "subject_collision",
                    LogLevel::Warn,
                    "runner",
                    format!("user subject {name} overrides an attestor subject"),
                )
                .with_field("subject", name.clone()),
            );
        }
    }
    Ok(subjects)
}

#[cfg(test)]
mod tests;
