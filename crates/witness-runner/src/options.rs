// crates/witness-runner/src/options.rs
// ============================================================================
// Module: Run Options
// Description: Inputs for one attestation run.
// Purpose: Collect step, command, attestor, and continuation settings with
//          builder-style setters.
// Dependencies: tokio-util, witness-core
// ============================================================================

//! ## Overview
//! [`RunOptions`] names the step, the working directory, the user command,
//! the requested attestors with their option bags, user-defined subjects, and
//! the [`ContinuePolicy`]. Every continuation flag is gated on the user
//! command succeeding; once the command fails the runner treats every flag as
//! unset for the rest of the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use witness_core::AttestorOptions;
use witness_core::ClassifiedError;
use witness_core::HashFunction;
use witness_core::SharedLogSink;
use witness_core::logging::NoopLogSink;

// ============================================================================
// SECTION: Continue Policy
// ============================================================================

/// Which failure classes a run tolerates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContinuePolicy {
    /// Proceed past attestor errors.
    pub on_attestor_error: bool,
    /// Proceed past infrastructure errors.
    pub on_infrastructure_error: bool,
    /// Proceed past both classes.
    pub on_all_errors: bool,
}

impl ContinuePolicy {
    /// Returns true when the policy tolerates the error's class.
    #[must_use]
    pub const fn tolerates(&self, error: &ClassifiedError) -> bool {
        match error {
            ClassifiedError::Attestor {
                ..
            } => self.on_attestor_error || self.on_all_errors,
            ClassifiedError::Infrastructure {
                ..
            } => self.on_infrastructure_error || self.on_all_errors,
        }
    }
}

// ============================================================================
// SECTION: Run Options
// ============================================================================

/// Inputs for one run.
#[derive(Clone)]
pub struct RunOptions {
    /// Step name recorded in the collection.
    pub step_name: String,
    /// Working directory for recorders and the command.
    pub working_dir: PathBuf,
    /// Hash functions for digests (empty uses the defaults).
    pub hashes: Vec<HashFunction>,
    /// User command; empty skips the command-run attestor.
    pub command: Vec<String>,
    /// Trace the command's process tree.
    pub trace: bool,
    /// Suppress echoing the command's output.
    pub silent: bool,
    /// Requested attestors by name or type URI, in request order.
    pub attestors: Vec<String>,
    /// Per-attestor option bags keyed by attestor name.
    pub attestor_options: BTreeMap<String, AttestorOptions>,
    /// User-defined subjects, name to value.
    pub subjects: BTreeMap<String, String>,
    /// Continuation flags.
    pub continue_policy: ContinuePolicy,
    /// Run cancellation token.
    pub cancel: CancellationToken,
    /// Log sink.
    pub log: SharedLogSink,
}

impl RunOptions {
    /// Creates options for a step with every other field defaulted.
    #[must_use]
    pub fn new(step_name: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            step_name: step_name.into(),
            working_dir: working_dir.into(),
            hashes: Vec::new(),
            command: Vec::new(),
            trace: false,
            silent: false,
            attestors: Vec::new(),
            attestor_options: BTreeMap::new(),
            subjects: BTreeMap::new(),
            continue_policy: ContinuePolicy::default(),
            cancel: CancellationToken::new(),
            log: Arc::new(NoopLogSink),
        }
    }

    /// Sets the user command.
    #[must_use]
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Sets the hash functions.
    #[must_use]
    pub fn with_hashes(mut self, hashes: Vec<HashFunction>) -> Self {
        self.hashes = hashes;
        self
    }

    /// Enables or disables tracing.
    #[must_use]
    pub const fn with_tracing(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Suppresses command output echo.
    #[must_use]
    pub const fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Appends a requested attestor.
    #[must_use]
    pub fn with_attestor(mut self, name: impl Into<String>) -> Self {
        self.attestors.push(name.into());
        self
    }

    /// Sets the option bag for one attestor.
    #[must_use]
    pub fn with_attestor_options(
        mut self,
        name: impl Into<String>,
        options: AttestorOptions,
    ) -> Self {
        self.attestor_options.insert(name.into(), options);
        self
    }

    /// Adds a user-defined subject.
    #[must_use]
    pub fn with_subject(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.subjects.insert(name.into(), value.into());
        self
    }

    /// Sets the continuation flags.
    #[must_use]
    pub const fn with_continue_policy(mut self, policy: ContinuePolicy) -> Self {
        self.continue_policy = policy;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets the log sink.
    #[must_use]
    pub fn with_log_sink(mut self, log: SharedLogSink) -> Self {
        self.log = log;
        self
    }
}
