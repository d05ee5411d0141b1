// crates/witness-core/src/attestation/context.rs
// ============================================================================
// Module: Attestation Context
// Description: Shared run state threaded through every attestor.
// Purpose: Order attestors by phase, expose frozen results of completed
//          attestors, and carry cancellation and logging handles.
// Dependencies: tokio-util, time, crate::attestation, crate::logging
// ============================================================================

//! ## Overview
//! The context owns the immutable working directory, the hash list, the run
//! cancellation token, and the scheduled and completed attestor lists.
//! Completed attestors are frozen into [`CompletedAttestation`] snapshots, so
//! a running attestor only observes data produced by attestors that finished
//! before it. Capability queries union the data of completed attestors that
//! declared the capability.
//! Invariants:
//! - The working directory never changes after construction.
//! - The completed list only grows, in completion order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::attestation::AttestationError;
use crate::attestation::Attestor;
use crate::attestation::Capability;
use crate::attestation::Product;
use crate::attestation::RunPhase;
use crate::core::digest::DEFAULT_HASHES;
use crate::core::digest::DigestSet;
use crate::core::digest::HashFunction;
use crate::logging::LogEvent;
use crate::logging::NoopLogSink;
use crate::logging::SharedLogSink;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Scheduled attestor summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAttestor {
    /// Attestor name.
    pub name: String,
    /// Predicate type URI.
    pub type_uri: String,
    /// Declared run phase.
    pub phase: RunPhase,
}

/// Frozen result of a finished attestor.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedAttestation {
    /// Attestor name.
    pub name: String,
    /// Predicate type URI.
    pub type_uri: String,
    /// Declared run phase.
    pub phase: RunPhase,
    /// Declared capabilities.
    pub capabilities: Vec<Capability>,
    /// Serialized predicate.
    pub predicate: Value,
    /// Subjects contributed.
    pub subjects: BTreeMap<String, DigestSet>,
    /// Materials recorded.
    pub materials: BTreeMap<String, DigestSet>,
    /// Products recorded.
    pub products: BTreeMap<String, Product>,
    /// Back-references contributed.
    pub backrefs: BTreeMap<String, DigestSet>,
    /// Directory materials were recorded from.
    pub material_dir: Option<PathBuf>,
    /// Instant the attestor started.
    pub start_time: OffsetDateTime,
    /// Instant the attestor finished.
    pub end_time: OffsetDateTime,
    /// Error text when the attestor failed but its payload was kept.
    pub error: Option<String>,
}

impl CompletedAttestation {
    /// Freezes an attestor's results.
    ///
    /// Data for undeclared capabilities is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Serialization`] when the predicate cannot
    /// be serialized.
    pub fn freeze(
        attestor: &dyn Attestor,
        start_time: OffsetDateTime,
        end_time: OffsetDateTime,
    ) -> Result<Self, AttestationError> {
        let capabilities = attestor.capabilities().to_vec();
        let has = |capability: Capability| capabilities.contains(&capability);
        Ok(Self {
            name: attestor.name().to_string(),
            type_uri: attestor.type_uri().to_string(),
            phase: attestor.phase(),
            predicate: attestor.predicate()?,
            subjects: if has(Capability::Subjects) { attestor.subjects() } else { BTreeMap::new() },
            materials: if has(Capability::Materials) {
                attestor.materials()
            } else {
                BTreeMap::new()
            },
            products: if has(Capability::Products) { attestor.products() } else { BTreeMap::new() },
            backrefs: if has(Capability::Backrefs) { attestor.backrefs() } else { BTreeMap::new() },
            material_dir: attestor.material_dir(),
            capabilities,
            start_time,
            end_time,
            error: None,
        })
    }

    /// Returns true when the attestor declared the capability.
    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Shared state for one attestation run.
pub struct AttestationContext {
    /// Working directory.
    working_dir: PathBuf,
    /// Hash functions used for digests.
    hashes: Vec<HashFunction>,
    /// Run cancellation token.
    cancel: CancellationToken,
    /// Log sink.
    log: SharedLogSink,
    /// Attestors scheduled for this run, in execution order.
    scheduled: Vec<ScheduledAttestor>,
    /// Attestors completed so far, in completion order.
    completed: Vec<CompletedAttestation>,
}

impl AttestationContext {
    /// Creates a context for a working directory with default hashes.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            hashes: DEFAULT_HASHES.to_vec(),
            cancel: CancellationToken::new(),
            log: Arc::new(NoopLogSink),
            scheduled: Vec::new(),
            completed: Vec::new(),
        }
    }

    /// Sets the hash functions (empty input keeps the defaults).
    #[must_use]
    pub fn with_hashes(mut self, hashes: Vec<HashFunction>) -> Self {
        if !hashes.is_empty() {
            self.hashes = hashes;
        }
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

    /// Returns the working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Returns the configured hash functions.
    #[must_use]
    pub fn hashes(&self) -> &[HashFunction] {
        &self.hashes
    }

    /// Returns the run cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns true when the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns [`AttestationError::Cancelled`] when the run was cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Cancelled`] after cancellation.
    pub fn check_cancelled(&self) -> Result<(), AttestationError> {
        if self.is_cancelled() { Err(AttestationError::Cancelled) } else { Ok(()) }
    }

    /// Records a log event.
    pub fn log(&self, event: &LogEvent) {
        self.log.record(event);
    }

    /// Returns the shared log sink.
    #[must_use]
    pub fn log_sink(&self) -> SharedLogSink {
        Arc::clone(&self.log)
    }

    /// Orders attestors by phase and records the schedule.
    ///
    /// The sort is stable, so declaration order (always-run attestors first)
    /// is preserved within a phase.
    pub fn schedule(&mut self, attestors: &mut [Box<dyn Attestor>]) {
        attestors.sort_by_key(|attestor| attestor.phase());
        self.scheduled = attestors
            .iter()
            .map(|attestor| ScheduledAttestor {
                name: attestor.name().to_string(),
                type_uri: attestor.type_uri().to_string(),
                phase: attestor.phase(),
            })
            .collect();
    }

    /// Returns the scheduled attestors.
    #[must_use]
    pub fn scheduled(&self) -> &[ScheduledAttestor] {
        &self.scheduled
    }

    /// Appends a completed attestor.
    pub fn record_completed(&mut self, completed: CompletedAttestation) {
        self.completed.push(completed);
    }

    /// Returns completed attestors in completion order.
    #[must_use]
    pub fn completed_attestations(&self) -> &[CompletedAttestation] {
        &self.completed
    }

    /// Consumes the context and returns the completed attestors.
    #[must_use]
    pub fn into_completed(self) -> Vec<CompletedAttestation> {
        self.completed
    }

    /// Returns a completed attestor by name or type URI.
    #[must_use]
    pub fn completed(&self, name_or_type: &str) -> Option<&CompletedAttestation> {
        self.completed
            .iter()
            .find(|entry| entry.name == name_or_type || entry.type_uri == name_or_type)
    }

    /// Unions materials from completed material recorders.
    #[must_use]
    pub fn materials(&self) -> BTreeMap<String, DigestSet> {
        self.union(Capability::Materials, |entry| &entry.materials)
    }

    /// Unions products from completed product recorders.
    #[must_use]
    pub fn products(&self) -> BTreeMap<String, Product> {
        self.union(Capability::Products, |entry| &entry.products)
    }

    /// Unions subjects from completed attestors.
    #[must_use]
    pub fn subjects(&self) -> BTreeMap<String, DigestSet> {
        self.union(Capability::Subjects, |entry| &entry.subjects)
    }

    /// Unions back-references from completed attestors.
    #[must_use]
    pub fn backrefs(&self) -> BTreeMap<String, DigestSet> {
        self.union(Capability::Backrefs, |entry| &entry.backrefs)
    }

    /// Returns the directory the completed material recorder walked.
    #[must_use]
    pub fn material_dir(&self) -> Option<&Path> {
        self.completed
            .iter()
            .filter(|entry| entry.has_capability(Capability::Materials))
            .find_map(|entry| entry.material_dir.as_deref())
    }

    /// Unions one map across completed attestors with a capability.
    fn union<T: Clone>(
        &self,
        capability: Capability,
        select: impl Fn(&CompletedAttestation) -> &BTreeMap<String, T>,
    ) -> BTreeMap<String, T> {
        let mut merged = BTreeMap::new();
        for entry in self.completed.iter().filter(|entry| entry.has_capability(capability)) {
            for (key, value) in select(entry) {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}
