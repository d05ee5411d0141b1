// crates/witness-core/tests/attestation.rs
// ============================================================================
// Module: Attestation Model Integration Tests
// Description: Registry, context scheduling, and collection assembly.
// Purpose: Validate phase ordering, capability dispatch, and subject union.
// Dependencies: witness-core, serde_json, time
// ============================================================================

//! ## Overview
//! Uses a small configurable attestor to exercise the registry and context
//! without touching the filesystem.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::AttestorOptions;
use witness_core::AttestorRegistry;
use witness_core::Capability;
use witness_core::Collection;
use witness_core::DigestSet;
use witness_core::HashFunction;
use witness_core::RegistryEntry;
use witness_core::RunPhase;
use witness_core::attestation::collection::collect_subjects;
use witness_core::attestation::context::CompletedAttestation;
use witness_core::attestation::registry::RegistryError;
use witness_core::logging::MemoryLogSink;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Attestor contributing fixed subjects and materials.
struct Fixed {
    name: &'static str,
    phase: RunPhase,
    capabilities: &'static [Capability],
    subject_value: &'static str,
}

impl Attestor for Fixed {
    fn name(&self) -> &str {
        self.name
    }

    fn type_uri(&self) -> &str {
        self.name
    }

    fn phase(&self) -> RunPhase {
        self.phase
    }

    fn capabilities(&self) -> &[Capability] {
        self.capabilities
    }

    fn attest(&mut self, _context: &AttestationContext) -> Result<(), AttestationError> {
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(json!({"name": self.name}))
    }

    fn subjects(&self) -> BTreeMap<String, DigestSet> {
        BTreeMap::from([("shared".to_string(), digest(self.subject_value))])
    }

    fn materials(&self) -> BTreeMap<String, DigestSet> {
        BTreeMap::from([("file.txt".to_string(), digest(self.subject_value))])
    }
}

fn digest(value: &str) -> DigestSet {
    DigestSet::from_bytes(value.as_bytes(), &[HashFunction::Sha256]).unwrap()
}

fn fixed(name: &'static str, phase: RunPhase, capabilities: &'static [Capability]) -> Box<dyn Attestor> {
    Box::new(Fixed {
        name,
        phase,
        capabilities,
        subject_value: name,
    })
}

fn entry(name: &'static str, type_uri: &'static str) -> RegistryEntry {
    RegistryEntry {
        name,
        type_uri,
        phase: RunPhase::PreMaterial,
        always_run: false,
        factory: |_options| Ok(fixed("made", RunPhase::PreMaterial, &[])),
        schema: || json!({"type": "object"}),
        docs: None,
    }
}

fn complete(context: &mut AttestationContext, attestor: &dyn Attestor) {
    let now = OffsetDateTime::now_utc();
    context.record_completed(CompletedAttestation::freeze(attestor, now, now).unwrap());
}

// ============================================================================
// SECTION: Registry
// ============================================================================

#[test]
fn registry_rejects_duplicate_names_and_types() {
    let mut registry = AttestorRegistry::new();
    registry.register(entry("one", "uri:one")).unwrap();
    assert!(matches!(registry.register(entry("one", "uri:two")), Err(RegistryError::Duplicate(_))));
    assert!(matches!(registry.register(entry("two", "uri:one")), Err(RegistryError::Duplicate(_))));
}

#[test]
fn registry_resolves_by_name_or_type() {
    let mut registry = AttestorRegistry::new();
    registry.register(entry("one", "uri:one")).unwrap();
    assert_eq!(registry.get("one").unwrap().name, "one");
    assert_eq!(registry.get("uri:one").unwrap().name, "one");
    assert!(matches!(registry.get("missing"), Err(RegistryError::NotFound(_))));
    let created = registry.create("uri:one", &AttestorOptions::new()).unwrap();
    assert_eq!(created.name(), "made");
}

// ============================================================================
// SECTION: Context
// ============================================================================

#[test]
fn schedule_orders_by_phase_and_keeps_declaration_order() {
    let mut attestors = vec![
        fixed("post", RunPhase::PostProduct, &[]),
        fixed("env", RunPhase::PreMaterial, &[]),
        fixed("git", RunPhase::PreMaterial, &[]),
        fixed("material", RunPhase::Material, &[]),
    ];
    let mut context = AttestationContext::new("/tmp");
    context.schedule(&mut attestors);
    let names: Vec<&str> = context.scheduled().iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["env", "git", "material", "post"]);
}

#[test]
fn capability_queries_ignore_undeclared_data() {
    let mut context = AttestationContext::new("/tmp");
    complete(&mut context, fixed("silent", RunPhase::PreMaterial, &[]).as_ref());
    assert!(context.materials().is_empty());
    assert!(context.subjects().is_empty());

    complete(
        &mut context,
        fixed("material", RunPhase::Material, &[Capability::Materials]).as_ref(),
    );
    assert_eq!(context.materials().len(), 1);
    assert!(context.subjects().is_empty());
    assert!(context.completed("material").is_some());
    assert!(context.completed("nothing").is_none());
}

#[test]
fn cancellation_is_observed() {
    let context = AttestationContext::new("/tmp");
    assert!(context.check_cancelled().is_ok());
    context.cancellation().cancel();
    assert!(matches!(context.check_cancelled(), Err(AttestationError::Cancelled)));
}

// ============================================================================
// SECTION: Collection
// ============================================================================

#[test]
fn later_subject_wins_and_collision_is_logged() {
    let mut context = AttestationContext::new("/tmp");
    complete(&mut context, fixed("first", RunPhase::PreMaterial, &[Capability::Subjects]).as_ref());
    complete(&mut context, fixed("second", RunPhase::PostProduct, &[Capability::Subjects]).as_ref());

    let sink = MemoryLogSink::new();
    let subjects = collect_subjects(context.completed_attestations(), &sink);
    assert_eq!(subjects["shared"], digest("second"));
    assert!(sink.contains("subject_collision"));
}

#[test]
fn collection_keeps_completion_order() {
    let mut context = AttestationContext::new("/tmp")
        .with_log_sink(Arc::new(MemoryLogSink::new()));
    complete(&mut context, fixed("b", RunPhase::PreMaterial, &[]).as_ref());
    complete(&mut context, fixed("a", RunPhase::PreMaterial, &[]).as_ref());
    let collection = Collection::from_completed("build", context.completed_attestations());
    let types: Vec<&str> =
        collection.attestations.iter().map(|entry| entry.type_uri.as_str()).collect();
    assert_eq!(types, vec!["b", "a"]);

    let encoded = serde_json::to_value(&collection).unwrap();
    assert_eq!(encoded["attestations"][0]["type"], "b");
    assert!(encoded["attestations"][0]["starttime"].is_string());
    let decoded: Collection = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, collection);
}
