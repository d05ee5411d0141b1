// crates/witness-cli/src/messages/tests.rs
// ============================================================================
// Module: Message Catalog Tests
// Description: Placeholder substitution and fallback behavior.
// Purpose: Keep CLI output stable.
// Dependencies: witness-cli
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

use super::CATALOG;

#[test]
fn placeholders_are_substituted() {
    let message = t!("run.done", step = "build", count = 3);
    assert_eq!(message, "Attestation for step build written (3 attestors)");
}

#[test]
fn unknown_keys_render_as_themselves() {
    assert_eq!(t!("no.such.key"), "no.such.key");
}

#[test]
fn catalog_keys_are_unique() {
    let mut keys: Vec<&str> = CATALOG.iter().map(|(key, _)| *key).collect();
    let total = keys.len();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), total);
}
