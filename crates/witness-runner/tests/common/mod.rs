// crates/witness-runner/tests/common/mod.rs
// ============================================================================
// Module: Runner Test Helpers
// Description: Signers, scripted attestors, and an archive fake for tests.
// Purpose: Exercise full runs without external services.
// Dependencies: ed25519-dalek, tiny_http, witness-core, witness-attestors
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    dead_code,
    reason = "Shared helpers are used by a subset of test binaries."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde_json::Value;
use serde_json::json;
use tiny_http::Method;
use tiny_http::Response;
use tiny_http::Server;
use witness_attestors::registry::build_registry;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::AttestorOptions;
use witness_core::AttestorRegistry;
use witness_core::RunPhase;
use witness_core::attestation::registry::RegistryEntry;
use witness_core::crypto::KeySigner;
use witness_core::crypto::PrivateKey;

// ============================================================================
// SECTION: Signers
// ============================================================================

/// Returns a fresh Ed25519 signer.
pub fn ed25519_signer() -> KeySigner {
    KeySigner::new(PrivateKey::Ed25519(SigningKey::generate(&mut OsRng)))
}

/// Builds an argv from string slices.
pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

// ============================================================================
// SECTION: Scripted Attestors
// ============================================================================

/// Type URI of the always-failing attestor.
pub const FAILING_TYPE: &str = "https://example.test/attestations/failing/v0.1";

/// Type URI of the attestor that cancels the run.
pub const CANCELLING_TYPE: &str = "https://example.test/attestations/cancelling/v0.1";

/// Post-product attestor that always fails.
struct FailingAttestor;

impl Attestor for FailingAttestor {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn type_uri(&self) -> &'static str {
        FAILING_TYPE
    }

    fn phase(&self) -> RunPhase {
        RunPhase::PostProduct
    }

    fn attest(&mut self, _context: &AttestationContext) -> Result<(), AttestationError> {
        Err(AttestationError::Failed("scripted failure".to_string()))
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(json!({}))
    }
}

/// Pre-material attestor that cancels the run token.
struct CancellingAttestor;

impl Attestor for CancellingAttestor {
    fn name(&self) -> &'static str {
        "cancelling"
    }

    fn type_uri(&self) -> &'static str {
        CANCELLING_TYPE
    }

    fn phase(&self) -> RunPhase {
        RunPhase::PreMaterial
    }

    fn attest(&mut self, context: &AttestationContext) -> Result<(), AttestationError> {
        context.cancellation().cancel();
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(json!({}))
    }
}

/// Returns the built-in registry plus the scripted attestors.
pub fn test_registry() -> AttestorRegistry {
    let mut registry = build_registry().unwrap();
    registry
        .register(RegistryEntry {
            name: "failing",
            type_uri: FAILING_TYPE,
            phase: RunPhase::PostProduct,
            always_run: false,
            factory: |_: &AttestorOptions| Ok(Box::new(FailingAttestor)),
            schema: || json!({"type": "object"}),
            docs: None,
        })
        .unwrap();
    registry
        .register(RegistryEntry {
            name: "cancelling",
            type_uri: CANCELLING_TYPE,
            phase: RunPhase::PreMaterial,
            always_run: false,
            factory: |_: &AttestorOptions| Ok(Box::new(CancellingAttestor)),
            schema: || json!({"type": "object"}),
            docs: None,
        })
        .unwrap();
    registry
}

// ============================================================================
// SECTION: Archive Fake
// ============================================================================

/// In-memory archive server state keyed by gitoid.
pub type ArchiveState = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

/// Starts an archive fake and returns its base URL and state.
///
/// Uploads are stored under `gitoid-<n>`. A download of `broken` answers 500.
pub fn serve_archive() -> (String, ArchiveState) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let base = format!("http://{}", server.server_addr().to_ip().unwrap());
    let state: ArchiveState = Arc::new(Mutex::new(BTreeMap::new()));
    let shared = Arc::clone(&state);
    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let url = request.url().to_string();
            let response = match (request.method(), url.as_str()) {
                (Method::Post, "/upload") => {
                    let mut body = Vec::new();
                    request.as_reader().read_to_end(&mut body).unwrap();
                    let mut stored = shared.lock().unwrap();
                    let gitoid = format!("gitoid-{}", stored.len() + 1);
                    stored.insert(gitoid.clone(), body);
                    Response::from_string(json!({"gitoid": gitoid}).to_string())
                }
                (Method::Get, "/download/broken") => {
                    Response::from_string("internal error").with_status_code(500)
                }
                (Method::Get, path) => {
                    let gitoid = path.trim_start_matches("/download/");
                    match shared.lock().unwrap().get(gitoid) {
                        Some(body) => Response::from_data(body.clone()),
                        None => Response::from_string("not found").with_status_code(404),
                    }
                }
                _ => Response::from_string("unsupported").with_status_code(405),
            };
            let _ = request.respond(response);
        }
    });
    (base, state)
}
