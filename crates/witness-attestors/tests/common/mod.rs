// crates/witness-attestors/tests/common/mod.rs
// ============================================================================
// Module: Attestor Test Helpers
// Description: Pipeline driver, HTTP fakes, and key fixtures for tests.
// Purpose: Exercise attestors end to end without a runner or network.
// Dependencies: tiny_http, jsonschema, rsa, witness-core
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    dead_code,
    reason = "Shared helpers are used by a subset of test binaries."
)]

use std::sync::OnceLock;
use std::thread;

use rsa::RsaPrivateKey;
use serde_json::Value;
use time::OffsetDateTime;
use tiny_http::Header;
use tiny_http::Method;
use tiny_http::Response;
use tiny_http::Server;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::attestation::context::CompletedAttestation;

// ============================================================================
// SECTION: Pipeline Driver
// ============================================================================

/// Runs attestors in phase order, freezing each into the context.
///
/// Failed attestors keep their payload; their errors are returned by name.
pub fn drive(
    context: &mut AttestationContext,
    mut attestors: Vec<Box<dyn Attestor>>,
) -> Vec<(String, AttestationError)> {
    context.schedule(&mut attestors);
    let mut errors = Vec::new();
    for mut attestor in attestors {
        let start = OffsetDateTime::now_utc();
        let outcome = attestor.attest(context);
        let mut completed =
            CompletedAttestation::freeze(attestor.as_ref(), start, OffsetDateTime::now_utc())
                .unwrap();
        if let Err(err) = outcome {
            completed.error = Some(err.to_string());
            errors.push((attestor.name().to_string(), err));
        }
        context.record_completed(completed);
    }
    errors
}

// ============================================================================
// SECTION: Schema Validation
// ============================================================================

/// Asserts that a payload satisfies a reflected schema.
pub fn assert_schema(schema: &Value, payload: &Value) {
    let validator = jsonschema::validator_for(schema).unwrap();
    let errors: Vec<String> = validator.iter_errors(payload).map(|err| err.to_string()).collect();
    assert!(errors.is_empty(), "schema violations: {errors:?}");
}

// ============================================================================
// SECTION: HTTP Fake
// ============================================================================

/// Request summary handed to fake handlers.
pub struct FakeRequest {
    /// HTTP method.
    pub method: Method,
    /// Path and query.
    pub url: String,
    /// Header pairs.
    pub headers: Vec<(String, String)>,
}

impl FakeRequest {
    /// Returns a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Starts a fake HTTP server and returns its base URL.
pub fn serve<F>(handler: F) -> String
where
    F: Fn(&FakeRequest) -> (u16, String) + Send + 'static,
{
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    thread::spawn(move || {
        for request in server.incoming_requests() {
            let summary = FakeRequest {
                method: request.method().clone(),
                url: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|header| (header.field.to_string(), header.value.to_string()))
                    .collect(),
            };
            let (status, body) = handler(&summary);
            let content_type = Header::from_bytes("Content-Type", "application/json").unwrap();
            let response =
                Response::from_string(body).with_status_code(status).with_header(content_type);
            let _ = request.respond(response);
        }
    });
    format!("http://127.0.0.1:{port}")
}

// ============================================================================
// SECTION: Key Fixtures
// ============================================================================

/// Process-wide RSA key; generation is slow.
static RSA_KEY: OnceLock<RsaPrivateKey> = OnceLock::new();

/// Returns a shared 2048-bit RSA key.
pub fn rsa_key() -> &'static RsaPrivateKey {
    RSA_KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
}
