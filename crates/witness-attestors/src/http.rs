// crates/witness-attestors/src/http.rs
// ============================================================================
// Module: Metadata HTTP Client
// Description: Bounded blocking HTTP client for metadata and key endpoints.
// Purpose: Share timeout, redirect, and size limits across network attestors.
// Dependencies: reqwest, witness-core
// ============================================================================

//! ## Overview
//! Requests use a fixed timeout, never follow redirects, and read at most
//! [`MAX_RESPONSE_BYTES`] of body. The run's cancellation token is checked
//! before every request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::RequestBuilder;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use witness_core::AttestationContext;
use witness_core::AttestationError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Request timeout applied to the full request lifecycle.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on response bodies.
pub const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Client
// ============================================================================

/// Blocking HTTP client with attestor limits.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    /// Underlying client.
    client: Client,
}

impl HttpFetcher {
    /// Builds a client with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Network`] when the client cannot be built.
    pub fn new() -> Result<Self, AttestationError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(Policy::none())
            .build()
            .map_err(|err| AttestationError::Network(format!("http client build failed: {err}")))?;
        Ok(Self {
            client,
        })
    }

    /// Issues a GET request and returns the body.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Cancelled`] after cancellation and
    /// [`AttestationError::Network`] on transport, status, or size failures.
    pub fn get(
        &self,
        context: &AttestationContext,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Vec<u8>, AttestationError> {
        self.send(context, url, with_headers(self.client.get(url), headers))
    }

    /// Issues a PUT request and returns the body.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Cancelled`] after cancellation and
    /// [`AttestationError::Network`] on transport, status, or size failures.
    pub fn put(
        &self,
        context: &AttestationContext,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Vec<u8>, AttestationError> {
        self.send(context, url, with_headers(self.client.put(url), headers))
    }

    /// Sends a prepared request.
    fn send(
        &self,
        context: &AttestationContext,
        url: &str,
        request: RequestBuilder,
    ) -> Result<Vec<u8>, AttestationError> {
        context.check_cancelled()?;
        let mut response = request
            .send()
            .map_err(|err| AttestationError::Network(format!("request to {url} failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttestationError::Network(format!(
                "{url} returned status {}",
                status.as_u16()
            )));
        }
        read_limited(&mut response, url)
    }
}

/// Applies request headers.
fn with_headers(mut request: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    request
}

/// Reads a response body bounded by [`MAX_RESPONSE_BYTES`].
fn read_limited(response: &mut Response, url: &str) -> Result<Vec<u8>, AttestationError> {
    let limit = u64::try_from(MAX_RESPONSE_BYTES)
        .map_err(|_| AttestationError::Network("response size limit exceeds u64".to_string()))?;
    if response.content_length().is_some_and(|expected| expected > limit) {
        return Err(AttestationError::Network(format!("response from {url} exceeds size limit")));
    }
    let mut body = Vec::new();
    response
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|err| AttestationError::Network(format!("failed to read {url}: {err}")))?;
    if body.len() > MAX_RESPONSE_BYTES {
        return Err(AttestationError::Network(format!("response from {url} exceeds size limit")));
    }
    Ok(body)
}
