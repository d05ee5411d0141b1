// crates/witness-runner/src/archivista.rs
// ============================================================================
// Module: Archivista Client
// Description: HTTP adapter for the archival envelope store.
// Purpose: Upload signed envelopes and download them by gitoid.
// Dependencies: reqwest, serde, tokio-util, witness-core
// ============================================================================

//! ## Overview
//! [`ArchivistaClient`] implements [`ArchiveStore`] over two endpoints:
//! `POST {base}/upload` answers `{"gitoid": "..."}` and
//! `GET {base}/download/{gitoid}` answers the envelope JSON. Requests time out
//! after [`DEFAULT_TIMEOUT`], never follow redirects, and are refused once the
//! cancellation token fires.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;
use witness_core::ArchiveStore;
use witness_core::Envelope;
use witness_core::StoreError;
use witness_core::envelope::MAX_ENVELOPE_BYTES;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Request timeout applied to the full request lifecycle.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Upload response body.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    /// Gitoid assigned to the stored envelope.
    gitoid: String,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Blocking archival store client.
#[derive(Debug, Clone)]
pub struct ArchivistaClient {
    /// Base URL without a trailing slash.
    base_url: String,
    /// Underlying client.
    client: Client,
    /// Cancellation token checked before each request.
    cancel: CancellationToken,
}

impl ArchivistaClient {
    /// Creates a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] when the URL scheme is unsupported or
    /// the client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        let parsed = Url::parse(base_url)
            .map_err(|err| StoreError::Transport(format!("invalid archive url {base_url}: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StoreError::Transport(format!("unsupported archive url: {base_url}")));
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .redirect(Policy::none())
            .build()
            .map_err(|err| StoreError::Transport(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            cancel: CancellationToken::new(),
        })
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fails once the run has been cancelled.
    fn check_cancelled(&self) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Transport("request cancelled".to_string()));
        }
        Ok(())
    }
}

impl ArchiveStore for ArchivistaClient {
    fn store(&self, envelope: &Envelope) -> Result<String, StoreError> {
        self.check_cancelled()?;
        let body = envelope.to_json().map_err(|err| StoreError::Decode(err.to_string()))?;
        let url = format!("{}/upload", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .map_err(|err| StoreError::Transport(format!("upload to {url} failed: {err}")))?;
        let bytes = read_body(response, &url)?;
        let parsed: UploadResponse =
            serde_json::from_slice(&bytes).map_err(|err| StoreError::Decode(err.to_string()))?;
        if parsed.gitoid.is_empty() {
            return Err(StoreError::Decode("upload response has an empty gitoid".to_string()));
        }
        Ok(parsed.gitoid)
    }

    fn download(&self, gitoid: &str) -> Result<Envelope, StoreError> {
        self.check_cancelled()?;
        if gitoid.is_empty() || gitoid.contains('/') {
            return Err(StoreError::NotFound(gitoid.to_string()));
        }
        let url = format!("{}/download/{gitoid}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| StoreError::Transport(format!("download from {url} failed: {err}")))?;
        if response.status().as_u16() == 404 {
            return Err(StoreError::NotFound(gitoid.to_string()));
        }
        let bytes = read_body(response, &url)?;
        Envelope::from_json(&bytes).map_err(|err| StoreError::Decode(err.to_string()))
    }
}

/// Checks the status and reads a body bounded by [`MAX_ENVELOPE_BYTES`].
fn read_body(response: Response, url: &str) -> Result<Vec<u8>, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().unwrap_or_default();
        return Err(StoreError::Status {
            status: status.as_u16(),
            message: format!("{url}: {}", message.trim()),
        });
    }
    if response.content_length().is_some_and(|length| length > MAX_ENVELOPE_BYTES) {
        return Err(StoreError::Decode(format!("response from {url} exceeds size limit")));
    }
    let mut body = Vec::new();
    response
        .take(MAX_ENVELOPE_BYTES.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|err| StoreError::Transport(format!("failed to read {url}: {err}")))?;
    if !u64::try_from(body.len()).is_ok_and(|length| length <= MAX_ENVELOPE_BYTES) {
        return Err(StoreError::Decode(format!("response from {url} exceeds size limit")));
    }
    Ok(body)
}
