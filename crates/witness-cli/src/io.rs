// crates/witness-cli/src/io.rs
// ============================================================================
// Module: CLI Input and Output
// Description: Size-bounded file reads and stdout/stderr writers.
// Purpose: Enforce input size limits on every file the CLI reads.
// Dependencies: witness-core, x509-cert
// ============================================================================

//! ## Overview
//! Inputs are untrusted. Envelopes, policies, and payloads are capped at
//! [`MAX_DOCUMENT_BYTES`]; keys, certificates, and config files at
//! [`MAX_KEY_BYTES`]. Oversized files fail before being parsed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;

use witness_core::Envelope;
use witness_core::crypto::x509::parse_certificates_pem;
use x509_cert::Certificate;

use crate::error::CliError;
use crate::error::CliResult;
use crate::t;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of envelopes, policies, and signed payloads.
pub const MAX_DOCUMENT_BYTES: usize = 16 * 1024 * 1024;
/// Maximum size of keys, certificates, and config files.
pub const MAX_KEY_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Bounded Reads
// ============================================================================

/// Failures from [`read_bytes_with_limit`].
#[derive(Debug)]
pub enum ReadLimitError {
    /// File I/O failure.
    Io(std::io::Error),
    /// File size exceeds the limit.
    TooLarge {
        /// Observed size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

/// Reads a file while enforcing a hard size limit.
///
/// # Errors
///
/// Returns [`ReadLimitError`] when the file cannot be read or is too large.
pub fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Reads a file with a limit, labelling failures with `kind`.
///
/// # Errors
///
/// Returns [`CliError::Message`] when the read fails or the file is too large.
pub fn read_input(path: &Path, max_bytes: usize, kind: &str) -> CliResult<Vec<u8>> {
    read_bytes_with_limit(path, max_bytes).map_err(|err| match err {
        ReadLimitError::Io(error) => CliError::new(t!(
            "input.read_failed",
            kind = kind,
            path = path.display(),
            error = error
        )),
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(t!(
            "input.too_large",
            kind = kind,
            path = path.display(),
            size = size,
            limit = limit
        )),
    })
}

/// Reads and decodes an envelope file.
///
/// # Errors
///
/// Returns [`CliError::Message`] when the file is unreadable or malformed.
pub fn read_envelope(path: &Path) -> CliResult<Envelope> {
    let kind = t!("input.kind.envelope");
    let bytes = read_input(path, MAX_DOCUMENT_BYTES, &kind)?;
    Envelope::from_json(&bytes).map_err(|err| {
        CliError::new(t!("input.parse_failed", kind = kind, path = path.display(), error = err))
    })
}

/// Reads every certificate in a PEM file.
///
/// # Errors
///
/// Returns [`CliError::Message`] when the file is unreadable or malformed.
pub fn read_certificates(path: &Path) -> CliResult<Vec<Certificate>> {
    let kind = t!("input.kind.certificate");
    let bytes = read_input(path, MAX_KEY_BYTES, &kind)?;
    parse_certificates_pem(&bytes).map_err(|err| {
        CliError::new(t!("input.parse_failed", kind = kind, path = path.display(), error = err))
    })
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Writes a single line to stdout.
///
/// # Errors
///
/// Returns [`CliError::Message`] when stdout is closed.
pub fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{message}").map_err(|err| output_error("stdout", &err))
}

/// Writes a single line to stderr.
///
/// # Errors
///
/// Returns [`CliError::Message`] when stderr is closed.
pub fn write_stderr_line(message: &str) -> CliResult<()> {
    let mut stderr = std::io::stderr().lock();
    writeln!(stderr, "{message}").map_err(|err| output_error("stderr", &err))
}

/// Writes bytes to a file, or to stdout with a trailing newline.
///
/// # Errors
///
/// Returns [`CliError::Message`] when writing fails.
pub fn write_output(path: Option<&Path>, bytes: &[u8]) -> CliResult<()> {
    match path {
        Some(path) => std::fs::write(path, bytes)
            .map_err(|err| output_error(&path.display().to_string(), &err)),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(bytes)
                .and_then(|()| stdout.write_all(b"\n"))
                .and_then(|()| stdout.flush())
                .map_err(|err| output_error("stdout", &err))
        }
    }
}

/// Formats an output failure.
fn output_error(stream: &str, error: &std::io::Error) -> CliError {
    CliError::new(t!("output.write_failed", stream = stream, error = error))
}
