// crates/witness-cli/src/config.rs
// ============================================================================
// Module: CLI Configuration File
// Description: Optional `.witness.toml` defaults for CLI flags.
// Purpose: Let repositories pin run, sign, verify, and log settings.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! The config file has four optional sections, `[run]`, `[sign]`, `[verify]`,
//! and `[log]`, whose keys mirror the long flag names. A flag given on the
//! command line always wins over the file. An explicit `--config` path must
//! exist; the default `.witness.toml` is read only when present.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::CliError;
use crate::error::CliResult;
use crate::io::MAX_KEY_BYTES;
use crate::io::read_input;
use crate::t;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".witness.toml";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Parsed config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WitnessConfig {
    /// Defaults for `witness run`.
    pub run: RunSection,
    /// Defaults for `witness sign`.
    pub sign: SignSection,
    /// Defaults for `witness verify`.
    pub verify: VerifySection,
    /// Log settings.
    pub log: LogSection,
}

/// Signer file paths shared by `run` and `sign`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerSection {
    /// Private key PEM.
    pub signer_file_key_path: Option<PathBuf>,
    /// Leaf certificate PEM.
    pub signer_file_cert_path: Option<PathBuf>,
    /// Intermediate certificate PEMs.
    pub signer_file_intermediate_paths: Vec<PathBuf>,
    /// RFC 3161 timestamp authority URLs.
    pub timestamp_servers: Vec<String>,
}

/// `[run]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunSection {
    /// Step name.
    pub step: Option<String>,
    /// Envelope output path.
    pub outfile: Option<PathBuf>,
    /// Extra attestors.
    pub attestations: Vec<String>,
    /// Hash functions.
    pub hashes: Vec<String>,
    /// Trace the command.
    pub trace: Option<bool>,
    /// Working directory.
    pub workingdir: Option<PathBuf>,
    /// Archive server URL.
    pub archivista_server: Option<String>,
    /// Upload envelopes to the archive.
    pub enable_archivista: Option<bool>,
    /// Tolerate attestor errors.
    pub continue_on_attestor_error: Option<bool>,
    /// Tolerate infrastructure errors.
    pub continue_on_infra_error: Option<bool>,
    /// Tolerate every error class.
    pub continue_on_errors: Option<bool>,
    /// Private key PEM.
    pub signer_file_key_path: Option<PathBuf>,
    /// Leaf certificate PEM.
    pub signer_file_cert_path: Option<PathBuf>,
    /// Intermediate certificate PEMs.
    pub signer_file_intermediate_paths: Vec<PathBuf>,
    /// RFC 3161 timestamp authority URLs.
    pub timestamp_servers: Vec<String>,
}

/// `[sign]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SignSection {
    /// Payload type.
    pub datatype: Option<String>,
    /// Private key PEM.
    pub signer_file_key_path: Option<PathBuf>,
    /// Leaf certificate PEM.
    pub signer_file_cert_path: Option<PathBuf>,
    /// Intermediate certificate PEMs.
    pub signer_file_intermediate_paths: Vec<PathBuf>,
    /// RFC 3161 timestamp authority URLs.
    pub timestamp_servers: Vec<String>,
}

impl RunSection {
    /// Returns the signer settings.
    #[must_use]
    pub fn signer(&self) -> SignerSection {
        SignerSection {
            signer_file_key_path: self.signer_file_key_path.clone(),
            signer_file_cert_path: self.signer_file_cert_path.clone(),
            signer_file_intermediate_paths: self.signer_file_intermediate_paths.clone(),
            timestamp_servers: self.timestamp_servers.clone(),
        }
    }
}

impl SignSection {
    /// Returns the signer settings.
    #[must_use]
    pub fn signer(&self) -> SignerSection {
        SignerSection {
            signer_file_key_path: self.signer_file_key_path.clone(),
            signer_file_cert_path: self.signer_file_cert_path.clone(),
            signer_file_intermediate_paths: self.signer_file_intermediate_paths.clone(),
            timestamp_servers: self.timestamp_servers.clone(),
        }
    }
}

/// `[verify]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct VerifySection {
    /// Policy path or gitoid.
    pub policy: Option<String>,
    /// Policy signing public key.
    pub publickey: Option<PathBuf>,
    /// Policy signing CA roots.
    pub policy_ca_roots: Vec<PathBuf>,
    /// Policy signing CA intermediates.
    pub policy_ca_intermediates: Vec<PathBuf>,
    /// Timestamp authority roots for policy signatures.
    pub policy_timestamp_servers: Vec<PathBuf>,
    /// Archive server URL.
    pub archivista_server: Option<String>,
    /// Fetch policies from the archive.
    pub enable_archivista: Option<bool>,
    /// Accept bare, unsigned policies.
    pub allow_unsigned_policy: Option<bool>,
}

/// `[log]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LogSection {
    /// Minimum level: debug, info, warn, or error.
    pub level: Option<String>,
    /// Append JSON lines to this file instead of stderr.
    pub file: Option<PathBuf>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads the config file.
///
/// # Errors
///
/// Returns [`CliError::Message`] when an explicit path is missing, or when
/// the file is oversized or malformed.
pub fn load_config(explicit: Option<&Path>) -> CliResult<WitnessConfig> {
    let path = match explicit {
        Some(path) if !path.exists() => {
            return Err(CliError::new(t!("config.not_found", path = path.display())));
        }
        Some(path) => path.to_path_buf(),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !path.is_file() {
                return Ok(WitnessConfig::default());
            }
            path
        }
    };
    let bytes = read_input(&path, MAX_KEY_BYTES, &t!("input.kind.config"))?;
    parse_config(&bytes)
        .map_err(|error| CliError::new(t!("config.invalid", path = path.display(), error = error)))
}

/// Parses config file contents.
///
/// # Errors
///
/// Returns the UTF-8 or TOML error message.
pub fn parse_config(bytes: &[u8]) -> Result<WitnessConfig, String> {
    let text = std::str::from_utf8(bytes).map_err(|err| err.to_string())?;
    toml::from_str(text).map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Merging
// ============================================================================

/// Returns the flag value, or the config value when the flag is absent.
#[must_use]
pub fn pick<T: Clone>(flag: Option<T>, config: Option<&T>) -> Option<T> {
    flag.or_else(|| config.cloned())
}

/// Returns the flag values, or the config values when none were given.
#[must_use]
pub fn pick_list<T: Clone>(flag: &[T], config: &[T]) -> Vec<T> {
    if flag.is_empty() { config.to_vec() } else { flag.to_vec() }
}

/// Returns true when the switch is set or the config enables it.
#[must_use]
pub fn pick_switch(flag: bool, config: Option<bool>) -> bool {
    flag || config.unwrap_or(false)
}

#[cfg(test)]
mod tests;
