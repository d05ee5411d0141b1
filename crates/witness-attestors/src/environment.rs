// crates/witness-attestors/src/environment.rs
// ============================================================================
// Module: Environment Attestor
// Description: Host identity and filtered environment variables.
// Purpose: Record OS, hostname, username, and non-sensitive variables.
// Dependencies: glob, nix, serde, witness-core
// ============================================================================

//! ## Overview
//! Variables are dropped when their name is on the block list or matches a
//! block glob. Names on the allow list (exact or glob) are always kept, even
//! when blocked. The same filter is applied to traced process environments.
//! Security posture: environment values may carry credentials; the block
//! list is the only redaction applied before signing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use glob::MatchOptions;
use glob::Pattern;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::AttestorOptions;
use witness_core::RunPhase;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "environment";

/// Predicate type URI.
pub const TYPE_URI: &str = "https://witness.dev/attestations/environment/v0.1";

/// Option key adding block-list entries.
pub const OPTION_BLOCK: &str = "block";

/// Option key adding allow-list entries.
pub const OPTION_ALLOW: &str = "allow";

/// Built-in sensitive variable names.
pub const DEFAULT_BLOCK_LIST: &[&str] = &[
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AMAZON_AWS_ACCESS_KEY_ID",
    "AMAZON_AWS_SECRET_ACCESS_KEY",
    "ALGOLIA_API_KEY",
    "AZURE_CLIENT_ID",
    "AZURE_CLIENT_SECRET",
    "AZURE_USERNAME",
    "AZURE_PASSWORD",
    "MSI_ENDPOINT",
    "MSI_SECRET",
    "binance_api",
    "binance_secret",
    "BITTREX_API_KEY",
    "BITTREX_API_SECRET",
    "CF_PASSWORD",
    "CF_USERNAME",
    "CODECLIMATE_REPO_TOKEN",
    "COVERALLS_REPO_TOKEN",
    "CIRCLE_TOKEN",
    "DIGITALOCEAN_ACCESS_TOKEN",
    "DOCKER_EMAIL",
    "DOCKER_PASSWORD",
    "DOCKER_USERNAME",
    "DOCKERHUB_PASSWORD",
    "FACEBOOK_APP_ID",
    "FACEBOOK_APP_SECRET",
    "FACEBOOK_ACCESS_TOKEN",
    "FIREBASE_TOKEN",
    "FOSSA_API_KEY",
    "GH_TOKEN",
    "GH_ENTERPRISE_TOKEN",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "GOOGLE_API_KEY",
    "CI_DEPLOY_USER",
    "CI_DEPLOY_PASSWORD",
    "GITLAB_USER_LOGIN",
    "CI_JOB_JWT",
    "CI_JOB_JWT_V2",
    "CI_JOB_TOKEN",
    "HEROKU_API_KEY",
    "HEROKU_API_USER",
    "MAILGUN_API_KEY",
    "MCLI_PRIVATE_API_KEY",
    "MCLI_PUBLIC_API_KEY",
    "NGROK_TOKEN",
    "NGROK_AUTH_TOKEN",
    "NPM_AUTH_TOKEN",
    "OKTA_CLIENT_ORGURL",
    "OKTA_CLIENT_TOKEN",
    "OKTA_OAUTH2_CLIENTSECRET",
    "OKTA_OAUTH2_CLIENTID",
    "OKTA_AUTHN_GROUPID",
    "OS_USERNAME",
    "OS_PASSWORD",
    "PERCY_TOKEN",
    "SAUCE_ACCESS_KEY",
    "SAUCE_USERNAME",
    "SENTRY_AUTH_TOKEN",
    "SLACK_TOKEN",
    "SNYK_TOKEN",
    "square_access_token",
    "square_oauth_secret",
    "STRIPE_API_KEY",
    "STRIPE_DEVICE_NAME",
    "SURGE_TOKEN",
    "SURGE_LOGIN",
    "TWILIO_ACCOUNT_SID",
    "CONSUMER_KEY",
    "CONSUMER_SECRET",
    "TRAVIS_SUDO",
    "TRAVIS_OS_NAME",
    "TRAVIS_SECURE_ENV_VARS",
    "VAULT_TOKEN",
    "VAULT_CLIENT_KEY",
    "TOKEN",
    "VULTR_ACCESS",
    "VULTR_SECRET",
];

/// Built-in sensitive name patterns.
pub const DEFAULT_BLOCK_GLOBS: &[&str] = &["*TOKEN*", "*SECRET*", "*PASSWORD*"];

/// Glob matching ignores case so `gh_token` is caught like `GH_TOKEN`.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

// ============================================================================
// SECTION: Filter
// ============================================================================

/// Name filter combining a block list and an allow list.
#[derive(Debug, Clone)]
pub struct VariableFilter {
    /// Exact blocked names.
    block_names: BTreeSet<String>,
    /// Blocked name patterns.
    block_globs: Vec<Pattern>,
    /// Exact allowed names.
    allow_names: BTreeSet<String>,
    /// Allowed name patterns.
    allow_globs: Vec<Pattern>,
}

impl Default for VariableFilter {
    fn default() -> Self {
        Self {
            block_names: DEFAULT_BLOCK_LIST.iter().map(|name| (*name).to_string()).collect(),
            block_globs: DEFAULT_BLOCK_GLOBS
                .iter()
                .filter_map(|pattern| Pattern::new(pattern).ok())
                .collect(),
            allow_names: BTreeSet::new(),
            allow_globs: Vec::new(),
        }
    }
}

impl VariableFilter {
    /// Adds block-list entries; entries with glob metacharacters are patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::InvalidOption`] for malformed patterns.
    pub fn block(mut self, entries: &[String]) -> Result<Self, AttestationError> {
        split_entries(OPTION_BLOCK, entries, &mut self.block_names, &mut self.block_globs)?;
        Ok(self)
    }

    /// Adds allow-list entries; entries with glob metacharacters are patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::InvalidOption`] for malformed patterns.
    pub fn allow(mut self, entries: &[String]) -> Result<Self, AttestationError> {
        split_entries(OPTION_ALLOW, entries, &mut self.allow_names, &mut self.allow_globs)?;
        Ok(self)
    }

    /// Returns true when a variable may be recorded.
    #[must_use]
    pub fn permits(&self, name: &str) -> bool {
        if self.allow_names.contains(name)
            || self.allow_globs.iter().any(|pattern| pattern.matches_with(name, MATCH_OPTIONS))
        {
            return true;
        }
        !(self.block_names.contains(name)
            || self.block_globs.iter().any(|pattern| pattern.matches_with(name, MATCH_OPTIONS)))
    }

    /// Filters `KEY=value` pairs into a sorted map.
    pub fn apply<I>(&self, variables: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        variables.into_iter().filter(|(name, _)| self.permits(name)).collect()
    }

    /// Filters a NUL-separated `/proc/<pid>/environ` block into a
    /// space-separated `KEY=value` string.
    #[must_use]
    pub fn apply_environ_block(&self, block: &[u8]) -> String {
        String::from_utf8_lossy(block)
            .split('\0')
            .filter(|entry| !entry.is_empty())
            .filter(|entry| self.permits(entry.split_once('=').map_or(*entry, |(name, _)| name)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Sorts entries into exact names and patterns.
fn split_entries(
    option: &str,
    entries: &[String],
    names: &mut BTreeSet<String>,
    globs: &mut Vec<Pattern>,
) -> Result<(), AttestationError> {
    for entry in entries {
        if entry.contains(['*', '?', '[']) {
            let pattern = Pattern::new(entry).map_err(|err| AttestationError::InvalidOption {
                option: option.to_string(),
                message: err.to_string(),
            })?;
            globs.push(pattern);
        } else {
            names.insert(entry.clone());
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Attestor
// ============================================================================

/// Recorded host environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentPredicate {
    /// Operating system name.
    pub os: String,
    /// Host name.
    pub hostname: String,
    /// Current user name.
    pub username: String,
    /// Filtered variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}

/// Environment attestor.
#[derive(Debug, Default)]
pub struct EnvironmentAttestor {
    /// Variable filter.
    filter: VariableFilter,
    /// Injected variables; the process environment is read when absent.
    variables: Option<Vec<(String, String)>>,
    /// Recorded payload.
    predicate: EnvironmentPredicate,
}

impl EnvironmentAttestor {
    /// Creates an environment attestor with the default filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the variable filter.
    #[must_use]
    pub fn with_filter(mut self, filter: VariableFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Records the given variables instead of the process environment.
    #[must_use]
    pub fn with_variables(mut self, variables: Vec<(String, String)>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Returns the recorded payload.
    #[must_use]
    pub const fn predicate_data(&self) -> &EnvironmentPredicate {
        &self.predicate
    }

    /// Registry factory reading `block` and `allow`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::InvalidOption`] for malformed patterns.
    pub fn factory(options: &AttestorOptions) -> Result<Box<dyn Attestor>, AttestationError> {
        let filter = VariableFilter::default()
            .block(options.get_all(OPTION_BLOCK))?
            .allow(options.get_all(OPTION_ALLOW))?;
        Ok(Box::new(Self::new().with_filter(filter)))
    }
}

impl Attestor for EnvironmentAttestor {
    fn name(&self) -> &str {
        NAME
    }

    fn type_uri(&self) -> &str {
        TYPE_URI
    }

    fn phase(&self) -> RunPhase {
        RunPhase::PreMaterial
    }

    fn attest(&mut self, _context: &AttestationContext) -> Result<(), AttestationError> {
        let variables = self.variables.clone().unwrap_or_else(process_variables);
        self.predicate = EnvironmentPredicate {
            os: std::env::consts::OS.to_string(),
            hostname: hostname(),
            username: username(),
            variables: self.filter.apply(variables),
        };
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.predicate)?)
    }
}

/// Reads the process environment, replacing invalid UTF-8 lossily.
fn process_variables() -> Vec<(String, String)> {
    std::env::vars_os()
        .map(|(name, value)| {
            (name.to_string_lossy().into_owned(), value.to_string_lossy().into_owned())
        })
        .collect()
}

/// Returns the host name, or an empty string when unavailable.
#[cfg(unix)]
fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Returns the host name, or an empty string when unavailable.
#[cfg(not(unix))]
fn hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_default()
}

/// Returns the current user name, or an empty string when unavailable.
#[cfg(unix)]
fn username() -> String {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|user| user.name)
        .unwrap_or_default()
}

/// Returns the current user name, or an empty string when unavailable.
#[cfg(not(unix))]
fn username() -> String {
    std::env::var("USERNAME").unwrap_or_default()
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the environment payload.
#[must_use]
pub fn schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "environment",
        "type": "object",
        "required": ["os", "hostname", "username"],
        "properties": {
            "os": {"type": "string"},
            "hostname": {"type": "string"},
            "username": {"type": "string"},
            "variables": {"type": "object", "additionalProperties": {"type": "string"}},
        },
    })
}

#[cfg(test)]
mod tests;
