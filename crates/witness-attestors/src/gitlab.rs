// crates/witness-attestors/src/gitlab.rs
// ============================================================================
// Module: GitLab CI Attestor
// Description: GitLab job, pipeline, and project metadata.
// Purpose: Bind a build to the CI job that produced it.
// Dependencies: serde, witness-core
// ============================================================================

//! ## Overview
//! Fields come from the predefined `CI_*` variables. When `CI_JOB_JWT` is set
//! the job token is verified against `{CI_SERVER_URL}/-/jwks` and embedded.
//! The attestor fails outside GitLab CI (`GITLAB_CI` must be `true`).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::AttestorOptions;
use witness_core::Capability;
use witness_core::DigestSet;
use witness_core::RunPhase;

use crate::http::HttpFetcher;
use crate::jwt::JwtAttestor;
use crate::jwt::JwtPredicate;
use crate::subject::insert_value_subject;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "gitlab";

/// Predicate type URI.
pub const TYPE_URI: &str = "https://witness.dev/attestations/gitlab/v0.1";

/// Server used when `CI_SERVER_URL` is unset.
pub const DEFAULT_SERVER_URL: &str = "https://gitlab.com";

/// Declared capabilities.
const CAPABILITIES: &[Capability] = &[Capability::Subjects];

// ============================================================================
// SECTION: Types
// ============================================================================

/// GitLab payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitlabPredicate {
    /// Verified job token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtPredicate>,
    /// Pipeline definition path.
    pub ciconfigpath: String,
    /// Job identifier.
    pub jobid: String,
    /// Job image.
    pub jobimage: String,
    /// Job name.
    pub jobname: String,
    /// Job stage.
    pub jobstage: String,
    /// Job URL.
    pub joburl: String,
    /// Pipeline identifier.
    pub pipelineid: String,
    /// Pipeline URL.
    pub pipelineurl: String,
    /// Project identifier.
    pub projectid: String,
    /// Project URL.
    pub projecturl: String,
    /// Runner identifier.
    pub runnerid: String,
    /// Server host.
    pub cihost: String,
}

/// GitLab CI attestor.
#[derive(Debug, Default)]
pub struct GitlabAttestor {
    /// Injected variables; the process environment is read when absent.
    variables: Option<BTreeMap<String, String>>,
    /// Recorded payload.
    predicate: GitlabPredicate,
    /// Derived subjects.
    subjects: BTreeMap<String, DigestSet>,
}

impl GitlabAttestor {
    /// Creates an attestor reading the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the given variables instead of the process environment.
    #[must_use]
    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Returns the recorded payload.
    #[must_use]
    pub const fn predicate_data(&self) -> &GitlabPredicate {
        &self.predicate
    }

    /// Registry factory.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the registry factory type.
    pub fn factory(_options: &AttestorOptions) -> Result<Box<dyn Attestor>, AttestationError> {
        Ok(Box::new(Self::new()))
    }

    /// Returns a variable or an empty string.
    fn var(&self, name: &str) -> String {
        match &self.variables {
            Some(variables) => variables.get(name).cloned().unwrap_or_default(),
            None => std::env::var(name).unwrap_or_default(),
        }
    }
}

impl Attestor for GitlabAttestor {
    fn name(&self) -> &str {
        NAME
    }

    fn type_uri(&self) -> &str {
        TYPE_URI
    }

    fn phase(&self) -> RunPhase {
        RunPhase::PreMaterial
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn attest(&mut self, context: &AttestationContext) -> Result<(), AttestationError> {
        if self.var("GITLAB_CI") != "true" {
            return Err(AttestationError::Failed("not in a gitlab ci job".to_string()));
        }

        let token = self.var("CI_JOB_JWT");
        let jwt = if token.is_empty() {
            None
        } else {
            let server = self.var("CI_SERVER_URL");
            let server = if server.is_empty() { DEFAULT_SERVER_URL } else { server.as_str() };
            let mut jwt =
                JwtAttestor::new(token, format!("{}/-/jwks", server.trim_end_matches('/')));
            jwt.verify(context, &HttpFetcher::new()?)?;
            Some(jwt.predicate_data().clone())
        };

        self.predicate = GitlabPredicate {
            jwt,
            ciconfigpath: self.var("CI_CONFIG_PATH"),
            jobid: self.var("CI_JOB_ID"),
            jobimage: self.var("CI_JOB_IMAGE"),
            jobname: self.var("CI_JOB_NAME"),
            jobstage: self.var("CI_JOB_STAGE"),
            joburl: self.var("CI_JOB_URL"),
            pipelineid: self.var("CI_PIPELINE_ID"),
            pipelineurl: self.var("CI_PIPELINE_URL"),
            projectid: self.var("CI_PROJECT_ID"),
            projecturl: self.var("CI_PROJECT_URL"),
            runnerid: self.var("CI_RUNNER_ID"),
            cihost: self.var("CI_SERVER_HOST"),
        };

        let hashes = context.hashes();
        let mut subjects = BTreeMap::new();
        insert_value_subject(&mut subjects, "pipelineurl", &self.predicate.pipelineurl, hashes)?;
        insert_value_subject(&mut subjects, "joburl", &self.predicate.joburl, hashes)?;
        insert_value_subject(&mut subjects, "projecturl", &self.predicate.projecturl, hashes)?;
        self.subjects = subjects;
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.predicate)?)
    }

    fn subjects(&self) -> BTreeMap<String, DigestSet> {
        self.subjects.clone()
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the GitLab payload.
#[must_use]
pub fn schema() -> Value {
    let text = json!({"type": "string"});
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "gitlab",
        "type": "object",
        "required": ["jobid", "pipelineid", "projectid"],
        "properties": {
            "jwt": crate::jwt::schema(),
            "ciconfigpath": text,
            "jobid": text,
            "jobimage": text,
            "jobname": text,
            "jobstage": text,
            "joburl": text,
            "pipelineid": text,
            "pipelineurl": text,
            "projectid": text,
            "projecturl": text,
            "runnerid": text,
            "cihost": text,
        },
    })
}
