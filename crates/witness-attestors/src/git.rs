// crates/witness-attestors/src/git.rs
// ============================================================================
// Module: Git Attestor
// Description: Repository HEAD, branch, and working-tree deviations.
// Purpose: Bind a build to the source revision it was built from.
// Dependencies: serde, witness-core
// ============================================================================

//! ## Overview
//! The attestor shells out to the `git` CLI in the working directory. Paths
//! that are unmodified in both the index and the worktree are omitted from
//! the status map. The HEAD commit becomes a `commithash:<sha>` subject with
//! a SHA-1 digest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

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
use witness_core::HashFunction;
use witness_core::RunPhase;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "git";

/// Predicate type URI.
pub const TYPE_URI: &str = "https://witness.dev/attestations/git/v0.1";

/// Declared capabilities.
const CAPABILITIES: &[Capability] = &[Capability::Subjects];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Index and worktree status of one path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    /// Index status.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub staging: String,
    /// Worktree status.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub worktree: String,
}

/// Git payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitPredicate {
    /// HEAD commit hash.
    pub commithash: String,
    /// Current branch, or `HEAD` when detached.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
    /// Deviating paths.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub status: BTreeMap<String, FileStatus>,
}

/// Git attestor.
#[derive(Debug, Default)]
pub struct GitAttestor {
    /// Recorded payload.
    predicate: GitPredicate,
}

impl GitAttestor {
    /// Creates a git attestor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded payload.
    #[must_use]
    pub const fn predicate_data(&self) -> &GitPredicate {
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
}

impl Attestor for GitAttestor {
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
        let dir = context.working_dir();
        let commithash = git(dir, &["rev-parse", "HEAD"])?.trim().to_string();
        let branch = git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_string();
        let porcelain = git(dir, &["status", "--porcelain=v1", "-z"])?;
        self.predicate = GitPredicate {
            commithash,
            branch,
            status: parse_porcelain(&porcelain),
        };
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.predicate)?)
    }

    fn subjects(&self) -> BTreeMap<String, DigestSet> {
        if self.predicate.commithash.is_empty() {
            return BTreeMap::new();
        }
        let mut digest = DigestSet::new();
        digest.insert(HashFunction::Sha1, self.predicate.commithash.clone());
        BTreeMap::from([(format!("commithash:{}", self.predicate.commithash), digest)])
    }
}

// ============================================================================
// SECTION: Git CLI
// ============================================================================

/// Runs a git subcommand and returns stdout.
fn git(dir: &Path, args: &[&str]) -> Result<String, AttestationError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map_err(|err| AttestationError::Failed(format!("failed to run git: {err}")))?;
    if !output.status.success() {
        return Err(AttestationError::Failed(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses `git status --porcelain=v1 -z` output.
///
/// Rename and copy entries carry the original path as an extra field, which
/// is skipped.
#[must_use]
pub fn parse_porcelain(output: &str) -> BTreeMap<String, FileStatus> {
    let mut status = BTreeMap::new();
    let mut fields = output.split('\0').filter(|field| !field.is_empty());
    while let Some(entry) = fields.next() {
        let mut codes = entry.chars();
        let (Some(index), Some(worktree)) = (codes.next(), codes.next()) else {
            continue;
        };
        let Some(path) = entry.get(3 ..) else {
            continue;
        };
        if matches!(index, 'R' | 'C') {
            let _ = fields.next();
        }
        if index == ' ' && worktree == ' ' {
            continue;
        }
        status.insert(path.to_string(), FileStatus {
            staging: status_label(index),
            worktree: status_label(worktree),
        });
    }
    status
}

/// Maps a porcelain status code to a label.
fn status_label(code: char) -> String {
    match code {
        ' ' => "unmodified",
        '?' => "untracked",
        '!' => "ignored",
        'M' => "modified",
        'T' => "typechanged",
        'A' => "added",
        'D' => "deleted",
        'R' => "renamed",
        'C' => "copied",
        'U' => "updated",
        _ => return code.to_string(),
    }
    .to_string()
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the git payload.
#[must_use]
pub fn schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "git",
        "type": "object",
        "required": ["commithash"],
        "properties": {
            "commithash": {"type": "string", "pattern": "^[0-9a-f]{40,64}$"},
            "branch": {"type": "string"},
            "status": {
                "type": "object",
                "additionalProperties": {
                    "type": "object",
                    "properties": {
                        "staging": {"type": "string"},
                        "worktree": {"type": "string"},
                    },
                },
            },
        },
    })
}
