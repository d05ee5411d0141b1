// crates/witness-attestors/src/file.rs
// ============================================================================
// Module: Artifact Walker
// Description: Lexicographic directory walk producing artifact digests.
// Purpose: Shared snapshot routine for the material and product recorders.
// Dependencies: witness-core
// ============================================================================

//! ## Overview
//! [`record_artifacts`] walks a directory tree in lexicographic order and
//! hashes every regular file. Directories are recursed but never recorded.
//! Symlinks are resolved; each resolved target is tracked in a visited set
//! that is copied on descent, so sibling subtrees never share walk state and
//! link cycles terminate. Files whose digest equals the baseline entry for
//! the same path are omitted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use witness_core::AttestationError;
use witness_core::DigestSet;
use witness_core::HashFunction;
use witness_core::attestation::context::AttestationContext;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Inputs shared by every level of one walk.
struct Walk<'a> {
    /// Baseline digests keyed by relative path.
    baseline: &'a BTreeMap<String, DigestSet>,
    /// Hash functions applied to each file.
    hashes: &'a [HashFunction],
    /// Run context polled for cancellation.
    context: Option<&'a AttestationContext>,
}

// ============================================================================
// SECTION: Walk
// ============================================================================

/// Records every file under `root` whose digest differs from `baseline`.
///
/// Keys are `/`-separated paths relative to `root`.
///
/// # Errors
///
/// Returns [`AttestationError::Io`] or [`AttestationError::Digest`] when a
/// directory or file cannot be read and [`AttestationError::Cancelled`] when
/// the context is cancelled mid-walk.
pub fn record_artifacts(
    root: &Path,
    baseline: &BTreeMap<String, DigestSet>,
    hashes: &[HashFunction],
    context: Option<&AttestationContext>,
) -> Result<BTreeMap<String, DigestSet>, AttestationError> {
    let walk = Walk {
        baseline,
        hashes,
        context,
    };
    let mut visited = BTreeSet::new();
    if let Ok(canonical) = fs::canonicalize(root) {
        visited.insert(canonical);
    }
    let mut artifacts = BTreeMap::new();
    walk_dir(&walk, root, "", visited, &mut artifacts)?;
    Ok(artifacts)
}

/// Walks one directory level.
fn walk_dir(
    walk: &Walk<'_>,
    dir: &Path,
    prefix: &str,
    visited: BTreeSet<PathBuf>,
    artifacts: &mut BTreeMap<String, DigestSet>,
) -> Result<(), AttestationError> {
    if let Some(context) = walk.context {
        context.check_cancelled()?;
    }
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative = join_relative(prefix, &name);
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            let Ok(target) = fs::canonicalize(&path) else {
                continue;
            };
            if visited.contains(&target) {
                continue;
            }
            let mut descent = visited.clone();
            descent.insert(target.clone());
            if target.is_dir() {
                walk_dir(walk, &target, &relative, descent, artifacts)?;
            } else if target.is_file() {
                record_file(walk, &target, relative, artifacts)?;
            }
        } else if file_type.is_dir() {
            walk_dir(walk, &path, &relative, visited.clone(), artifacts)?;
        } else if file_type.is_file() {
            record_file(walk, &path, relative, artifacts)?;
        }
    }
    Ok(())
}

/// Hashes one file and records it unless it matches the baseline.
fn record_file(
    walk: &Walk<'_>,
    path: &Path,
    relative: String,
    artifacts: &mut BTreeMap<String, DigestSet>,
) -> Result<(), AttestationError> {
    let digest = DigestSet::from_file(path, walk.hashes)?;
    if should_record(&relative, &digest, walk.baseline) {
        artifacts.insert(relative, digest);
    }
    Ok(())
}

/// Returns false when the baseline holds an equal digest for the path.
fn should_record(path: &str, digest: &DigestSet, baseline: &BTreeMap<String, DigestSet>) -> bool {
    baseline.get(path).is_none_or(|previous| !digest.equal(previous))
}

/// Joins a relative prefix and an entry name with `/`.
fn join_relative(prefix: &str, name: &str) -> String {
    if prefix.is_empty() { name.to_string() } else { format!("{prefix}/{name}") }
}
