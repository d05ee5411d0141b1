// crates/witness-cli/tests/common/mod.rs
// ============================================================================
// Module: CLI Test Helpers
// Description: Binary invocation and key material for CLI tests.
// Purpose: Drive the witness binary inside throwaway directories.
// Dependencies: witness binary, rcgen, tempfile
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    dead_code,
    reason = "Shared helpers are used by a subset of test binaries."
)]

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use rcgen::KeyPair;
use tempfile::TempDir;

/// Returns the compiled witness binary.
pub fn witness_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_witness"))
}

/// Throwaway workspace with a key pair and a build directory.
pub struct Workspace {
    /// Root directory, removed on drop.
    pub root: TempDir,
    /// PKCS#8 private key.
    pub private_key: PathBuf,
    /// SPKI public key.
    pub public_key: PathBuf,
    /// Directory the attested command runs in.
    pub build_dir: PathBuf,
}

impl Workspace {
    /// Creates the workspace and writes a fresh P-256 key pair.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("temp dir");
        let keys = root.path().join("keys");
        let build_dir = root.path().join("build");
        fs::create_dir_all(&keys).expect("keys dir");
        fs::create_dir_all(&build_dir).expect("build dir");
        let pair = KeyPair::generate().expect("key pair");
        let private_key = keys.join("signer.pem");
        let public_key = keys.join("signer.pub");
        fs::write(&private_key, pair.serialize_pem()).expect("write private key");
        fs::write(&public_key, pair.public_key_pem()).expect("write public key");
        Self {
            root,
            private_key,
            public_key,
            build_dir,
        }
    }

    /// Returns a path under the root.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Runs the binary from the root directory.
    pub fn witness(&self, args: &[&str]) -> Output {
        witness_in(self.root.path(), args)
    }
}

/// Runs the binary from `dir`.
pub fn witness_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(witness_bin())
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run witness")
}

/// Returns the process exit code.
pub fn exit_code(output: &Output) -> i32 {
    output.status.code().expect("exit code")
}

/// Returns stdout as text.
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Returns stderr as text.
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Converts a path to an argument string.
pub fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
