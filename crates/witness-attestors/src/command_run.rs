// crates/witness-attestors/src/command_run.rs
// ============================================================================
// Module: Command-Run Attestor
// Description: Executes the user command and records its observable run.
// Purpose: Capture argv, stdio, exit code, and the traced process tree.
// Dependencies: nix, serde, witness-core
// ============================================================================

//! ## Overview
//! The command is spawned in the context working directory with stdout and
//! stderr piped through reader threads that buffer the output and mirror it
//! to the host streams unless `silent` is set. With `trace` enabled on a
//! supported Linux target the child runs under ptrace and every observed task
//! is recorded; elsewhere the attestor logs a warning and only waits.
//! Invariants:
//! - A non-zero exit still leaves a complete payload; the attestor then
//!   returns [`AttestationError::CommandFailed`].
//! - Cancellation kills the child and yields [`AttestationError::Cancelled`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Read;
use std::io::Write;
use std::process::Child;
use std::process::Command;
use std::process::Stdio;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::AttestorOptions;
use witness_core::DigestSet;
use witness_core::LogEvent;
use witness_core::LogLevel;
use witness_core::RunPhase;
use witness_core::attestation::COMMAND_RUN_TYPE;

use crate::environment::VariableFilter;

#[cfg(all(
    target_os = "linux",
    target_env = "gnu",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]
mod trace;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "command-run";

/// Option key holding argv entries.
pub const OPTION_CMD: &str = "cmd";

/// Option key enabling syscall tracing.
pub const OPTION_TRACE: &str = "trace";

/// Option key suppressing host stdio mirroring.
pub const OPTION_SILENT: &str = "silent";

/// Poll interval while waiting for an untraced child.
const WAIT_POLL: Duration = Duration::from_millis(20);

/// Read buffer size for stdio pumps.
const PUMP_CHUNK: usize = 8192;

/// Exit code recorded when the child was killed by a signal.
const SIGNAL_EXIT_CODE: i32 = -1;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One task observed while tracing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Program path from the last exec.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub program: String,
    /// Task identifier.
    pub processid: i32,
    /// Parent task identifier.
    pub parentpid: i32,
    /// Digest of the program path.
    #[serde(default, skip_serializing_if = "DigestSet::is_empty")]
    pub programdigest: DigestSet,
    /// Kernel command name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comm: String,
    /// Space-joined argv.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cmdline: String,
    /// Digest of `/proc/<pid>/exe`.
    #[serde(default, skip_serializing_if = "DigestSet::is_empty")]
    pub exedigest: DigestSet,
    /// Opened paths with open counts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub openedfiles: BTreeMap<String, u64>,
    /// Filtered environment block.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environ: String,
    /// Speculative store bypass vulnerability flag.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub specbypassisvuln: bool,
}

/// Command-run payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRunPredicate {
    /// Command argv.
    pub cmd: Vec<String>,
    /// Captured standard output.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    /// Captured standard error.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    /// Exit code, or -1 when killed by a signal.
    pub exitcode: i32,
    /// Traced tasks ordered by pid.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processes: Vec<ProcessInfo>,
}

/// Result of waiting on the child.
struct Outcome {
    /// Exit code.
    exit_code: i32,
    /// Traced tasks.
    processes: Vec<ProcessInfo>,
    /// True when the wait ended by cancellation.
    cancelled: bool,
}

// ============================================================================
// SECTION: Attestor
// ============================================================================

/// Runs the user command.
#[derive(Debug, Default)]
pub struct CommandRunAttestor {
    /// Recorded payload.
    predicate: CommandRunPredicate,
    /// Trace the process tree when supported.
    trace: bool,
    /// Skip mirroring stdio to the host.
    silent: bool,
    /// Filter for traced environments.
    filter: VariableFilter,
}

impl CommandRunAttestor {
    /// Creates an attestor for an argv.
    #[must_use]
    pub fn new(cmd: Vec<String>) -> Self {
        Self {
            predicate: CommandRunPredicate {
                cmd,
                ..CommandRunPredicate::default()
            },
            ..Self::default()
        }
    }

    /// Enables or disables tracing.
    #[must_use]
    pub const fn with_tracing(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Enables or disables host stdio mirroring suppression.
    #[must_use]
    pub const fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Returns the recorded payload.
    #[must_use]
    pub const fn predicate_data(&self) -> &CommandRunPredicate {
        &self.predicate
    }

    /// Registry factory reading `cmd`, `trace`, and `silent`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::InvalidOption`] for malformed flags.
    pub fn factory(options: &AttestorOptions) -> Result<Box<dyn Attestor>, AttestationError> {
        Ok(Box::new(
            Self::new(options.get_all(OPTION_CMD).to_vec())
                .with_tracing(options.get_bool(OPTION_TRACE)?.unwrap_or(false))
                .with_silent(options.get_bool(OPTION_SILENT)?.unwrap_or(false)),
        ))
    }

    /// Spawns the child with piped stdio.
    fn spawn(&self, context: &AttestationContext, traced: bool) -> Result<Child, AttestationError> {
        let (program, args) = self.predicate.cmd.split_first().ok_or_else(|| {
            AttestationError::InvalidOption {
                option: OPTION_CMD.to_string(),
                message: "command-run requires a command".to_string(),
            }
        })?;
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(context.working_dir())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(all(
            target_os = "linux",
            target_env = "gnu",
            any(target_arch = "x86_64", target_arch = "aarch64")
        ))]
        if traced {
            trace::enable(&mut command);
        }
        #[cfg(not(all(
            target_os = "linux",
            target_env = "gnu",
            any(target_arch = "x86_64", target_arch = "aarch64")
        )))]
        let _ = traced;
        command.spawn().map_err(|err| {
            AttestationError::Failed(format!("failed to start {program}: {err}"))
        })
    }

    /// Waits for the child, tracing when enabled.
    fn wait(
        &self,
        child: &mut Child,
        context: &AttestationContext,
        traced: bool,
    ) -> Result<Outcome, AttestationError> {
        #[cfg(all(
            target_os = "linux",
            target_env = "gnu",
            any(target_arch = "x86_64", target_arch = "aarch64")
        ))]
        if traced {
            let program = self.predicate.cmd.first().cloned().unwrap_or_default();
            let traced = trace::run(child, &program, context, &self.filter)?;
            return Ok(Outcome {
                exit_code: traced.exit_code,
                processes: traced.processes,
                cancelled: traced.cancelled,
            });
        }
        let _ = traced;
        wait_untraced(child, context)
    }
}

impl Attestor for CommandRunAttestor {
    fn name(&self) -> &str {
        NAME
    }

    fn type_uri(&self) -> &str {
        COMMAND_RUN_TYPE
    }

    fn phase(&self) -> RunPhase {
        RunPhase::Execute
    }

    fn attest(&mut self, context: &AttestationContext) -> Result<(), AttestationError> {
        if let Some(material_dir) = context.material_dir()
            && material_dir != context.working_dir()
        {
            return Err(AttestationError::WorkingDirMismatch {
                expected: material_dir.display().to_string(),
                actual: context.working_dir().display().to_string(),
            });
        }
        context.check_cancelled()?;

        let traced = self.trace && tracing_supported();
        if self.trace && !traced {
            context.log(&LogEvent::new(
                "trace_unsupported",
                LogLevel::Warn,
                NAME,
                "process tracing is not supported on this platform; running untraced",
            ));
        }

        let mut child = self.spawn(context, traced)?;
        let stdout = child.stdout.take().map(|pipe| pump(pipe, mirror(self.silent, true)));
        let stderr = child.stderr.take().map(|pipe| pump(pipe, mirror(self.silent, false)));
        let outcome = self.wait(&mut child, context, traced);

        self.predicate.stdout = join_pump(stdout)?;
        self.predicate.stderr = join_pump(stderr)?;
        let outcome = outcome?;
        self.predicate.exitcode = outcome.exit_code;
        self.predicate.processes = outcome.processes;

        if outcome.cancelled {
            return Err(AttestationError::Cancelled);
        }
        if outcome.exit_code != 0 {
            return Err(AttestationError::CommandFailed {
                code: outcome.exit_code,
            });
        }
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.predicate)?)
    }
}

// ============================================================================
// SECTION: Process Plumbing
// ============================================================================

/// Returns true when the build target supports process tracing.
#[must_use]
pub const fn tracing_supported() -> bool {
    cfg!(all(
        target_os = "linux",
        target_env = "gnu",
        any(target_arch = "x86_64", target_arch = "aarch64")
    ))
}

/// Polls an untraced child until it exits or the run is cancelled.
fn wait_untraced(
    child: &mut Child,
    context: &AttestationContext,
) -> Result<Outcome, AttestationError> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Outcome {
                exit_code: status.code().unwrap_or(SIGNAL_EXIT_CODE),
                processes: Vec::new(),
                cancelled: false,
            });
        }
        if context.is_cancelled() {
            child.kill()?;
            let status = child.wait()?;
            return Ok(Outcome {
                exit_code: status.code().unwrap_or(SIGNAL_EXIT_CODE),
                processes: Vec::new(),
                cancelled: true,
            });
        }
        thread::sleep(WAIT_POLL);
    }
}

/// Returns the host stream a pump mirrors into.
fn mirror(silent: bool, stdout: bool) -> Option<Box<dyn Write + Send>> {
    if silent {
        None
    } else if stdout {
        Some(Box::new(std::io::stdout()))
    } else {
        Some(Box::new(std::io::stderr()))
    }
}

/// Copies a pipe into a buffer, mirroring each chunk when configured.
fn pump<R>(mut reader: R, mut mirror: Option<Box<dyn Write + Send>>) -> JoinHandle<Vec<u8>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut captured = Vec::new();
        let mut chunk = [0_u8; PUMP_CHUNK];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(read) => {
                    captured.extend_from_slice(&chunk[.. read]);
                    if let Some(out) = mirror.as_mut() {
                        let _ = out.write_all(&chunk[.. read]).and_then(|()| out.flush());
                    }
                }
            }
        }
        captured
    })
}

/// Joins a pump thread and decodes its output lossily.
fn join_pump(handle: Option<JoinHandle<Vec<u8>>>) -> Result<String, AttestationError> {
    let Some(handle) = handle else {
        return Ok(String::new());
    };
    let captured = handle
        .join()
        .map_err(|_| AttestationError::Failed("stdio reader thread panicked".to_string()))?;
    Ok(String::from_utf8_lossy(&captured).into_owned())
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the command-run payload.
#[must_use]
pub fn schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "command-run",
        "type": "object",
        "required": ["cmd", "exitcode"],
        "properties": {
            "cmd": {"type": "array", "items": {"type": "string"}},
            "stdout": {"type": "string"},
            "stderr": {"type": "string"},
            "exitcode": {"type": "integer"},
            "processes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["processid", "parentpid"],
                    "properties": {
                        "program": {"type": "string"},
                        "processid": {"type": "integer"},
                        "parentpid": {"type": "integer"},
                        "programdigest": crate::registry::digest_set_schema(),
                        "comm": {"type": "string"},
                        "cmdline": {"type": "string"},
                        "exedigest": crate::registry::digest_set_schema(),
                        "openedfiles": {
                            "type": "object",
                            "additionalProperties": {"type": "integer", "minimum": 1},
                        },
                        "environ": {"type": "string"},
                        "specbypassisvuln": {"type": "boolean"},
                    },
                },
            },
        },
    })
}
