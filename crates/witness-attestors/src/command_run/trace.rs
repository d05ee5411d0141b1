// crates/witness-attestors/src/command_run/trace.rs
// ============================================================================
// Module: Process Tracer
// Description: ptrace loop over the command's process tree.
// Purpose: Record exec'd programs and opened files per traced task.
// Dependencies: nix, witness-core
// ============================================================================

//! ## Overview
//! The child calls `PTRACE_TRACEME` before exec and stops on its first exec.
//! The tracer then enables syscall-stop marking plus exec, exit, fork, vfork,
//! and clone events, and resumes every stop with `PTRACE_SYSCALL`. Syscall
//! entry and exit stops alternate per task; only entries are decoded.
//! Invariants:
//! - The loop ends only when no tracee is left, so tasks that outlive the
//!   root are resumed and reaped before the output pipes are drained.
//! - Cancellation kills every live tracee, not just the root.
//! - Tracer-induced stops are resumed without a signal; every other stop
//!   signal is re-injected.
//! - Remote strings are read page by page and capped at [`MAX_PATH_LEN`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::io::IoSliceMut;
use std::os::unix::process::CommandExt;
use std::process::Child;
use std::process::Command;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::libc;
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::signal::kill;
use nix::sys::uio::RemoteIoVec;
use nix::sys::uio::process_vm_readv;
use nix::sys::wait::WaitPidFlag;
use nix::sys::wait::WaitStatus;
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::DigestSet;
use witness_core::HashFunction;
use witness_core::LogEvent;
use witness_core::LogLevel;

use super::NAME;
use super::ProcessInfo;
use super::SIGNAL_EXIT_CODE;
use crate::environment::VariableFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum bytes read for a path argument.
pub const MAX_PATH_LEN: usize = 4096;

/// Page granularity used to split remote reads.
const PAGE_SIZE: usize = 4096;

/// Poll interval of the cancellation watcher.
const CANCEL_POLL: Duration = Duration::from_millis(25);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of a traced run.
pub struct TraceOutcome {
    /// Exit code of the root task.
    pub exit_code: i32,
    /// Observed tasks ordered by pid.
    pub processes: Vec<ProcessInfo>,
    /// True when the run was cancelled.
    pub cancelled: bool,
}

/// Tracer state.
struct Tracer<'a> {
    /// Root task.
    root: Pid,
    /// Observed tasks.
    processes: BTreeMap<i32, ProcessInfo>,
    /// Tasks currently between syscall entry and exit.
    in_syscall: BTreeSet<i32>,
    /// Tasks whose initial attach stop was already consumed.
    started: BTreeSet<i32>,
    /// Tasks that have not exited yet, shared with the cancellation watcher.
    live: Arc<Mutex<BTreeSet<i32>>>,
    /// Hash functions for program digests.
    hashes: &'a [HashFunction],
    /// Filter for recorded environments.
    filter: &'a VariableFilter,
}

// ============================================================================
// SECTION: Spawn
// ============================================================================

/// Makes the spawned child request tracing before exec.
pub fn enable(command: &mut Command) {
    // SAFETY: the hook runs between fork and exec and only issues the
    // async-signal-safe PTRACE_TRACEME syscall without touching shared state.
    #[allow(unsafe_code, reason = "pre_exec is required to request tracing in the forked child.")]
    unsafe {
        command.pre_exec(|| ptrace::traceme().map_err(std::io::Error::from));
    }
}

// ============================================================================
// SECTION: Tracing
// ============================================================================

/// Traces a spawned child until every task in its tree has exited.
///
/// # Errors
///
/// Returns [`AttestationError::Failed`] when ptrace setup or waiting fails.
pub fn run(
    child: &Child,
    program: &str,
    context: &AttestationContext,
    filter: &VariableFilter,
) -> Result<TraceOutcome, AttestationError> {
    let raw = i32::try_from(child.id())
        .map_err(|_| AttestationError::Failed("child pid out of range".to_string()))?;
    let root = Pid::from_raw(raw);

    let finished = Arc::new(AtomicBool::new(false));
    let cancelled = Arc::new(AtomicBool::new(false));
    let live = Arc::new(Mutex::new(BTreeSet::from([raw])));
    let watcher = {
        let token = context.cancellation().clone();
        let finished = Arc::clone(&finished);
        let cancelled = Arc::clone(&cancelled);
        let live = Arc::clone(&live);
        thread::spawn(move || {
            while !finished.load(Ordering::Acquire) {
                if token.is_cancelled() {
                    cancelled.store(true, Ordering::Release);
                    kill_live(&live);
                }
                thread::sleep(CANCEL_POLL);
            }
        })
    };

    let mut tracer = Tracer {
        root,
        processes: BTreeMap::new(),
        in_syscall: BTreeSet::new(),
        started: BTreeSet::from([raw]),
        live,
        hashes: context.hashes(),
        filter,
    };
    let result = tracer.trace(program);
    finished.store(true, Ordering::Release);
    let _ = watcher.join();

    let was_cancelled = cancelled.load(Ordering::Acquire);
    if was_cancelled {
        for pid in tracer.processes.keys() {
            let _ = kill(Pid::from_raw(*pid), Signal::SIGKILL);
        }
    }
    let exit_code = result.map_err(|err| trace_error("trace", err))?;
    context.log(
        &LogEvent::new("trace_complete", LogLevel::Debug, NAME, "process trace finished")
            .with_field("processes", tracer.processes.len())
            .with_field("exit_code", exit_code),
    );
    Ok(TraceOutcome {
        exit_code,
        processes: tracer.processes.into_values().collect(),
        cancelled: was_cancelled,
    })
}

impl Tracer<'_> {
    /// Runs the wait loop until no tracee is left and returns the root exit
    /// code.
    fn trace(&mut self, program: &str) -> Result<i32, Errno> {
        match waitpid(self.root, Some(WaitPidFlag::__WALL))? {
            WaitStatus::Exited(_, code) => return Ok(code),
            WaitStatus::Signaled(..) => return Ok(SIGNAL_EXIT_CODE),
            _ => {}
        }
        ptrace::setoptions(
            self.root,
            ptrace::Options::PTRACE_O_TRACESYSGOOD
                | ptrace::Options::PTRACE_O_TRACEEXEC
                | ptrace::Options::PTRACE_O_TRACEEXIT
                | ptrace::Options::PTRACE_O_TRACEFORK
                | ptrace::Options::PTRACE_O_TRACEVFORK
                | ptrace::Options::PTRACE_O_TRACECLONE,
        )?;
        self.process(self.root).program = program.to_string();
        self.read_proc(self.root);
        ptrace::syscall(self.root, None)?;

        let mut root_exit = None;
        loop {
            let status = match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::__WALL)) {
                Ok(status) => status,
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => return Ok(root_exit.unwrap_or(SIGNAL_EXIT_CODE)),
                Err(err) => return Err(err),
            };
            match status {
                WaitStatus::Exited(pid, code) => {
                    self.reap(pid);
                    if pid == self.root {
                        root_exit = Some(code);
                    }
                }
                WaitStatus::Signaled(pid, _, _) => {
                    self.reap(pid);
                    if pid == self.root {
                        root_exit = Some(SIGNAL_EXIT_CODE);
                    }
                }
                WaitStatus::PtraceSyscall(pid) => {
                    let raw = pid.as_raw();
                    if self.in_syscall.remove(&raw) {
                        resume(pid, None);
                    } else {
                        self.in_syscall.insert(raw);
                        self.on_syscall_entry(pid);
                        resume(pid, None);
                    }
                }
                WaitStatus::PtraceEvent(pid, _, event) => {
                    self.on_event(pid, event);
                    resume(pid, None);
                }
                WaitStatus::Stopped(pid, signal) => {
                    self.process(pid);
                    let fresh = self.started.insert(pid.as_raw());
                    if fresh && let Ok(mut live) = self.live.lock() {
                        live.insert(pid.as_raw());
                    }
                    if fresh && signal == Signal::SIGSTOP {
                        resume(pid, None);
                    } else {
                        resume(pid, Some(signal));
                    }
                }
                _ => {}
            }
        }
    }

    /// Decodes a syscall entry.
    fn on_syscall_entry(&mut self, pid: Pid) {
        let Ok(regs) = ptrace::getregs(pid) else {
            return;
        };
        let (number, args) = syscall_registers(&regs);
        let Ok(number) = libc::c_long::try_from(number) else {
            return;
        };
        if number == libc::SYS_execve {
            if let Some(path) = read_string(pid, args[0]) {
                self.process(pid).program = path;
            }
        } else if number == libc::SYS_execveat {
            if let Some(path) = read_string(pid, args[1]) {
                self.process(pid).program = path;
            }
        } else if number == libc::SYS_openat
            && let Some(path) = read_string(pid, args[1])
        {
            *self.process(pid).openedfiles.entry(path).or_insert(0) += 1;
        }
    }

    /// Forgets a task that has exited.
    fn reap(&mut self, pid: Pid) {
        self.in_syscall.remove(&pid.as_raw());
        if let Ok(mut live) = self.live.lock() {
            live.remove(&pid.as_raw());
        }
    }

    /// Handles a ptrace event stop.
    fn on_event(&mut self, pid: Pid, event: i32) {
        match event {
            libc::PTRACE_EVENT_FORK | libc::PTRACE_EVENT_VFORK | libc::PTRACE_EVENT_CLONE => {
                if let Some(child) = ptrace::getevent(pid)
                    .ok()
                    .and_then(|message| i32::try_from(message).ok())
                {
                    self.process(Pid::from_raw(child)).parentpid = pid.as_raw();
                    if let Ok(mut live) = self.live.lock() {
                        live.insert(child);
                    }
                }
            }
            libc::PTRACE_EVENT_EXEC => self.read_proc(pid),
            _ => {}
        }
    }

    /// Returns the record for a task, creating it on first sight.
    fn process(&mut self, pid: Pid) -> &mut ProcessInfo {
        let raw = pid.as_raw();
        self.processes.entry(raw).or_insert_with(|| ProcessInfo {
            processid: raw,
            ..ProcessInfo::default()
        })
    }

    /// Reads `/proc` details for a task after exec.
    fn read_proc(&mut self, pid: Pid) {
        let base = format!("/proc/{}", pid.as_raw());
        let hashes = self.hashes;
        let status = fs::read_to_string(format!("{base}/status")).ok();
        let comm = fs::read(format!("{base}/comm")).ok();
        let cmdline = fs::read(format!("{base}/cmdline")).ok();
        let environ = fs::read(format!("{base}/environ"))
            .ok()
            .map(|block| self.filter.apply_environ_block(&block));
        let exedigest = DigestSet::from_file(format!("{base}/exe").as_ref(), hashes).ok();

        let info = self.process(pid);
        if let Some(status) = status {
            if let Some(ppid) = status_field(&status, "PPid").and_then(|value| value.parse().ok()) {
                info.parentpid = ppid;
            }
            info.specbypassisvuln =
                status_field(&status, "Speculation_Store_Bypass").is_some_and(|value| {
                    value.contains("vulnerable") && !value.contains("not vulnerable")
                });
        }
        if let Some(comm) = comm {
            info.comm = clean(&comm);
        }
        if let Some(cmdline) = cmdline {
            info.cmdline = clean(&cmdline);
        }
        if let Some(environ) = environ {
            info.environ = environ;
        }
        if let Some(exedigest) = exedigest {
            info.exedigest = exedigest;
        }
        if !info.program.is_empty()
            && let Ok(digest) = DigestSet::from_file(info.program.as_ref(), hashes)
        {
            info.programdigest = digest;
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Sends `SIGKILL` to every task that has not exited yet.
fn kill_live(live: &Mutex<BTreeSet<i32>>) {
    if let Ok(live) = live.lock() {
        for pid in live.iter() {
            let _ = kill(Pid::from_raw(*pid), Signal::SIGKILL);
        }
    }
}

/// Resumes a task until its next syscall stop; vanished tasks are ignored.
fn resume(pid: Pid, signal: Option<Signal>) {
    let _ = ptrace::syscall(pid, signal);
}

/// Returns the syscall number and argument registers.
#[cfg(target_arch = "x86_64")]
const fn syscall_registers(regs: &libc::user_regs_struct) -> (u64, [u64; 6]) {
    (regs.orig_rax, [regs.rdi, regs.rsi, regs.rdx, regs.r10, regs.r8, regs.r9])
}

/// Returns the syscall number and argument registers.
#[cfg(target_arch = "aarch64")]
const fn syscall_registers(regs: &libc::user_regs_struct) -> (u64, [u64; 6]) {
    (regs.regs[8], [
        regs.regs[0],
        regs.regs[1],
        regs.regs[2],
        regs.regs[3],
        regs.regs[4],
        regs.regs[5],
    ])
}

/// Reads a NUL-terminated string from a task, page by page.
fn read_string(pid: Pid, address: u64) -> Option<String> {
    let mut base = usize::try_from(address).ok()?;
    if base == 0 {
        return None;
    }
    let mut bytes = Vec::new();
    while bytes.len() < MAX_PATH_LEN {
        let len = (PAGE_SIZE - base % PAGE_SIZE).min(MAX_PATH_LEN - bytes.len());
        let mut chunk = vec![0_u8; len];
        let read = process_vm_readv(pid, &mut [IoSliceMut::new(&mut chunk)], &[RemoteIoVec {
            base,
            len,
        }])
        .ok()?;
        if read == 0 {
            break;
        }
        if let Some(end) = chunk[.. read].iter().position(|byte| *byte == 0) {
            bytes.extend_from_slice(&chunk[.. end]);
            return Some(String::from_utf8_lossy(&bytes).into_owned());
        }
        bytes.extend_from_slice(&chunk[.. read]);
        base = base.checked_add(read)?;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Replaces NUL separators with spaces and trims.
fn clean(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).replace('\0', " ").trim().to_string()
}

/// Returns the value of a `Key:\tvalue` line in `/proc/<pid>/status`.
fn status_field<'a>(status: &'a str, key: &str) -> Option<&'a str> {
    status.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        (name == key).then_some(value.trim())
    })
}

/// Wraps a ptrace failure.
fn trace_error(operation: &str, err: Errno) -> AttestationError {
    AttestationError::Failed(format!("{operation} failed: {err}"))
}
