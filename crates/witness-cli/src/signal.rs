// crates/witness-cli/src/signal.rs
// ============================================================================
// Module: Interrupt Handling
// Description: Ctrl-C listener that cancels the run token.
// Purpose: Stop attestors cooperatively and never sign an interrupted run.
// Dependencies: tokio, tokio-util
// ============================================================================

//! ## Overview
//! The pipeline is synchronous, so the listener lives on its own thread with
//! a current-thread tokio runtime. The first interrupt cancels the token;
//! attestors observe it at their next poll.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::thread;

use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;
use crate::error::CliResult;
use crate::t;

/// Spawns the interrupt listener.
///
/// # Errors
///
/// Returns [`CliError::Message`] when the runtime or thread cannot start.
pub fn install_interrupt_handler(cancel: CancellationToken) -> CliResult<()> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| CliError::new(t!("signal.install_failed", error = error)))?;
    thread::Builder::new()
        .name("witness-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if result.is_ok() {
                            cancel.cancel();
                        }
                    }
                    () = cancel.cancelled() => {}
                }
            });
        })
        .map_err(|error| CliError::new(t!("signal.install_failed", error = error)))?;
    Ok(())
}
