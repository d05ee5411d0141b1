// crates/witness-cli/src/logging.rs
// ============================================================================
// Module: CLI Log Sink Setup
// Description: Builds the structured log sink from flags and config.
// Purpose: Route JSON-lines events to stderr or a file at a minimum level.
// Dependencies: witness-core
// ============================================================================


//! Route JSON-lines events to stderr or a file at a minimum level.
// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;

use witness_core::LogLevel;
use witness_core::SharedLogSink;
use witness_core::logging::FileLogSink;
use witness_core::logging::LevelFilterSink;
use witness_core::logging::StderrLogSink;

use crate::error::CliError;
use crate::error::CliResult;
use crate::t;

/// Level used when neither flag nor config sets one.
pub const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

/// Builds the log sink.
///
/// # Errors
///
/// Returns [`CliError::Message`] for unknown levels or unopenable files.
pub fn build_log_sink(level: Option<&str>, file: Option<&Path>) -> CliResult<SharedLogSink> {
    let min_level = match level {
        Some(level) => level
            .parse::<LogLevel>()
            .map_err(|error| CliError::new(t!("log.level_invalid", error = error)))?,
        None => DEFAULT_LOG_LEVEL,
    };
    let inner: SharedLogSink = match file {
        Some(path) => Arc::new(FileLogSink::new(path).map_err(|error| {
            CliError::new(t!("log.open_failed", path = path.display(), error = error))
        })?),
        None => Arc::new(StderrLogSink),
    };
    Ok(Arc::new(LevelFilterSink::new(min_level, inner)))
}
