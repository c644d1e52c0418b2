// Not every integration test binary in this directory uses every helper.
#![allow(dead_code)]

use flexi_logger::{opt_format, Logger, LoggerHandle};

/// Starts a logger that prints `info` and above, the way the teacher's own
/// integration tests initialise logging before running (see
/// `hdbconnect_async/tests/test_utils.rs::init_logger`). Swallows the
/// "already initialised" error so every test file in this directory can
/// call it unconditionally without coordinating who goes first.
pub fn init_logger() -> Option<LoggerHandle> {
    Logger::try_with_env_or_str("info")
        .ok()?
        .format(opt_format)
        .start()
        .ok()
}
