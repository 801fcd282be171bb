//! Logging setup shared by every binary.

/// Initialize process-wide logging with defaults (JSON, `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init_with(&LogConfig::default());
}

/// Tracing subscriber configuration.
pub mod tracing;

pub use self::tracing::{LogConfig, LogFormat, ParseLogFormatError, init_with};
