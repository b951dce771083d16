//! Tracing/logging setup shared by ledger binaries.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize process-wide tracing with JSON output at `info`.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    crate::tracing::init(LogFormat::Json, "info");
}

/// Initialize process-wide tracing with an explicit format and default level.
///
/// `RUST_LOG`, when set, takes precedence over `default_level`.
pub fn init_with(format: LogFormat, default_level: &str) {
    crate::tracing::init(format, default_level);
}
