//! Tracing and logging setup shared by the binaries.

pub mod tracing;

pub use crate::tracing::{LogFormat, UnknownLogFormat};

/// Initialize JSON logging for the process.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    crate::tracing::init(LogFormat::Json);
}

/// Initialize logging with an explicit output format.
pub fn init_with(format: LogFormat) {
    crate::tracing::init(format);
}
