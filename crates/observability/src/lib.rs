//! Shared tracing setup for hosts, tests and benches.

/// Initialize process-wide logging with the default settings.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&tracing::LogConfig::default());
}

/// Subscriber configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogConfig, LogFormat};
