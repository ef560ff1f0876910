//! Process-wide tracing setup shared by the binaries.

/// Initialize structured JSON logging.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init();
}

pub mod tracing;
