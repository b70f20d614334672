//! Process-wide tracing setup shared by binaries and integration tests.

/// Initialize tracing with the `info` default filter.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with_filter("info");
}

pub mod tracing;
