// SPDX-License-Identifier: MIT

//! Utility helpers for running the tests.

use tracing_subscriber::EnvFilter;

/// Send log output to the test harness.  Filter with `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
