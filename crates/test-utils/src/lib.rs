//! Fixtures shared by buildwarden's integration tests.

pub mod builders;
pub mod fake_connection;
pub mod fake_runner;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use buildwarden::logging::LOG_ENV_VAR;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Route `tracing` output through the test harness's capture.
///
/// Reads `BUILDWARDEN_LOG` like the binary does, e.g.
/// `BUILDWARDEN_LOG=buildwarden::retry=debug cargo test -- --nocapture`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

/// Wall-clock ceiling for tests that drive real child processes.
pub const PROCESS_TEST_BUDGET: Duration = Duration::from_secs(10);

/// Await `f`, failing the test if it outlives [`PROCESS_TEST_BUDGET`].
pub async fn within_budget<F: Future>(f: F) -> F::Output {
    match tokio::time::timeout(PROCESS_TEST_BUDGET, f).await {
        Ok(output) => output,
        Err(_) => panic!("test exceeded {PROCESS_TEST_BUDGET:?}"),
    }
}
