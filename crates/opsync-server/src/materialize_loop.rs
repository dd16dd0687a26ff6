//! Background materializer loop.
//!
//! Rolls the occurrence window forward on a fixed interval so clients
//! always see concrete rows for upcoming recurring work. The engine call
//! is idempotent, so overlapping or restarted runs are harmless.

use chrono::Utc;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use opsync_engine::materializer::materialize_all;
use opsync_store::ConnectionPool;

use crate::metrics::{MATERIALIZER_CREATED_TOTAL, MATERIALIZER_FAILURES_TOTAL};

/// Spawn the periodic materializer task. The first sweep runs
/// immediately; the task exits when `token` is cancelled.
pub fn spawn(
    pool: ConnectionPool,
    interval_secs: u64,
    window_days: u32,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            tokio::select! {
                () = token.cancelled() => {
                    info!("materializer loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    run_sweep(&pool, window_days).await;
                }
            }
        }
    })
}

async fn run_sweep(pool: &ConnectionPool, window_days: u32) {
    let pool = pool.clone();
    let result = tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| opsync_engine::EngineError::Store(e.into()))?;
        materialize_all(&conn, Utc::now().date_naive(), window_days)
    })
    .await;

    match result {
        Ok(Ok(report)) => {
            counter!(MATERIALIZER_CREATED_TOTAL).increment(u64::from(report.created));
            counter!(MATERIALIZER_FAILURES_TOTAL).increment(report.failures.len() as u64);
            if !report.failures.is_empty() {
                warn!(failures = report.failures.len(), "materializer sweep had failures");
            }
        }
        Ok(Err(err)) => warn!(error = %err, "materializer sweep failed"),
        Err(err) => warn!(error = %err, "materializer sweep panicked"),
    }
}
