//! Metrics recorder wiring and the counter names used across the gateway.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::debug;

/// Install the process-global Prometheus recorder and return the handle
/// that `GET /metrics` renders from. Call once, at startup, before the
/// first counter is touched; a second install panics.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("metrics recorder already installed");
    debug!("prometheus recorder installed");
    handle
}

/// Render the current metric values in Prometheus text format.
#[must_use]
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Completions acknowledged per push (counter, label `outcome` =
/// `created` | `duplicate`).
pub const SYNC_PUSH_COMPLETIONS_TOTAL: &str = "sync_push_completions_total";
/// Item-level push rejections (counter, label `code`).
pub const SYNC_PUSH_ERRORS_TOTAL: &str = "sync_push_errors_total";
/// Pull requests served (counter).
pub const SYNC_PULL_REQUESTS_TOTAL: &str = "sync_pull_requests_total";
/// Occurrence rows created by materializer sweeps (counter).
pub const MATERIALIZER_CREATED_TOTAL: &str = "materializer_created_total";
/// Templates whose expansion failed in a sweep (counter).
pub const MATERIALIZER_FAILURES_TOTAL: &str = "materializer_failures_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // Local recorder, not the global install — tests share a process.
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            SYNC_PUSH_COMPLETIONS_TOTAL,
            SYNC_PUSH_ERRORS_TOTAL,
            SYNC_PULL_REQUESTS_TOTAL,
            MATERIALIZER_CREATED_TOTAL,
            MATERIALIZER_FAILURES_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
