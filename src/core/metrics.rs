use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("attempts_started_total", "Attempts moved to in_progress");
    metrics::describe_counter!(
        "attempts_finalized_total",
        "Attempts moved into a terminal state, by status and trigger"
    );
    metrics::describe_counter!("violations_recorded_total", "Proctoring violations appended");
    metrics::describe_counter!(
        "forced_submissions_total",
        "Attempts auto-submitted after crossing the violation threshold"
    );
    metrics::describe_counter!(
        "marking_enqueue_failures_total",
        "Finalized attempts whose marking job could not be enqueued"
    );
    metrics::describe_counter!("expired_attempts_swept_total", "Attempts expired by the sweep");
    metrics::describe_counter!("marking_jobs_completed_total", "Marking jobs finished");
    metrics::describe_counter!("marking_jobs_failed_total", "Marking jobs that errored");
    metrics::describe_counter!("autosave_rate_limited_total", "Autosave requests over the rate limit");
    metrics::describe_counter!("attempts_flagged_total", "Staff review flags set or cleared");
}
