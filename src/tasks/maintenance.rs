use anyhow::{Context, Result};
use time::Duration;

use crate::core::state::AppState;
use crate::repositories;

/// Marking jobs stuck in `processing` longer than this go back to `pending`.
const STALE_JOB_MINUTES: i64 = 15;

pub(crate) async fn sweep_attempts(state: &AppState) -> Result<()> {
    let threshold = state.settings().exam().violation_threshold;
    let batch = state.settings().worker().expiry_sweep_batch;

    let report = state
        .submissions()
        .sweep(threshold, batch)
        .await
        .context("Failed to sweep attempts")?;

    if report.expired > 0 || report.forced > 0 || report.requeued > 0 {
        tracing::info!(
            expired = report.expired,
            forced = report.forced,
            requeued = report.requeued,
            "Attempt sweep finished"
        );
    }

    Ok(())
}

pub(crate) async fn release_stale_marking_jobs(state: &AppState) -> Result<()> {
    let cutoff = state.clock().now() - Duration::minutes(STALE_JOB_MINUTES);
    let released = repositories::marking_jobs::release_stale(state.db(), cutoff)
        .await
        .context("Failed to release stale marking jobs")?;

    if released > 0 {
        tracing::warn!(released, "Released stale marking jobs");
    }

    Ok(())
}
