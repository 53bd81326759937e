use anyhow::{Context, Result};

use crate::core::state::AppState;
use crate::db::models::MarkingJob;
use crate::db::types::MarkingJobStatus;
use crate::repositories;
use crate::services::errors::AttemptError;
use crate::services::grading::MarkingOutcome;

/// Claims one pending job and marks its attempt. Returns `false` when the queue was empty.
pub(crate) async fn process_next(state: &AppState) -> Result<bool> {
    let now = state.clock().now();
    let Some(job) = repositories::marking_jobs::claim_next(state.db(), now)
        .await
        .context("Failed to claim marking job")?
    else {
        return Ok(false);
    };

    process_job(state, &job).await?;
    Ok(true)
}

async fn process_job(state: &AppState, job: &MarkingJob) -> Result<()> {
    let attempt_id = job.attempt_id.as_str();

    match state.grader().auto_mark(attempt_id).await {
        Ok(outcome) => {
            let status = job_status(&outcome);
            match &outcome {
                MarkingOutcome::Graded(attempt) => tracing::info!(
                    attempt_id,
                    total_score = attempt.total_score.unwrap_or_default(),
                    "Marking job completed"
                ),
                MarkingOutcome::NeedsReview { pending } => {
                    tracing::info!(attempt_id, pending, "Marking job needs teacher review")
                }
                MarkingOutcome::Skipped(attempt_status) => tracing::warn!(
                    attempt_id,
                    status = attempt_status.as_str(),
                    "Marking job skipped for attempt that is not finalized"
                ),
            }

            repositories::marking_jobs::finish(state.db(), attempt_id, status, state.clock().now())
                .await
                .context("Failed to finish marking job")?;
            metrics::counter!("marking_jobs_completed_total", "status" => job_status_label(status))
                .increment(1);
        }
        Err(err) => {
            // A deleted attempt will never mark.
            let max_retries = if matches!(err, AttemptError::AttemptNotFound) {
                0
            } else {
                state.settings().worker().marking_max_retries
            };
            let status = repositories::marking_jobs::fail(
                state.db(),
                attempt_id,
                &err.to_string(),
                max_retries,
                state.clock().now(),
            )
            .await
            .context("Failed to record marking job failure")?;

            metrics::counter!("marking_jobs_failed_total").increment(1);
            tracing::error!(
                attempt_id,
                retry_count = job.retry_count,
                status = job_status_label(status),
                error = %err,
                "Marking job failed"
            );
        }
    }

    Ok(())
}

fn job_status(outcome: &MarkingOutcome) -> MarkingJobStatus {
    match outcome {
        MarkingOutcome::Graded(_) | MarkingOutcome::Skipped(_) => MarkingJobStatus::Completed,
        MarkingOutcome::NeedsReview { .. } => MarkingJobStatus::NeedsReview,
    }
}

fn job_status_label(status: MarkingJobStatus) -> &'static str {
    match status {
        MarkingJobStatus::Pending => "pending",
        MarkingJobStatus::Processing => "processing",
        MarkingJobStatus::Completed => "completed",
        MarkingJobStatus::NeedsReview => "needs_review",
        MarkingJobStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::types::{AttemptStatus, SubmitTrigger};
    use crate::test_support::{lifecycle, objective_exam_window, published_exam_window, question_id};

    #[tokio::test]
    async fn objective_attempt_completes_its_job() {
        let ctx = lifecycle(3).await;
        objective_exam_window(&ctx, "exam-1", 30).await;
        let attempt_id = ctx.submissions.start("exam-1", "student-1").await.expect("start").attempt.id;
        ctx.submissions
            .save_answer(&attempt_id, &question_id("exam-1", "choice"), &json!("Paris"))
            .await
            .expect("save");
        ctx.submissions.submit(&attempt_id, SubmitTrigger::User).await.expect("submit");

        let outcome = ctx.grader.auto_mark(&attempt_id).await.expect("auto mark");
        assert_eq!(job_status(&outcome), MarkingJobStatus::Completed);
        assert_eq!(ctx.store.attempt(&attempt_id).map(|a| a.status), Some(AttemptStatus::Graded));
    }

    #[tokio::test]
    async fn essay_attempt_waits_for_review() {
        let ctx = lifecycle(3).await;
        published_exam_window(&ctx, "exam-1", 30).await;
        let attempt_id = ctx.submissions.start("exam-1", "student-1").await.expect("start").attempt.id;
        ctx.submissions.submit(&attempt_id, SubmitTrigger::User).await.expect("submit");

        let outcome = ctx.grader.auto_mark(&attempt_id).await.expect("auto mark");
        assert_eq!(job_status(&outcome), MarkingJobStatus::NeedsReview);
        assert_eq!(ctx.store.attempt(&attempt_id).map(|a| a.status), Some(AttemptStatus::Submitted));
    }

    #[test]
    fn labels_match_database_names() {
        assert_eq!(job_status_label(MarkingJobStatus::NeedsReview), "needs_review");
        assert_eq!(
            serde_json::to_value(MarkingJobStatus::NeedsReview).expect("json"),
            json!(job_status_label(MarkingJobStatus::NeedsReview))
        );
    }
}
