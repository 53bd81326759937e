use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::MarkingJob;
use crate::db::types::{AttemptStatus, MarkingJobStatus};

pub(crate) const COLUMNS: &str =
    "attempt_id, status, retry_count, last_error, enqueued_at, started_at, completed_at";

/// Returns `false` when the attempt already has a job.
pub(crate) async fn enqueue(
    pool: &PgPool,
    attempt_id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO marking_jobs (attempt_id, status, retry_count, enqueued_at)
         VALUES ($1, $2, 0, $3)
         ON CONFLICT (attempt_id) DO NOTHING",
    )
    .bind(attempt_id)
    .bind(MarkingJobStatus::Pending)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Creates jobs for finalized attempts that never got one.
pub(crate) async fn enqueue_missing(
    pool: &PgPool,
    now: PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "INSERT INTO marking_jobs (attempt_id, status, retry_count, enqueued_at)
         SELECT a.id, $1, 0, $2
         FROM exam_attempts a
         LEFT JOIN marking_jobs j ON j.attempt_id = a.id
         WHERE j.attempt_id IS NULL
           AND a.deleted_at IS NULL
           AND a.status IN ($3, $4, $5)
         ORDER BY a.submitted_at
         LIMIT $6
         ON CONFLICT (attempt_id) DO NOTHING
         RETURNING attempt_id",
    )
    .bind(MarkingJobStatus::Pending)
    .bind(now)
    .bind(AttemptStatus::Submitted)
    .bind(AttemptStatus::AutoSubmitted)
    .bind(AttemptStatus::Expired)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn claim_next(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Option<MarkingJob>, sqlx::Error> {
    sqlx::query_as::<_, MarkingJob>(
        "WITH candidate AS (
            SELECT attempt_id
            FROM marking_jobs
            WHERE status = $1
            ORDER BY enqueued_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE marking_jobs
        SET status = $2, started_at = $3, last_error = NULL
        FROM candidate
        WHERE marking_jobs.attempt_id = candidate.attempt_id
        RETURNING marking_jobs.attempt_id, marking_jobs.status, marking_jobs.retry_count,
                  marking_jobs.last_error, marking_jobs.enqueued_at, marking_jobs.started_at,
                  marking_jobs.completed_at",
    )
    .bind(MarkingJobStatus::Pending)
    .bind(MarkingJobStatus::Processing)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn finish(
    pool: &PgPool,
    attempt_id: &str,
    status: MarkingJobStatus,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE marking_jobs SET status = $1, completed_at = $2, last_error = NULL
         WHERE attempt_id = $3",
    )
    .bind(status)
    .bind(now)
    .bind(attempt_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Puts the job back to pending until `max_retries` is exhausted, then marks it failed.
pub(crate) async fn fail(
    pool: &PgPool,
    attempt_id: &str,
    error: &str,
    max_retries: i32,
    now: PrimitiveDateTime,
) -> Result<MarkingJobStatus, sqlx::Error> {
    sqlx::query_scalar::<_, MarkingJobStatus>(
        "UPDATE marking_jobs
         SET retry_count = retry_count + 1,
             last_error = $1,
             status = CASE WHEN retry_count + 1 >= $2 THEN $3 ELSE $4 END,
             completed_at = CASE WHEN retry_count + 1 >= $2 THEN $5 ELSE NULL END,
             started_at = NULL
         WHERE attempt_id = $6
         RETURNING status",
    )
    .bind(error)
    .bind(max_retries)
    .bind(MarkingJobStatus::Failed)
    .bind(MarkingJobStatus::Pending)
    .bind(now)
    .bind(attempt_id)
    .fetch_one(pool)
    .await
}

/// Jobs left in processing by a crashed worker go back to pending.
pub(crate) async fn release_stale(
    pool: &PgPool,
    started_before: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE marking_jobs SET status = $1, started_at = NULL
         WHERE status = $2 AND started_at < $3",
    )
    .bind(MarkingJobStatus::Pending)
    .bind(MarkingJobStatus::Processing)
    .bind(started_before)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
