use sqlx::{PgExecutor, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::ExamAttempt;
use crate::db::types::{AttemptStatus, SubmitTrigger};

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, status, started_at, submitted_at, duration_minutes, \
    violation_count, submit_trigger, total_score, graded_at, flagged, flag_reason, flagged_by, \
    flagged_at, deleted_at, created_at, updated_at";

/// SQL expression for the moment the attempt runs out of time.
pub(crate) const DEADLINE_SQL: &str = "started_at + make_interval(mins => duration_minutes)";

pub(crate) async fn find_by_id(
    executor: impl PgExecutor<'_>,
    id: &str,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_exam_and_student(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts
         WHERE exam_id = $1 AND student_id = $2 AND deleted_at IS NULL"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await
}

/// Inserts a NOT_STARTED attempt unless a live one already exists for the pair.
pub(crate) async fn create_if_absent(
    pool: &PgPool,
    id: &str,
    exam_id: &str,
    student_id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO exam_attempts (
            id, exam_id, student_id, status, violation_count, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,0,$5,$5)
        ON CONFLICT DO NOTHING",
    )
    .bind(id)
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptStatus::NotStarted)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// NOT_STARTED -> IN_PROGRESS. `None` means another request started it first.
pub(crate) async fn begin(
    pool: &PgPool,
    id: &str,
    started_at: PrimitiveDateTime,
    duration_minutes: i32,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "UPDATE exam_attempts
         SET status = $1, started_at = $2, duration_minutes = $3, updated_at = $2
         WHERE id = $4 AND status = $5 AND deleted_at IS NULL
         RETURNING {COLUMNS}"
    ))
    .bind(AttemptStatus::InProgress)
    .bind(started_at)
    .bind(duration_minutes)
    .bind(id)
    .bind(AttemptStatus::NotStarted)
    .fetch_optional(pool)
    .await
}

/// IN_PROGRESS -> terminal. Exactly one concurrent caller gets the row back.
pub(crate) async fn finalize(
    pool: &PgPool,
    id: &str,
    status: AttemptStatus,
    trigger: SubmitTrigger,
    now: PrimitiveDateTime,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "UPDATE exam_attempts
         SET status = $1, submit_trigger = $2, submitted_at = $3, updated_at = $3
         WHERE id = $4 AND status = $5 AND deleted_at IS NULL
         RETURNING {COLUMNS}"
    ))
    .bind(status)
    .bind(trigger)
    .bind(now)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(pool)
    .await
}

/// Live attempts of one exam, optionally narrowed to a stored status, oldest start first.
pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    status: Option<AttemptStatus>,
) -> Result<Vec<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts
         WHERE exam_id = $1 AND deleted_at IS NULL AND ($2::attemptstatus IS NULL OR status = $2)
         ORDER BY started_at NULLS LAST, created_at, id"
    ))
    .bind(exam_id)
    .bind(status)
    .fetch_all(pool)
    .await
}

pub(crate) async fn set_flag(
    executor: impl PgExecutor<'_>,
    id: &str,
    flagged: bool,
    reason: &str,
    flagged_by: &str,
    now: PrimitiveDateTime,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "UPDATE exam_attempts
         SET flagged = $1, flag_reason = $2, flagged_by = $3, flagged_at = $4, updated_at = $4
         WHERE id = $5 AND deleted_at IS NULL
         RETURNING {COLUMNS}"
    ))
    .bind(flagged)
    .bind(reason)
    .bind(flagged_by)
    .bind(now)
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_overdue(
    pool: &PgPool,
    now: PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts
         WHERE status = $1 AND deleted_at IS NULL AND {DEADLINE_SQL} <= $2
         ORDER BY started_at
         LIMIT $3"
    ))
    .bind(AttemptStatus::InProgress)
    .bind(now)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_over_violation_threshold(
    pool: &PgPool,
    threshold: i32,
    limit: i64,
) -> Result<Vec<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts
         WHERE status = $1 AND deleted_at IS NULL AND violation_count >= $2
         ORDER BY updated_at
         LIMIT $3"
    ))
    .bind(AttemptStatus::InProgress)
    .bind(threshold)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn increment_violations(
    executor: impl PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "UPDATE exam_attempts
         SET violation_count = violation_count + 1, updated_at = $1
         WHERE id = $2 AND deleted_at IS NULL
         RETURNING {COLUMNS}"
    ))
    .bind(now)
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Finalized or already graded attempt -> GRADED with the recomputed total.
pub(crate) async fn mark_graded(
    pool: &PgPool,
    id: &str,
    total_score: f64,
    now: PrimitiveDateTime,
) -> Result<Option<ExamAttempt>, sqlx::Error> {
    sqlx::query_as::<_, ExamAttempt>(&format!(
        "UPDATE exam_attempts
         SET status = $1, total_score = $2, graded_at = $3, updated_at = $3
         WHERE id = $4 AND deleted_at IS NULL AND status IN ($5, $6, $7, $1)
         RETURNING {COLUMNS}"
    ))
    .bind(AttemptStatus::Graded)
    .bind(total_score)
    .bind(now)
    .bind(id)
    .bind(AttemptStatus::Submitted)
    .bind(AttemptStatus::AutoSubmitted)
    .bind(AttemptStatus::Expired)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn soft_delete(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_attempts SET deleted_at = $1, updated_at = $1
         WHERE id = $2 AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
