use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{ExamAttempt, ViolationEvent};
use crate::db::types::ViolationType;

use super::attempts;

pub(crate) const COLUMNS: &str = "id, attempt_id, violation_type, details, occurred_at";

pub(crate) struct CreateViolation<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) violation_type: ViolationType,
    pub(crate) details: &'a serde_json::Value,
    pub(crate) occurred_at: PrimitiveDateTime,
}

/// Appends the event and bumps the attempt counter in one transaction.
///
/// Replaying the same event id leaves the counter untouched. Returns `None` when the attempt
/// does not exist.
pub(crate) async fn record(
    pool: &PgPool,
    violation: CreateViolation<'_>,
) -> Result<Option<(ViolationEvent, ExamAttempt)>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO violation_events (id, attempt_id, violation_type, details, occurred_at)
         SELECT $1, a.id, $3, $4, $5
         FROM exam_attempts a
         WHERE a.id = $2 AND a.deleted_at IS NULL
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(violation.id)
    .bind(violation.attempt_id)
    .bind(violation.violation_type)
    .bind(Json(violation.details))
    .bind(violation.occurred_at)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    let attempt = if inserted {
        attempts::increment_violations(&mut *tx, violation.attempt_id, violation.occurred_at)
            .await?
    } else {
        attempts::find_by_id(&mut *tx, violation.attempt_id).await?
    };

    let event = sqlx::query_as::<_, ViolationEvent>(&format!(
        "SELECT {COLUMNS} FROM violation_events WHERE id = $1 AND attempt_id = $2"
    ))
    .bind(violation.id)
    .bind(violation.attempt_id)
    .fetch_optional(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(match (event, attempt) {
        (Some(event), Some(attempt)) => Some((event, attempt)),
        _ => None,
    })
}

/// Newest first.
pub(crate) async fn list_by_attempt(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<ViolationEvent>, sqlx::Error> {
    sqlx::query_as::<_, ViolationEvent>(&format!(
        "SELECT {COLUMNS} FROM violation_events
         WHERE attempt_id = $1
         ORDER BY occurred_at DESC, id DESC"
    ))
    .bind(attempt_id)
    .fetch_all(pool)
    .await
}

/// The newest `per_attempt` events of every live attempt of an exam, newest first per attempt.
pub(crate) async fn list_recent_by_exam(
    pool: &PgPool,
    exam_id: &str,
    per_attempt: i64,
) -> Result<Vec<ViolationEvent>, sqlx::Error> {
    sqlx::query_as::<_, ViolationEvent>(&format!(
        "SELECT {COLUMNS} FROM (
            SELECT v.id, v.attempt_id, v.violation_type, v.details, v.occurred_at,
                   ROW_NUMBER() OVER (
                       PARTITION BY v.attempt_id ORDER BY v.occurred_at DESC, v.id DESC
                   ) AS position
            FROM violation_events v
            JOIN exam_attempts a ON a.id = v.attempt_id
            WHERE a.exam_id = $1 AND a.deleted_at IS NULL
         ) ranked
         WHERE position <= $2
         ORDER BY attempt_id, occurred_at DESC, id DESC"
    ))
    .bind(exam_id)
    .bind(per_attempt.max(1))
    .fetch_all(pool)
    .await
}

pub(crate) struct FlagAttempt<'a> {
    pub(crate) event_id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) flagged: bool,
    pub(crate) reason: &'a str,
    pub(crate) flagged_by: &'a str,
    pub(crate) details: &'a serde_json::Value,
    pub(crate) now: PrimitiveDateTime,
}

/// Sets the review flag and logs it as an `other` event without touching the violation counter.
pub(crate) async fn flag(
    pool: &PgPool,
    flag: FlagAttempt<'_>,
) -> Result<Option<(ViolationEvent, ExamAttempt)>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let Some(attempt) = attempts::set_flag(
        &mut *tx,
        flag.attempt_id,
        flag.flagged,
        flag.reason,
        flag.flagged_by,
        flag.now,
    )
    .await?
    else {
        return Ok(None);
    };

    let event = sqlx::query_as::<_, ViolationEvent>(&format!(
        "INSERT INTO violation_events (id, attempt_id, violation_type, details, occurred_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {COLUMNS}"
    ))
    .bind(flag.event_id)
    .bind(flag.attempt_id)
    .bind(ViolationType::Other)
    .bind(Json(flag.details))
    .bind(flag.now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some((event, attempt)))
}
