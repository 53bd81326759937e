use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Answer;
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str =
    "id, attempt_id, question_id, response_value, auto_saved_at, points_awarded";

/// Upserts the answer only while the owning attempt is IN_PROGRESS and inside its deadline.
/// `None` means the write was rejected.
pub(crate) async fn upsert_if_open(
    pool: &PgPool,
    id: &str,
    attempt_id: &str,
    question_id: &str,
    value: &serde_json::Value,
    now: PrimitiveDateTime,
) -> Result<Option<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "INSERT INTO answers (id, attempt_id, question_id, response_value, auto_saved_at)
         SELECT $1, a.id, $3, $4, $5
         FROM exam_attempts a
         WHERE a.id = $2 AND a.status = $6 AND a.deleted_at IS NULL
           AND $5 < a.started_at + make_interval(mins => a.duration_minutes)
         ON CONFLICT (attempt_id, question_id)
         DO UPDATE SET response_value = EXCLUDED.response_value,
                       auto_saved_at = EXCLUDED.auto_saved_at
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(attempt_id)
    .bind(question_id)
    .bind(Json(value))
    .bind(now)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_attempt(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "SELECT {COLUMNS} FROM answers WHERE attempt_id = $1 ORDER BY question_id"
    ))
    .bind(attempt_id)
    .fetch_all(pool)
    .await
}

/// Records points for a question, creating an empty answer row for unanswered questions.
pub(crate) async fn set_points(
    pool: &PgPool,
    id: &str,
    attempt_id: &str,
    question_id: &str,
    points: f64,
    now: PrimitiveDateTime,
) -> Result<Answer, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "INSERT INTO answers (id, attempt_id, question_id, response_value, auto_saved_at, points_awarded)
         VALUES ($1, $2, $3, 'null'::jsonb, $4, $5)
         ON CONFLICT (attempt_id, question_id)
         DO UPDATE SET points_awarded = EXCLUDED.points_awarded
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(attempt_id)
    .bind(question_id)
    .bind(now)
    .bind(points)
    .fetch_one(pool)
    .await
}
