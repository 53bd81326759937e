use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::{Exam, Question};
use crate::db::types::{ExamStatus, QuestionKind};

pub(crate) const COLUMNS: &str = "\
    id, title, description, status, start_time, end_time, duration_minutes, \
    created_by, published_at, created_at, updated_at";

pub(crate) const QUESTION_COLUMNS: &str = "\
    id, exam_id, order_index, kind, prompt, options, correct_answer, points, created_at";

pub(crate) struct CreateExam<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) order_index: i32,
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: &'a str,
    pub(crate) options: &'a [String],
    pub(crate) correct_answer: Option<&'a str>,
    pub(crate) points: f64,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn create(
    executor: impl PgExecutor<'_>,
    exam: CreateExam<'_>,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, title, description, status, start_time, end_time, duration_minutes,
            created_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$9)
        RETURNING {COLUMNS}"
    ))
    .bind(exam.id)
    .bind(exam.title)
    .bind(exam.description)
    .bind(ExamStatus::Draft)
    .bind(exam.start_time)
    .bind(exam.end_time)
    .bind(exam.duration_minutes)
    .bind(exam.created_by)
    .bind(exam.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn create_question(
    executor: impl PgExecutor<'_>,
    question: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, exam_id, order_index, kind, prompt, options, correct_answer, points, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
        RETURNING {QUESTION_COLUMNS}"
    ))
    .bind(question.id)
    .bind(question.exam_id)
    .bind(question.order_index)
    .bind(question.kind)
    .bind(question.prompt)
    .bind(Json(question.options))
    .bind(question.correct_answer)
    .bind(question.points)
    .bind(question.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_questions(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY order_index, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_question(
    pool: &PgPool,
    exam_id: &str,
    question_id: &str,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE exam_id = $1 AND id = $2"
    ))
    .bind(exam_id)
    .bind(question_id)
    .fetch_optional(pool)
    .await
}

/// Moves a draft exam to published. Returns `None` when the exam is missing or not a draft.
pub(crate) async fn publish(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "UPDATE exams SET status = $1, published_at = $2, updated_at = $2
         WHERE id = $3 AND status = $4
         RETURNING {COLUMNS}"
    ))
    .bind(ExamStatus::Published)
    .bind(now)
    .bind(id)
    .bind(ExamStatus::Draft)
    .fetch_optional(pool)
    .await
}
