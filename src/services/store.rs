use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{Answer, Exam, ExamAttempt, Question, ViolationEvent};
use crate::db::types::{AttemptStatus, QuestionKind, SubmitTrigger, ViolationType};
use crate::repositories;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub(crate) struct NewExam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) created_by: String,
    pub(crate) questions: Vec<NewQuestion>,
}

pub(crate) struct NewQuestion {
    pub(crate) id: String,
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: String,
    pub(crate) options: Vec<String>,
    pub(crate) correct_answer: Option<String>,
    pub(crate) points: f64,
}

pub(crate) struct NewViolation {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) violation_type: ViolationType,
    pub(crate) details: serde_json::Value,
    pub(crate) occurred_at: PrimitiveDateTime,
}

pub(crate) struct NewFlag {
    pub(crate) event_id: String,
    pub(crate) attempt_id: String,
    pub(crate) flagged: bool,
    pub(crate) reason: String,
    pub(crate) flagged_by: String,
    pub(crate) details: serde_json::Value,
    pub(crate) now: PrimitiveDateTime,
}

#[async_trait]
pub(crate) trait ExamCatalog: Send + Sync {
    async fn create_exam(&self, exam: NewExam, now: PrimitiveDateTime)
        -> Result<Exam, StoreError>;

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError>;

    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, StoreError>;

    async fn find_question(
        &self,
        exam_id: &str,
        question_id: &str,
    ) -> Result<Option<Question>, StoreError>;

    /// DRAFT -> PUBLISHED. `None` when the exam is missing or not a draft.
    async fn publish_exam(
        &self,
        exam_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<Option<Exam>, StoreError>;
}

/// Durable attempt state. Every state-changing method is a single conditional write so
/// concurrent callers race on the store, not in memory.
#[async_trait]
pub(crate) trait AttemptStore: Send + Sync {
    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<ExamAttempt>, StoreError>;

    async fn find_attempt_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<Option<ExamAttempt>, StoreError>;

    /// Returns the live attempt for the pair, creating a NOT_STARTED one if needed.
    async fn open_attempt(
        &self,
        attempt_id: &str,
        exam_id: &str,
        student_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<ExamAttempt, StoreError>;

    /// NOT_STARTED -> IN_PROGRESS. `None` when the attempt is no longer NOT_STARTED.
    async fn begin_attempt(
        &self,
        attempt_id: &str,
        started_at: PrimitiveDateTime,
        duration_minutes: i32,
    ) -> Result<Option<ExamAttempt>, StoreError>;

    /// Writes only while the attempt is IN_PROGRESS and `now` is before its deadline.
    async fn save_answer(
        &self,
        answer_id: &str,
        attempt_id: &str,
        question_id: &str,
        value: &serde_json::Value,
        now: PrimitiveDateTime,
    ) -> Result<Option<Answer>, StoreError>;

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<Answer>, StoreError>;

    async fn award_points(
        &self,
        answer_id: &str,
        attempt_id: &str,
        question_id: &str,
        points: f64,
        now: PrimitiveDateTime,
    ) -> Result<Answer, StoreError>;

    /// Appends the event and returns the attempt with its incremented counter.
    async fn record_violation(
        &self,
        violation: NewViolation,
    ) -> Result<Option<(ViolationEvent, ExamAttempt)>, StoreError>;

    async fn list_violations(&self, attempt_id: &str) -> Result<Vec<ViolationEvent>, StoreError>;

    /// Live attempts of the exam, narrowed to a stored status when given.
    async fn list_exam_attempts(
        &self,
        exam_id: &str,
        status: Option<AttemptStatus>,
    ) -> Result<Vec<ExamAttempt>, StoreError>;

    /// At most `per_attempt` newest events for each live attempt of the exam.
    async fn list_recent_violations(
        &self,
        exam_id: &str,
        per_attempt: i64,
    ) -> Result<Vec<ViolationEvent>, StoreError>;

    /// Sets or clears the review flag and appends the matching log event in one write.
    /// Leaves `violation_count` alone. `None` when the attempt does not exist.
    async fn flag_attempt(
        &self,
        flag: NewFlag,
    ) -> Result<Option<(ViolationEvent, ExamAttempt)>, StoreError>;

    /// IN_PROGRESS -> `status`. `None` when another caller finalized first.
    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        trigger: SubmitTrigger,
        now: PrimitiveDateTime,
    ) -> Result<Option<ExamAttempt>, StoreError>;

    async fn complete_grading(
        &self,
        attempt_id: &str,
        total_score: f64,
        now: PrimitiveDateTime,
    ) -> Result<Option<ExamAttempt>, StoreError>;

    async fn list_overdue_attempts(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<ExamAttempt>, StoreError>;

    async fn list_over_violation_threshold(
        &self,
        threshold: i32,
        limit: i64,
    ) -> Result<Vec<ExamAttempt>, StoreError>;

    async fn soft_delete_attempt(
        &self,
        attempt_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamCatalog for PgStore {
    async fn create_exam(
        &self,
        exam: NewExam,
        now: PrimitiveDateTime,
    ) -> Result<Exam, StoreError> {
        let mut tx = self.pool.begin().await?;

        let created = repositories::exams::create(
            &mut *tx,
            repositories::exams::CreateExam {
                id: &exam.id,
                title: &exam.title,
                description: exam.description.as_deref(),
                start_time: exam.start_time,
                end_time: exam.end_time,
                duration_minutes: exam.duration_minutes,
                created_by: &exam.created_by,
                now,
            },
        )
        .await?;

        for (index, question) in exam.questions.iter().enumerate() {
            repositories::exams::create_question(
                &mut *tx,
                repositories::exams::CreateQuestion {
                    id: &question.id,
                    exam_id: &exam.id,
                    order_index: index as i32,
                    kind: question.kind,
                    prompt: &question.prompt,
                    options: &question.options,
                    correct_answer: question.correct_answer.as_deref(),
                    points: question.points,
                    now,
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(repositories::exams::find_by_id(&self.pool, exam_id).await?)
    }

    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, StoreError> {
        Ok(repositories::exams::list_questions(&self.pool, exam_id).await?)
    }

    async fn find_question(
        &self,
        exam_id: &str,
        question_id: &str,
    ) -> Result<Option<Question>, StoreError> {
        Ok(repositories::exams::find_question(&self.pool, exam_id, question_id).await?)
    }

    async fn publish_exam(
        &self,
        exam_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<Option<Exam>, StoreError> {
        Ok(repositories::exams::publish(&self.pool, exam_id, now).await?)
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<ExamAttempt>, StoreError> {
        Ok(repositories::attempts::find_by_id(&self.pool, attempt_id).await?)
    }

    async fn find_attempt_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<Option<ExamAttempt>, StoreError> {
        Ok(repositories::attempts::find_by_exam_and_student(&self.pool, exam_id, student_id)
            .await?)
    }

    async fn open_attempt(
        &self,
        attempt_id: &str,
        exam_id: &str,
        student_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<ExamAttempt, StoreError> {
        repositories::attempts::create_if_absent(&self.pool, attempt_id, exam_id, student_id, now)
            .await?;

        repositories::attempts::find_by_exam_and_student(&self.pool, exam_id, student_id)
            .await?
            .ok_or_else(|| StoreError::Unavailable("attempt missing after insert".to_string()))
    }

    async fn begin_attempt(
        &self,
        attempt_id: &str,
        started_at: PrimitiveDateTime,
        duration_minutes: i32,
    ) -> Result<Option<ExamAttempt>, StoreError> {
        Ok(repositories::attempts::begin(&self.pool, attempt_id, started_at, duration_minutes)
            .await?)
    }

    async fn save_answer(
        &self,
        answer_id: &str,
        attempt_id: &str,
        question_id: &str,
        value: &serde_json::Value,
        now: PrimitiveDateTime,
    ) -> Result<Option<Answer>, StoreError> {
        Ok(repositories::answers::upsert_if_open(
            &self.pool,
            answer_id,
            attempt_id,
            question_id,
            value,
            now,
        )
        .await?)
    }

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<Answer>, StoreError> {
        Ok(repositories::answers::list_by_attempt(&self.pool, attempt_id).await?)
    }

    async fn award_points(
        &self,
        answer_id: &str,
        attempt_id: &str,
        question_id: &str,
        points: f64,
        now: PrimitiveDateTime,
    ) -> Result<Answer, StoreError> {
        Ok(repositories::answers::set_points(
            &self.pool,
            answer_id,
            attempt_id,
            question_id,
            points,
            now,
        )
        .await?)
    }

    async fn record_violation(
        &self,
        violation: NewViolation,
    ) -> Result<Option<(ViolationEvent, ExamAttempt)>, StoreError> {
        Ok(repositories::violations::record(
            &self.pool,
            repositories::violations::CreateViolation {
                id: &violation.id,
                attempt_id: &violation.attempt_id,
                violation_type: violation.violation_type,
                details: &violation.details,
                occurred_at: violation.occurred_at,
            },
        )
        .await?)
    }

    async fn list_violations(&self, attempt_id: &str) -> Result<Vec<ViolationEvent>, StoreError> {
        Ok(repositories::violations::list_by_attempt(&self.pool, attempt_id).await?)
    }

    async fn list_exam_attempts(
        &self,
        exam_id: &str,
        status: Option<AttemptStatus>,
    ) -> Result<Vec<ExamAttempt>, StoreError> {
        Ok(repositories::attempts::list_by_exam(&self.pool, exam_id, status).await?)
    }

    async fn list_recent_violations(
        &self,
        exam_id: &str,
        per_attempt: i64,
    ) -> Result<Vec<ViolationEvent>, StoreError> {
        Ok(repositories::violations::list_recent_by_exam(&self.pool, exam_id, per_attempt).await?)
    }

    async fn flag_attempt(
        &self,
        flag: NewFlag,
    ) -> Result<Option<(ViolationEvent, ExamAttempt)>, StoreError> {
        Ok(repositories::violations::flag(
            &self.pool,
            repositories::violations::FlagAttempt {
                event_id: &flag.event_id,
                attempt_id: &flag.attempt_id,
                flagged: flag.flagged,
                reason: &flag.reason,
                flagged_by: &flag.flagged_by,
                details: &flag.details,
                now: flag.now,
            },
        )
        .await?)
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        trigger: SubmitTrigger,
        now: PrimitiveDateTime,
    ) -> Result<Option<ExamAttempt>, StoreError> {
        Ok(repositories::attempts::finalize(&self.pool, attempt_id, status, trigger, now).await?)
    }

    async fn complete_grading(
        &self,
        attempt_id: &str,
        total_score: f64,
        now: PrimitiveDateTime,
    ) -> Result<Option<ExamAttempt>, StoreError> {
        Ok(repositories::attempts::mark_graded(&self.pool, attempt_id, total_score, now).await?)
    }

    async fn list_overdue_attempts(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<ExamAttempt>, StoreError> {
        Ok(repositories::attempts::list_overdue(&self.pool, now, limit).await?)
    }

    async fn list_over_violation_threshold(
        &self,
        threshold: i32,
        limit: i64,
    ) -> Result<Vec<ExamAttempt>, StoreError> {
        Ok(repositories::attempts::list_over_violation_threshold(&self.pool, threshold, limit)
            .await?)
    }

    async fn soft_delete_attempt(
        &self,
        attempt_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(repositories::attempts::soft_delete(&self.pool, attempt_id, now).await?)
    }
}
