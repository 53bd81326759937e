use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    AttemptStatus, ExamStatus, MarkingJobStatus, QuestionKind, SubmitTrigger, ViolationType,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) status: ExamStatus,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) duration_minutes: i32,
    pub(crate) created_by: String,
    pub(crate) published_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Exam {
    /// The scheduling window is inclusive on both ends.
    pub(crate) fn window_contains(&self, now: PrimitiveDateTime) -> bool {
        self.start_time <= now && now <= self.end_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) order_index: i32,
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: String,
    pub(crate) options: Json<Vec<String>>,
    pub(crate) correct_answer: Option<String>,
    pub(crate) points: f64,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamAttempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    /// Snapshot of the exam duration taken when the attempt starts.
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) violation_count: i32,
    pub(crate) submit_trigger: Option<SubmitTrigger>,
    pub(crate) total_score: Option<f64>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    /// Staff review flag. Independent of the violation counter.
    pub(crate) flagged: bool,
    pub(crate) flag_reason: Option<String>,
    pub(crate) flagged_by: Option<String>,
    pub(crate) flagged_at: Option<PrimitiveDateTime>,
    pub(crate) deleted_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub(crate) struct Answer {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) response_value: Json<serde_json::Value>,
    pub(crate) auto_saved_at: PrimitiveDateTime,
    pub(crate) points_awarded: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ViolationEvent {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) violation_type: ViolationType,
    pub(crate) details: Json<serde_json::Value>,
    pub(crate) occurred_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct MarkingJob {
    pub(crate) attempt_id: String,
    pub(crate) status: MarkingJobStatus,
    pub(crate) retry_count: i32,
    pub(crate) last_error: Option<String>,
    pub(crate) enqueued_at: PrimitiveDateTime,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}
