use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::{Answer, ExamAttempt, ViolationEvent};
use crate::db::types::{AttemptStatus, SubmitTrigger, ViolationType};
use crate::schemas::exam::QuestionResponse;

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    /// Status as of the request; an overdue IN_PROGRESS attempt reads as `expired`.
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: Option<String>,
    pub(crate) submitted_at: Option<String>,
    pub(crate) deadline: Option<String>,
    pub(crate) remaining_seconds: i64,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) violation_count: i32,
    pub(crate) submit_trigger: Option<SubmitTrigger>,
    pub(crate) total_score: Option<f64>,
    pub(crate) graded_at: Option<String>,
    pub(crate) flagged: bool,
}

impl AttemptResponse {
    pub(crate) fn from_db(
        attempt: ExamAttempt,
        status: AttemptStatus,
        remaining_seconds: i64,
        deadline: Option<time::PrimitiveDateTime>,
    ) -> Self {
        Self {
            id: attempt.id,
            exam_id: attempt.exam_id,
            student_id: attempt.student_id,
            status,
            started_at: attempt.started_at.map(format_primitive),
            submitted_at: attempt.submitted_at.map(format_primitive),
            deadline: deadline.map(format_primitive),
            remaining_seconds,
            duration_minutes: attempt.duration_minutes,
            violation_count: attempt.violation_count,
            submit_trigger: attempt.submit_trigger,
            total_score: attempt.total_score,
            graded_at: attempt.graded_at.map(format_primitive),
            flagged: attempt.flagged,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) response_value: serde_json::Value,
    pub(crate) auto_saved_at: String,
    pub(crate) points_awarded: Option<f64>,
}

impl AnswerResponse {
    pub(crate) fn from_db(answer: Answer) -> Self {
        Self {
            id: answer.id,
            question_id: answer.question_id,
            response_value: answer.response_value.0,
            auto_saved_at: format_primitive(answer.auto_saved_at),
            points_awarded: answer.points_awarded,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StartAttemptResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) exam_title: String,
    pub(crate) questions: Vec<QuestionResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptDetailResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) answers: Vec<AnswerResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    pub(crate) attempt: AttemptResponse,
    /// `false` when the attempt was already terminal before this call.
    pub(crate) transitioned: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveAnswerRequest {
    #[serde(alias = "questionId")]
    pub(crate) question_id: String,
    #[serde(default, alias = "value")]
    pub(crate) response_value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ViolationCreate {
    #[serde(rename = "type", alias = "violation_type")]
    pub(crate) violation_type: ViolationType,
    #[serde(default)]
    pub(crate) details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ViolationEventResponse {
    pub(crate) id: String,
    #[serde(rename = "type")]
    pub(crate) violation_type: ViolationType,
    pub(crate) details: serde_json::Value,
    pub(crate) occurred_at: String,
}

impl ViolationEventResponse {
    pub(crate) fn from_db(event: ViolationEvent) -> Self {
        Self {
            id: event.id,
            violation_type: event.violation_type,
            details: event.details.0,
            occurred_at: format_primitive(event.occurred_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ViolationRecordedResponse {
    pub(crate) event: ViolationEventResponse,
    pub(crate) violation_count: i32,
    pub(crate) threshold_exceeded: bool,
    pub(crate) forced_submission: bool,
    pub(crate) attempt_status: AttemptStatus,
}

#[derive(Debug, Serialize)]
pub(crate) struct ViolationReportResponse {
    pub(crate) attempt_id: String,
    pub(crate) student_id: String,
    pub(crate) violation_count: i32,
    pub(crate) threshold: u32,
    pub(crate) threshold_reached: bool,
    pub(crate) counts: BTreeMap<&'static str, usize>,
    pub(crate) events: Vec<ViolationEventResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GradeRequest {
    pub(crate) points: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct GradeResponse {
    pub(crate) answer: AnswerResponse,
    pub(crate) attempt_status: AttemptStatus,
    pub(crate) total_score: Option<f64>,
    pub(crate) pending_questions: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MonitorQuery {
    #[serde(default)]
    pub(crate) status: Option<AttemptStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MonitoredAttemptResponse {
    #[serde(flatten)]
    pub(crate) attempt: AttemptResponse,
    pub(crate) flag_reason: Option<String>,
    pub(crate) flagged_by: Option<String>,
    pub(crate) flagged_at: Option<String>,
    pub(crate) recent_violations: Vec<ViolationEventResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FlagRequest {
    pub(crate) reason: String,
    #[serde(default = "flag_default")]
    pub(crate) flagged: bool,
}

fn flag_default() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub(crate) struct FlagResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) flag_reason: Option<String>,
    pub(crate) flagged_by: Option<String>,
    pub(crate) event: ViolationEventResponse,
    pub(crate) message: &'static str,
}
