use serde::Serialize;

use crate::api::errors::ApiError;
use crate::db::types::QuestionKind;
use crate::schemas::attempt::{FlagRequest, SaveAnswerRequest, ViolationCreate};
use crate::schemas::exam::{ExamCreate, QuestionCreate};

pub(crate) const MAX_TITLE_LEN: usize = 255;
pub(crate) const MAX_DURATION_MINUTES: i32 = 24 * 60;
pub(crate) const MAX_QUESTIONS: usize = 500;
pub(crate) const MAX_VIOLATION_DETAILS_BYTES: usize = 4096;
pub(crate) const MAX_FLAG_REASON_LEN: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FieldError {
    pub(crate) field: String,
    pub(crate) message: String,
}

impl FieldError {
    pub(crate) fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

fn finish(errors: Vec<FieldError>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

pub(crate) fn validate_exam_create(payload: &ExamCreate) -> Result<(), ApiError> {
    let mut errors = Vec::new();

    let title = payload.title.trim();
    if title.is_empty() {
        errors.push(FieldError::new("title", "must not be empty"));
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.push(FieldError::new("title", format!("must be at most {MAX_TITLE_LEN} characters")));
    }

    if payload.end_time <= payload.start_time {
        errors.push(FieldError::new("end_time", "must be after start_time"));
    }

    if payload.duration_minutes <= 0 || payload.duration_minutes > MAX_DURATION_MINUTES {
        errors.push(FieldError::new(
            "duration_minutes",
            format!("must be between 1 and {MAX_DURATION_MINUTES}"),
        ));
    }

    if payload.questions.len() > MAX_QUESTIONS {
        errors.push(FieldError::new("questions", format!("at most {MAX_QUESTIONS} allowed")));
    }

    for (index, question) in payload.questions.iter().enumerate() {
        validate_question(index, question, &mut errors);
    }

    finish(errors)
}

fn validate_question(index: usize, question: &QuestionCreate, errors: &mut Vec<FieldError>) {
    let field = |name: &str| format!("questions[{index}].{name}");

    if question.prompt.trim().is_empty() {
        errors.push(FieldError::new(field("prompt"), "must not be empty"));
    }
    if !question.points.is_finite() || question.points <= 0.0 {
        errors.push(FieldError::new(field("points"), "must be positive"));
    }

    let correct = question.correct_answer.as_deref().map(str::trim);
    match question.kind {
        QuestionKind::SingleChoice => {
            if question.options.len() < 2 {
                errors.push(FieldError::new(field("options"), "at least two options required"));
            }
            match correct {
                Some(answer) if question.options.iter().any(|option| option.trim() == answer) => {}
                _ => errors.push(FieldError::new(
                    field("correct_answer"),
                    "must match one of the options",
                )),
            }
        }
        QuestionKind::TrueFalse => {
            if !matches!(correct.map(str::to_ascii_lowercase).as_deref(), Some("true" | "false")) {
                errors.push(FieldError::new(field("correct_answer"), "must be true or false"));
            }
        }
        QuestionKind::ShortText => {
            if correct.map_or(true, str::is_empty) {
                errors.push(FieldError::new(field("correct_answer"), "required for short_text"));
            }
        }
        QuestionKind::Essay => {
            if correct.is_some() {
                errors.push(FieldError::new(field("correct_answer"), "not allowed for essay"));
            }
        }
    }
}

pub(crate) fn validate_save_answer(
    payload: &SaveAnswerRequest,
    max_answer_bytes: usize,
) -> Result<(), ApiError> {
    let mut errors = Vec::new();

    if payload.question_id.trim().is_empty() {
        errors.push(FieldError::new("question_id", "must not be empty"));
    }

    let size = serde_json::to_vec(&payload.response_value).map(|bytes| bytes.len()).unwrap_or(0);
    if size > max_answer_bytes {
        errors.push(FieldError::new(
            "response_value",
            format!("must be at most {max_answer_bytes} bytes"),
        ));
    }

    finish(errors)
}

pub(crate) fn validate_violation(payload: &ViolationCreate) -> Result<(), ApiError> {
    let mut errors = Vec::new();

    if let Some(details) = &payload.details {
        if !details.is_object() && !details.is_null() {
            errors.push(FieldError::new("details", "must be an object"));
        }
        let size = serde_json::to_vec(details).map(|bytes| bytes.len()).unwrap_or(0);
        if size > MAX_VIOLATION_DETAILS_BYTES {
            errors.push(FieldError::new(
                "details",
                format!("must be at most {MAX_VIOLATION_DETAILS_BYTES} bytes"),
            ));
        }
    }

    finish(errors)
}

pub(crate) fn validate_flag(payload: &FlagRequest) -> Result<(), ApiError> {
    let mut errors = Vec::new();

    let reason = payload.reason.trim();
    if reason.is_empty() {
        errors.push(FieldError::new("reason", "must not be empty"));
    }
    if reason.chars().count() > MAX_FLAG_REASON_LEN {
        errors.push(FieldError::new(
            "reason",
            format!("must be at most {MAX_FLAG_REASON_LEN} characters"),
        ));
    }

    finish(errors)
}

pub(crate) fn validate_points(points: f64) -> Result<(), ApiError> {
    if points.is_finite() && points >= 0.0 {
        Ok(())
    } else {
        Err(ApiError::Validation(vec![FieldError::new("points", "must be a non-negative number")]))
    }
}
