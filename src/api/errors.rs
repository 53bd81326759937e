use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use time::PrimitiveDateTime;

use crate::api::validation::FieldError;
use crate::core::config::Environment;
use crate::core::state::AppState;
use crate::core::time::format_primitive;
use crate::services::errors::AttemptError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    code: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempt_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
}

impl ErrorResponse {
    fn new(status: StatusCode, code: &'static str, detail: String) -> Self {
        Self {
            status: status.as_u16(),
            code,
            detail,
            errors: None,
            attempt_id: None,
            started_at: None,
        }
    }
}

/// Generic message of a 500 response, kept so production responses can hide the detail.
#[derive(Debug, Clone)]
struct InternalContext(String);

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest { code: &'static str, detail: String },
    Validation(Vec<FieldError>),
    NotFound(&'static str),
    Conflict { code: &'static str, detail: String },
    AlreadyStarted { attempt_id: String, started_at: Option<PrimitiveDateTime> },
    Unprocessable { code: &'static str, detail: String },
    TooManyRequests(&'static str),
    Internal { context: String, detail: String },
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal { context: context.to_string(), detail: err.to_string() }
    }

    fn conflict(code: &'static str, err: &AttemptError) -> Self {
        Self::Conflict { code, detail: err.to_string() }
    }
}

impl From<AttemptError> for ApiError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::ExamNotFound => ApiError::NotFound("Exam not found"),
            AttemptError::AttemptNotFound => ApiError::NotFound("Attempt not found"),
            AttemptError::QuestionNotFound => ApiError::NotFound("Question not found"),
            AttemptError::ExamNotActive => {
                ApiError::BadRequest { code: "EXAM_NOT_ACTIVE", detail: err.to_string() }
            }
            AttemptError::AlreadyStarted { attempt_id, started_at } => {
                ApiError::AlreadyStarted { attempt_id, started_at }
            }
            AttemptError::NotStarted => ApiError::conflict("ATTEMPT_NOT_STARTED", &err),
            AttemptError::AttemptExpired => {
                ApiError::Unprocessable { code: "ATTEMPT_EXPIRED", detail: err.to_string() }
            }
            AttemptError::AttemptNotInProgress => {
                ApiError::conflict("ATTEMPT_NOT_IN_PROGRESS", &err)
            }
            AttemptError::DeadlineNotReached => ApiError::conflict("DEADLINE_NOT_REACHED", &err),
            AttemptError::AttemptNotFinalized => {
                ApiError::conflict("ATTEMPT_NOT_FINALIZED", &err)
            }
            AttemptError::ExamNotPublishable => ApiError::conflict("EXAM_NOT_PUBLISHABLE", &err),
            AttemptError::InvalidPoints { .. } => {
                ApiError::Validation(vec![FieldError::new("points", err.to_string())])
            }
            AttemptError::Persistence(source) => {
                ApiError::internal(source, "Failed to persist attempt state")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let status = StatusCode::UNAUTHORIZED;
                let mut response = (
                    status,
                    Json(ErrorResponse::new(status, "UNAUTHORIZED", message.to_string())),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Forbidden(message) => {
                let status = StatusCode::FORBIDDEN;
                (status, Json(ErrorResponse::new(status, "FORBIDDEN", message.to_string())))
                    .into_response()
            }
            ApiError::BadRequest { code, detail } => {
                let status = StatusCode::BAD_REQUEST;
                (status, Json(ErrorResponse::new(status, code, detail))).into_response()
            }
            ApiError::Validation(errors) => {
                let status = StatusCode::BAD_REQUEST;
                let mut body =
                    ErrorResponse::new(status, "VALIDATION_FAILED", "Validation failed".to_string());
                body.errors = Some(errors);
                (status, Json(body)).into_response()
            }
            ApiError::NotFound(message) => {
                let status = StatusCode::NOT_FOUND;
                (status, Json(ErrorResponse::new(status, "NOT_FOUND", message.to_string())))
                    .into_response()
            }
            ApiError::Conflict { code, detail } => {
                let status = StatusCode::CONFLICT;
                (status, Json(ErrorResponse::new(status, code, detail))).into_response()
            }
            ApiError::AlreadyStarted { attempt_id, started_at } => {
                let status = StatusCode::CONFLICT;
                let mut body = ErrorResponse::new(
                    status,
                    "ALREADY_STARTED",
                    "Attempt already started".to_string(),
                );
                body.attempt_id = Some(attempt_id);
                body.started_at = started_at.map(format_primitive);
                (status, Json(body)).into_response()
            }
            ApiError::Unprocessable { code, detail } => {
                let status = StatusCode::UNPROCESSABLE_ENTITY;
                (status, Json(ErrorResponse::new(status, code, detail))).into_response()
            }
            ApiError::TooManyRequests(message) => {
                let status = StatusCode::TOO_MANY_REQUESTS;
                (status, Json(ErrorResponse::new(status, "RATE_LIMITED", message.to_string())))
                    .into_response()
            }
            ApiError::Internal { context, detail } => {
                tracing::error!(error = %detail, "Internal server error");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                let mut response = (
                    status,
                    Json(ErrorResponse::new(status, "INTERNAL_ERROR", format!("{context}: {detail}"))),
                )
                    .into_response();
                response.extensions_mut().insert(InternalContext(context));
                response
            }
        }
    }
}

/// Outside development and test, 500 responses carry only the generic context message.
pub(crate) async fn redact_internal_errors(
    State(state): State<AppState>,
    response: Response,
) -> Response {
    if matches!(
        state.settings().runtime().environment,
        Environment::Development | Environment::Test
    ) {
        return response;
    }

    let Some(InternalContext(context)) = response.extensions().get::<InternalContext>().cloned()
    else {
        return response;
    };

    let status = StatusCode::INTERNAL_SERVER_ERROR;
    (status, Json(ErrorResponse::new(status, "INTERNAL_ERROR", context))).into_response()
}
