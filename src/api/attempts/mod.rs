mod handlers;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use time::PrimitiveDateTime;

use crate::core::state::AppState;
use crate::db::models::ExamAttempt;
use crate::schemas::attempt::AttemptResponse;
use crate::services::timing;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(handlers::get_attempt).delete(handlers::delete_attempt))
        .route("/:attempt_id/answers", patch(handlers::save_answer))
        .route("/:attempt_id/submit", post(handlers::submit_attempt))
        .route(
            "/:attempt_id/violations",
            post(handlers::record_violation).get(handlers::violation_report),
        )
        .route("/:attempt_id/flag", post(handlers::flag_attempt))
        .route("/:attempt_id/answers/:question_id/grade", put(handlers::grade_answer))
}

/// Serializes an attempt with the status and countdown as of `now`.
pub(crate) fn attempt_response(attempt: ExamAttempt, now: PrimitiveDateTime) -> AttemptResponse {
    let status = timing::effective_status(&attempt, now);
    let remaining = timing::remaining_seconds(&attempt, now);
    let deadline = timing::deadline(&attempt);
    AttemptResponse::from_db(attempt, status, remaining, deadline)
}
