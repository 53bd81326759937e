use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::attempts::attempt_response;
use crate::api::errors::ApiError;
use crate::api::guards::{require_student, CurrentUser};
use crate::core::state::AppState;
use crate::db::types::SubmitTrigger;
use crate::schemas::attempt::{AttemptResponse, StartAttemptResponse, SubmitResponse};
use crate::schemas::exam::QuestionResponse;

pub(in crate::api::exams) async fn open_attempt(
    Path(exam_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    require_student(&user)?;

    let attempt = state.submissions().open(&exam_id, &user.id).await?;
    Ok(Json(attempt_response(attempt, state.clock().now())))
}

pub(in crate::api::exams) async fn start_attempt(
    Path(exam_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<StartAttemptResponse>), ApiError> {
    require_student(&user)?;

    let started = state.submissions().start(&exam_id, &user.id).await?;
    let status = started.attempt.status;
    let response = StartAttemptResponse {
        attempt: AttemptResponse::from_db(
            started.attempt,
            status,
            started.remaining_seconds,
            started.deadline,
        ),
        exam_title: started.exam.title,
        questions: started
            .questions
            .into_iter()
            .map(|question| QuestionResponse::from_db(question, false))
            .collect(),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

pub(in crate::api::exams) async fn submit_attempt(
    Path(exam_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmitResponse>, ApiError> {
    require_student(&user)?;

    let outcome =
        state.submissions().submit_for_student(&exam_id, &user.id, SubmitTrigger::User).await?;

    Ok(Json(SubmitResponse {
        attempt: attempt_response(outcome.attempt, state.clock().now()),
        transitioned: outcome.transitioned,
    }))
}
