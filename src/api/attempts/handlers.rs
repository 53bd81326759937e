use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::attempt_response;
use crate::api::errors::ApiError;
use crate::api::guards::{
    require_attempt_access, require_attempt_owner, CurrentAdmin, CurrentStaff, CurrentUser,
};
use crate::api::validation::{
    validate_flag, validate_points, validate_save_answer, validate_violation,
};
use crate::core::state::AppState;
use crate::db::types::SubmitTrigger;
use crate::schemas::attempt::{
    AnswerResponse, AttemptDetailResponse, AttemptResponse, FlagRequest, FlagResponse,
    GradeRequest, GradeResponse, SaveAnswerRequest, SubmitResponse, ViolationCreate,
    ViolationEventResponse, ViolationRecordedResponse, ViolationReportResponse,
};
use crate::services::timing;

pub(super) async fn get_attempt(
    Path(attempt_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptDetailResponse>, ApiError> {
    let view = state.submissions().view(&attempt_id).await?;
    require_attempt_access(&user, &view.attempt)?;

    Ok(Json(AttemptDetailResponse {
        attempt: AttemptResponse::from_db(
            view.attempt,
            view.effective_status,
            view.remaining_seconds,
            view.deadline,
        ),
        answers: view.answers.into_iter().map(AnswerResponse::from_db).collect(),
    }))
}

pub(super) async fn save_answer(
    Path(attempt_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let exam_settings = state.settings().exam();
    validate_save_answer(&payload, exam_settings.max_answer_bytes)?;

    let attempt = state.submissions().find_attempt(&attempt_id).await?;
    require_attempt_owner(&user, &attempt)?;
    // Closed attempts get their lifecycle error without spending rate-limit budget.
    state.submissions().check_writable(&attempt)?;

    let key = format!("autosave:{attempt_id}");
    let allowed = match state
        .redis()
        .rate_limit(&key, exam_settings.auto_save_rate_limit, exam_settings.auto_save_window_seconds)
        .await
    {
        Ok(allowed) => allowed,
        Err(err) => {
            tracing::warn!(error = %err, attempt_id = %attempt_id, "Autosave rate limit unavailable");
            true
        }
    };
    if !allowed {
        metrics::counter!("autosave_rate_limited_total").increment(1);
        return Err(ApiError::TooManyRequests("Too many autosave requests"));
    }

    let answer = state
        .submissions()
        .save_answer(&attempt_id, payload.question_id.trim(), &payload.response_value)
        .await?;

    Ok(Json(AnswerResponse::from_db(answer)))
}

pub(super) async fn submit_attempt(
    Path(attempt_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let attempt = state.submissions().find_attempt(&attempt_id).await?;
    require_attempt_owner(&user, &attempt)?;

    let outcome = state.submissions().submit(&attempt_id, SubmitTrigger::User).await?;

    Ok(Json(SubmitResponse {
        attempt: attempt_response(outcome.attempt, state.clock().now()),
        transitioned: outcome.transitioned,
    }))
}

pub(super) async fn record_violation(
    Path(attempt_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ViolationCreate>,
) -> Result<(StatusCode, Json<ViolationRecordedResponse>), ApiError> {
    validate_violation(&payload)?;

    let attempt = state.submissions().find_attempt(&attempt_id).await?;
    require_attempt_access(&user, &attempt)?;

    let details = match payload.details {
        Some(serde_json::Value::Null) | None => serde_json::json!({}),
        Some(details) => details,
    };

    let outcome =
        state.violations().record_violation(&attempt_id, payload.violation_type, details).await?;
    let attempt_status = timing::effective_status(&outcome.attempt, state.clock().now());

    Ok((
        StatusCode::CREATED,
        Json(ViolationRecordedResponse {
            event: ViolationEventResponse::from_db(outcome.event),
            violation_count: outcome.violation_count,
            threshold_exceeded: outcome.threshold_exceeded,
            forced_submission: outcome.forced_submission,
            attempt_status,
        }),
    ))
}

pub(super) async fn violation_report(
    Path(attempt_id): Path<String>,
    CurrentStaff(_user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<ViolationReportResponse>, ApiError> {
    let report = state.violations().report(&attempt_id).await?;

    Ok(Json(ViolationReportResponse {
        attempt_id: report.attempt.id,
        student_id: report.attempt.student_id,
        violation_count: report.attempt.violation_count,
        threshold: report.threshold,
        threshold_reached: report.threshold_reached,
        counts: report.counts,
        events: report.events.into_iter().map(ViolationEventResponse::from_db).collect(),
    }))
}

pub(super) async fn flag_attempt(
    Path(attempt_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<FlagRequest>,
) -> Result<Json<FlagResponse>, ApiError> {
    validate_flag(&payload)?;

    let outcome = state
        .violations()
        .flag(&attempt_id, payload.flagged, payload.reason.trim(), &user.id)
        .await?;
    let flag_reason = outcome.attempt.flag_reason.clone();
    let flagged_by = outcome.attempt.flagged_by.clone();

    Ok(Json(FlagResponse {
        attempt: attempt_response(outcome.attempt, state.clock().now()),
        flag_reason,
        flagged_by,
        event: ViolationEventResponse::from_db(outcome.event),
        message: if payload.flagged { "Attempt flagged" } else { "Attempt unflagged" },
    }))
}

pub(super) async fn grade_answer(
    Path((attempt_id, question_id)): Path<(String, String)>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<GradeRequest>,
) -> Result<Json<GradeResponse>, ApiError> {
    validate_points(payload.points)?;

    let outcome = state.grader().grade_answer(&attempt_id, &question_id, payload.points).await?;
    tracing::info!(
        attempt_id = %attempt_id,
        question_id = %question_id,
        grader_id = %user.id,
        points = payload.points,
        "Answer graded"
    );

    Ok(Json(GradeResponse {
        answer: AnswerResponse::from_db(outcome.answer),
        attempt_status: outcome.attempt_status,
        total_score: outcome.total_score,
        pending_questions: outcome.pending,
    }))
}

pub(super) async fn delete_attempt(
    Path(attempt_id): Path<String>,
    CurrentAdmin(user): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.submissions().soft_delete(&attempt_id).await?;
    tracing::info!(attempt_id = %attempt_id, admin_id = %user.id, "Attempt deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}
