use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStaff;
use crate::core::state::AppState;
use crate::core::time::format_primitive;
use crate::schemas::attempt::{
    AttemptResponse, MonitorQuery, MonitoredAttemptResponse, ViolationEventResponse,
};

/// Live proctoring view of an exam. `?status=in_progress` narrows to running attempts.
pub(in crate::api::exams) async fn list_exam_attempts(
    Path(exam_id): Path<String>,
    CurrentStaff(_user): CurrentStaff,
    Query(query): Query<MonitorQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<MonitoredAttemptResponse>>, ApiError> {
    let entries = state.violations().monitor(&exam_id, query.status).await?;

    Ok(Json(
        entries
            .into_iter()
            .map(|entry| {
                let flag_reason = entry.attempt.flag_reason.clone();
                let flagged_by = entry.attempt.flagged_by.clone();
                let flagged_at = entry.attempt.flagged_at.map(format_primitive);
                MonitoredAttemptResponse {
                    attempt: AttemptResponse::from_db(
                        entry.attempt,
                        entry.effective_status,
                        entry.remaining_seconds,
                        entry.deadline,
                    ),
                    flag_reason,
                    flagged_by,
                    flagged_at,
                    recent_violations: entry
                        .recent_violations
                        .into_iter()
                        .map(ViolationEventResponse::from_db)
                        .collect(),
                }
            })
            .collect(),
    ))
}
