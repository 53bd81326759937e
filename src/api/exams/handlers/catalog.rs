use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStaff, CurrentUser};
use crate::api::validation::validate_exam_create;
use crate::core::state::AppState;
use crate::core::time::to_primitive_utc;
use crate::db::types::ExamStatus;
use crate::schemas::exam::{ExamCreate, ExamResponse};
use crate::services::store::{NewExam, NewQuestion};

pub(in crate::api::exams) async fn create_exam(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    validate_exam_create(&payload)?;

    let exam = NewExam {
        id: Uuid::new_v4().to_string(),
        title: payload.title.trim().to_string(),
        description: payload.description,
        start_time: to_primitive_utc(payload.start_time),
        end_time: to_primitive_utc(payload.end_time),
        duration_minutes: payload.duration_minutes,
        created_by: user.id,
        questions: payload
            .questions
            .into_iter()
            .map(|question| NewQuestion {
                id: Uuid::new_v4().to_string(),
                kind: question.kind,
                prompt: question.prompt,
                options: question.options,
                correct_answer: question.correct_answer.map(|answer| answer.trim().to_string()),
                points: question.points,
            })
            .collect(),
    };

    let now = state.clock().now();
    let exam = state
        .catalog()
        .create_exam(exam, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;
    let questions = state
        .catalog()
        .list_questions(&exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    tracing::info!(exam_id = %exam.id, questions = questions.len(), "Exam created");

    Ok((StatusCode::CREATED, Json(ExamResponse::from_db(exam, questions, true))))
}

pub(in crate::api::exams) async fn get_exam(
    Path(exam_id): Path<String>,
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = state
        .catalog()
        .find_exam(&exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or(ApiError::NotFound("Exam not found"))?;

    let is_staff = user.role.is_staff();
    if !is_staff && exam.status != ExamStatus::Published {
        return Err(ApiError::NotFound("Exam not found"));
    }

    let questions = state
        .catalog()
        .list_questions(&exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;

    Ok(Json(ExamResponse::from_db(exam, questions, is_staff)))
}

pub(in crate::api::exams) async fn publish_exam(
    Path(exam_id): Path<String>,
    CurrentStaff(_user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let now = state.clock().now();
    let exam = match state
        .catalog()
        .publish_exam(&exam_id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to publish exam"))?
    {
        Some(exam) => exam,
        None => {
            let exists = state
                .catalog()
                .find_exam(&exam_id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
                .is_some();
            return Err(if exists {
                ApiError::Conflict {
                    code: "EXAM_NOT_PUBLISHABLE",
                    detail: "Only draft exams can be published".to_string(),
                }
            } else {
                ApiError::NotFound("Exam not found")
            });
        }
    };

    let questions = state
        .catalog()
        .list_questions(&exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))?;
    if questions.is_empty() {
        tracing::warn!(exam_id = %exam.id, "Published exam has no questions");
    }

    tracing::info!(exam_id = %exam.id, "Exam published");
    Ok(Json(ExamResponse::from_db(exam, questions, true)))
}
