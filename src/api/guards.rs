use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::security::{self, UserRole};
use crate::core::state::AppState;
use crate::db::models::ExamAttempt;

/// Authenticated caller, taken from the bearer token.
#[derive(Debug, Clone)]
pub(crate) struct CurrentUser {
    pub(crate) id: String,
    pub(crate) role: UserRole,
}

pub(crate) struct CurrentStaff(pub(crate) CurrentUser);
pub(crate) struct CurrentAdmin(pub(crate) CurrentUser);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        if claims.sub.trim().is_empty() {
            return Err(ApiError::Unauthorized("Invalid authentication credentials"));
        }

        Ok(CurrentUser { id: claims.sub, role: claims.role })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStaff {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if user.role.is_staff() {
            Ok(CurrentStaff(user))
        } else {
            Err(ApiError::Forbidden("Teacher access required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        if user.role == UserRole::Admin {
            Ok(CurrentAdmin(user))
        } else {
            Err(ApiError::Forbidden("Admin access required"))
        }
    }
}

pub(crate) fn require_student(user: &CurrentUser) -> Result<(), ApiError> {
    if user.role == UserRole::Student {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Student access required"))
    }
}

/// Students may only touch their own attempts; staff may read any.
pub(crate) fn require_attempt_access(
    user: &CurrentUser,
    attempt: &ExamAttempt,
) -> Result<(), ApiError> {
    if user.role.is_staff() || attempt.student_id == user.id {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Not enough permissions for this attempt"))
    }
}

pub(crate) fn require_attempt_owner(
    user: &CurrentUser,
    attempt: &ExamAttempt,
) -> Result<(), ApiError> {
    if attempt.student_id == user.id {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Not enough permissions for this attempt"))
    }
}
