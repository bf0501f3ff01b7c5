use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::security::{self, UserRole};
use crate::core::state::AppState;
use crate::db::models::Exam;

/// The caller as asserted by the identity service's token.
#[derive(Debug, Clone)]
pub(crate) struct AuthUser {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) role: UserRole,
}

pub(crate) struct CurrentUser(pub(crate) AuthUser);
pub(crate) struct CurrentInstructor(pub(crate) AuthUser);
pub(crate) struct CurrentAdmin(pub(crate) AuthUser);

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

        Ok(CurrentUser(AuthUser { id: claims.sub, name: claims.name, role: claims.role }))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentInstructor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        match user.role {
            UserRole::Instructor | UserRole::Admin => Ok(CurrentInstructor(user)),
            UserRole::Student => Err(ApiError::Forbidden("Instructor access required")),
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
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if matches!(user.role, UserRole::Admin) {
            Ok(CurrentAdmin(user))
        } else {
            Err(ApiError::Forbidden("Admin access required"))
        }
    }
}

/// Only the owning instructor or an admin may manage an exam.
pub(crate) fn can_manage_exam(user: &AuthUser, exam: &Exam) -> bool {
    matches!(user.role, UserRole::Admin) || exam.instructor_id == user.id
}
