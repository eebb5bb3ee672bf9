//! Identity gate.
//!
//! Authentication happens upstream. The gateway forwards the resolved user
//! id in the `x-user-id` header; this extractor loads that user and refuses
//! requests from unknown or deactivated accounts.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::error::AppError;
use super::state::AppState;
use crate::api::UserId;
use crate::db::repository::{RepositoryError, UserRepository};
use crate::models::user::{Caller, User};

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated, active user making the request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub caller: Caller,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", USER_ID_HEADER)))?;

        let user_id: UserId = raw
            .to_str()
            .ok()
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("Malformed {} header", USER_ID_HEADER)))?;

        let user = match state.repository.get_user(user_id).await {
            Ok(user) => user,
            Err(RepositoryError::NotFound { .. }) => {
                tracing::warn!(%user_id, "Request from unknown user");
                return Err(AppError::Unauthorized(format!("Unknown user {}", user_id)));
            }
            Err(e) => return Err(e.into()),
        };

        if !user.is_active {
            tracing::warn!(%user_id, "Request from deactivated user");
            return Err(AppError::Forbidden(format!(
                "User {} is deactivated",
                user.initials
            )));
        }

        let caller = Caller::from(&user);
        Ok(CurrentUser { user, caller })
    }
}
