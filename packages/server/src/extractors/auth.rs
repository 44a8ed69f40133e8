use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use sea_orm::DbErr;

use crate::crud::Actor;
use crate::error::AppError;
use crate::services::permissions::Principal;
use crate::state::AppState;
use crate::utils::jwt;

/// Authenticated user extracted from the `Authorization: Bearer <token>` header.
///
/// The token only identifies the user; roles and permissions come from the
/// [`PermissionCache`](crate::services::permissions::PermissionCache), so
/// edits to roles take effect without re-issuing tokens.
pub struct AuthUser {
    pub user_id: i32,
    pub principal: Arc<Principal>,
}

impl AuthUser {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.principal.has_permission(permission)
    }

    /// Returns `Ok(())` if the user has the given permission, `Err(PermissionDenied)` otherwise.
    pub fn require_permission(&self, permission: &str) -> Result<(), AppError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

impl Actor for AuthUser {
    fn actor_id(&self) -> Option<i32> {
        Some(self.user_id)
    }

    fn has_permission(&self, permission: &str) -> bool {
        AuthUser::has_permission(self, permission)
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::TokenMissing)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AppError::TokenInvalid)?;

        let claims =
            jwt::verify(token, &state.config.auth.jwt_secret).map_err(|_| AppError::TokenInvalid)?;

        // Deleted or deactivated accounts lose access immediately.
        let principal = match state.permissions.principal(claims.uid).await {
            Ok(principal) if principal.active => principal,
            Ok(_) | Err(DbErr::RecordNotFound(_)) => return Err(AppError::TokenInvalid),
            Err(e) => return Err(e.into()),
        };

        Ok(AuthUser {
            user_id: claims.uid,
            principal,
        })
    }
}
