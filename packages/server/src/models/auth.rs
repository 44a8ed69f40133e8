use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extractors::auth::AuthUser;
use crate::services::permissions::Principal;

/// Request body for user login.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    /// Account email, matched case-insensitively.
    #[schema(example = "admin@example.com")]
    pub email: String,
    /// Account password.
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
}

pub fn validate_login_request(payload: &LoginRequest) -> Result<(), AppError> {
    if payload.email.trim().is_empty() {
        return Err(AppError::Validation("Email must not be empty".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password must not be empty".into()));
    }
    Ok(())
}

/// Successful login response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    /// JWT bearer token.
    #[schema(example = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...")]
    pub token: String,
    /// Seconds until the token expires.
    #[schema(example = 86400)]
    pub expires_in: i64,
    pub user: MeResponse,
}

/// Current authenticated user's profile.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    /// User ID.
    #[schema(example = 1)]
    pub id: i32,
    #[schema(example = "Ada Admin")]
    pub name: String,
    #[schema(example = "admin@example.com")]
    pub email: String,
    /// Role names.
    #[schema(example = json!(["admin"]))]
    pub roles: Vec<String>,
    /// Permission slugs, sorted.
    #[schema(example = json!(["pages.create", "pages.viewAny"]))]
    pub permissions: Vec<String>,
}

impl From<&AuthUser> for MeResponse {
    fn from(user: &AuthUser) -> Self {
        Self::from(user.principal.as_ref())
    }
}

impl From<&Principal> for MeResponse {
    fn from(principal: &Principal) -> Self {
        let mut permissions: Vec<String> = principal.permissions.iter().cloned().collect();
        permissions.sort();
        Self {
            id: principal.id,
            name: principal.name.clone(),
            email: principal.email.clone(),
            roles: principal.roles.iter().cloned().collect(),
            permissions,
        }
    }
}
