use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::settings::{SettingResponse, UpdateSettingRequest, UpdateSettingResponse};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/",
    tag = "Settings",
    operation_id = "listSettings",
    summary = "All settings, ordered by key",
    responses(
        (status = 200, description = "Settings", body = Vec<SettingResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn list(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<SettingResponse>>, AppError> {
    auth_user.require_permission("settings.view")?;

    let all = state.settings.all().await?;
    Ok(Json(all.values().map(SettingResponse::from).collect()))
}

#[utoipa::path(
    put,
    path = "/{key}",
    tag = "Settings",
    operation_id = "updateSetting",
    summary = "Change a setting",
    description = "Writing the current value again is a no-op and leaves no activity entry.",
    params(("key" = String, Path, description = "Setting key, e.g. `site.name`")),
    request_body = UpdateSettingRequest,
    responses(
        (status = 200, description = "Stored value", body = UpdateSettingResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Unknown key (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn update(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(key): Path<String>,
    AppJson(payload): AppJson<UpdateSettingRequest>,
) -> Result<Json<UpdateSettingResponse>, AppError> {
    auth_user.require_permission("settings.update")?;

    let changed = state
        .settings
        .set(&key, payload.value, Some(auth_user.user_id))
        .await?;
    let all = state.settings.all().await?;
    let row = all
        .get(&key)
        .ok_or_else(|| AppError::NotFound(format!("Setting '{key}' not found")))?;

    Ok(Json(UpdateSettingResponse {
        setting: SettingResponse::from(row),
        changed,
    }))
}
