use axum::{
    Json,
    extract::{Query, State},
};
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::models::activity::{ActivityListQuery, ActivityListResponse, ActivityResponse};
use crate::models::shared::{PageParams, Pagination};
use crate::services::activity::ActivityQuery;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/",
    tag = "Activity",
    operation_id = "listActivity",
    summary = "Browse the activity log, newest first",
    params(ActivityListQuery),
    responses(
        (status = 200, description = "One page of entries", body = ActivityListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = auth_user.user_id))]
pub async fn list(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ActivityListQuery>,
) -> Result<Json<ActivityListResponse>, AppError> {
    auth_user.require_permission("activity.view")?;

    let (page, per_page) = PageParams {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve();
    let (rows, total) = state
        .activity
        .list(&ActivityQuery {
            category: query.category,
            subject_type: query.subject_type,
            subject_id: query.subject_id,
            page,
            per_page,
        })
        .await?;

    Ok(Json(ActivityListResponse {
        data: rows.into_iter().map(ActivityResponse::from).collect(),
        pagination: Pagination::new(page, per_page, total),
    }))
}
