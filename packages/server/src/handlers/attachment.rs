use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use common::storage::ContentHash;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tokio_util::io::ReaderStream;
use tracing::instrument;

use crate::crud::descriptor::Ability;
use crate::entity::{attachable, attachment};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::state::AppState;
use crate::utils::filename::content_disposition;

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Attachments",
    operation_id = "downloadAttachment",
    summary = "Download an attachment",
    description = "Streams the file. Supports ETag-based caching via If-None-Match. \
        The caller must be allowed to list at least one resource the file is attached to.",
    params(("id" = i32, Path, description = "Attachment ID")),
    responses(
        (status = 200, description = "Attachment content"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Attachment not found or not accessible (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, headers), fields(user_id = auth_user.user_id))]
pub async fn download(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let row = attachment::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Attachment not found".into()))?;

    // Hidden and forbidden files look the same from outside.
    let owner_types: Vec<String> = attachable::Entity::find()
        .filter(attachable::Column::AttachmentId.eq(id))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|link| link.owner_type)
        .collect();
    let visible = owner_types.iter().any(|owner_type| {
        state.registry.by_owner_type(owner_type).is_some_and(|resource| {
            auth_user.has_permission(&resource.descriptor().permission(Ability::ViewAny))
        })
    });
    if !visible {
        return Err(AppError::NotFound("Attachment not found".into()));
    }

    build_blob_response(&row, &headers, state.blob_store.as_ref()).await
}

async fn build_blob_response(
    row: &attachment::Model,
    headers: &HeaderMap,
    blob_store: &dyn common::storage::BlobStore,
) -> Result<Response, AppError> {
    let etag_value = format!("\"{}\"", row.storage_path);
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && (val == etag_value || val == "*")
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let hash = ContentHash::from_hex(&row.storage_path)?;
    let reader = blob_store.get_stream(&hash).await?;
    let body = Body::from_stream(ReaderStream::new(reader));

    let disposition = if row.mime_type.starts_with("image/") {
        "inline"
    } else {
        "attachment"
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, row.mime_type.as_str())
        .header(header::CONTENT_LENGTH, row.byte_size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(disposition, &row.filename),
        )
        .header(header::ETAG, &etag_value)
        .header(header::CACHE_CONTROL, "private, max-age=3600")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}
