use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::instrument;

use crate::crud::edit::FormView;
use crate::crud::list::ListView;
use crate::crud::{CrudContext, EditController, ListController, Notice};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::submission::FormSubmission;
use crate::models::crud::{
    ListParams, LocaleParams, NoticeResponse, PendingDeleteResponse, RemoveAttachmentParams,
    ResourceSummary, SaveResponse,
};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/",
    tag = "CRUD",
    operation_id = "listResources",
    summary = "Resources the caller may browse",
    responses(
        (status = 200, description = "Registered resources with the caller's abilities", body = Vec<ResourceSummary>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn index(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<ResourceSummary>> {
    let resources = state
        .registry
        .iter()
        .filter_map(|resource| {
            ResourceSummary::for_resource(resource.as_ref(), |p| auth_user.has_permission(p))
        })
        .collect();
    Json(resources)
}

#[utoipa::path(
    get,
    path = "/{alias}",
    tag = "CRUD",
    operation_id = "listRecords",
    summary = "List records",
    description = "Searchable, filterable, sortable and paginated listing. \
        Filters are passed as `filter[field]=value`. Viewing the list abandons a staged deletion.",
    params(
        ("alias" = String, Path, description = "Resource alias, e.g. `pages`"),
        ("search" = Option<String>, Query, description = "Case-insensitive match on searchable fields"),
        ("sort" = Option<String>, Query, description = "Sortable column"),
        ("direction" = Option<String>, Query, description = "`asc` or `desc`"),
        ("page" = Option<u64>, Query, description = "Page number (1-based)"),
        ("per_page" = Option<u64>, Query, description = "One of the configured page sizes"),
        ("locale" = Option<String>, Query, description = "Display locale"),
    ),
    responses(
        (status = 200, description = "Rendered page", body = ListView),
        (status = 400, description = "Unknown filter or unsortable column (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Unknown alias (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = auth_user.user_id))]
pub async fn list(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(alias): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<ListView>, AppError> {
    let resource = state.registry.resolve(&alias)?;
    let params = ListParams::from_query(query)?;

    let mut list = ListController::mount(resource, &auth_user, params.locale.as_deref())?;
    state.staging.clear(auth_user.user_id, &alias);
    params.apply(&mut list, state.config.admin.page_size(params.per_page))?;

    Ok(Json(list.render(&state.crud_context()).await?))
}

#[utoipa::path(
    get,
    path = "/{alias}/form",
    tag = "CRUD",
    operation_id = "createForm",
    summary = "Blank create form",
    params(("alias" = String, Path, description = "Resource alias"), LocaleParams),
    responses(
        (status = 200, description = "Form with defaults applied", body = FormView),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Unknown alias (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn create_form(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(alias): Path<String>,
    Query(params): Query<LocaleParams>,
) -> Result<Json<FormView>, AppError> {
    let ctx = state.crud_context();
    let resource = state.registry.resolve(&alias)?;
    let locale = params.locale.as_deref();
    let form = EditController::initialize(&ctx, resource, &auth_user, None, locale).await?;
    Ok(Json(form.render(&ctx).await?))
}

#[utoipa::path(
    get,
    path = "/{alias}/{id}/form",
    tag = "CRUD",
    operation_id = "editForm",
    summary = "Edit form for an existing record",
    params(
        ("alias" = String, Path, description = "Resource alias"),
        ("id" = i32, Path, description = "Record ID"),
        LocaleParams,
    ),
    responses(
        (status = 200, description = "Form hydrated from the record", body = FormView),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Unknown alias or record (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn edit_form(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((alias, id)): Path<(String, i32)>,
    Query(params): Query<LocaleParams>,
) -> Result<Json<FormView>, AppError> {
    let ctx = state.crud_context();
    let resource = state.registry.resolve(&alias)?;
    let locale = params.locale.as_deref();
    let form = EditController::initialize(&ctx, resource, &auth_user, Some(id), locale).await?;
    Ok(Json(form.render(&ctx).await?))
}

#[utoipa::path(
    post,
    path = "/{alias}",
    tag = "CRUD",
    operation_id = "createRecord",
    summary = "Create a record",
    description = "Accepts a JSON object of field values, or `multipart/form-data` with the \
        values in a `data` part and one file part per upload, named after its field.",
    params(("alias" = String, Path, description = "Resource alias"), LocaleParams),
    request_body(content_type = "multipart/form-data", description = "`data` JSON plus file parts"),
    responses(
        (status = 201, description = "Created; the form is re-rendered for the new record", body = SaveResponse),
        (status = 400, description = "Malformed submission (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 422, description = "Field errors (VALIDATION_ERROR)", body = ErrorBody),
        (status = 500, description = "Persistence failed, nothing was written (INTERNAL_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, submission), fields(user_id = auth_user.user_id))]
pub async fn create(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(alias): Path<String>,
    Query(params): Query<LocaleParams>,
    submission: FormSubmission,
) -> Result<impl IntoResponse, AppError> {
    let ctx = state.crud_context();
    let resource = state.registry.resolve(&alias)?;
    let locale = params.locale.as_deref();
    let mut form = EditController::initialize(&ctx, resource, &auth_user, None, locale).await?;

    let notice = submit(&mut form, &ctx, &auth_user, submission).await?;
    let form = form.render(&ctx).await?;
    Ok((StatusCode::CREATED, Json(SaveResponse { notice, form })))
}

#[utoipa::path(
    post,
    path = "/{alias}/{id}",
    tag = "CRUD",
    operation_id = "updateRecord",
    summary = "Update a record",
    description = "Same body as create. Fields left out keep their stored values; \
        an empty password keeps the current one.",
    params(
        ("alias" = String, Path, description = "Resource alias"),
        ("id" = i32, Path, description = "Record ID"),
        LocaleParams,
    ),
    request_body(content_type = "multipart/form-data", description = "`data` JSON plus file parts"),
    responses(
        (status = 200, description = "Saved, or nothing changed", body = SaveResponse),
        (status = 400, description = "Malformed submission (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Unknown alias or record (NOT_FOUND)", body = ErrorBody),
        (status = 422, description = "Field errors (VALIDATION_ERROR)", body = ErrorBody),
        (status = 500, description = "Persistence failed, nothing was written (INTERNAL_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, submission), fields(user_id = auth_user.user_id))]
pub async fn update(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((alias, id)): Path<(String, i32)>,
    Query(params): Query<LocaleParams>,
    submission: FormSubmission,
) -> Result<Json<SaveResponse>, AppError> {
    let ctx = state.crud_context();
    let resource = state.registry.resolve(&alias)?;
    let locale = params.locale.as_deref();
    let mut form =
        EditController::initialize(&ctx, resource, &auth_user, Some(id), locale).await?;

    let notice = submit(&mut form, &ctx, &auth_user, submission).await?;
    let form = form.render(&ctx).await?;
    Ok(Json(SaveResponse { notice, form }))
}

async fn submit(
    form: &mut EditController,
    ctx: &CrudContext,
    auth_user: &AuthUser,
    submission: FormSubmission,
) -> Result<Notice, AppError> {
    form.fill_all(submission.data)?;
    for (field, files) in submission.files {
        form.attach_files(&field, files)?;
    }
    Ok(form.save(ctx, auth_user).await?)
}

#[utoipa::path(
    post,
    path = "/{alias}/{id}/delete",
    tag = "CRUD",
    operation_id = "requestDelete",
    summary = "Stage a record for deletion",
    description = "Nothing is removed until the deletion is confirmed. \
        Staging another record replaces the previous one.",
    params(
        ("alias" = String, Path, description = "Resource alias"),
        ("id" = i32, Path, description = "Record ID"),
    ),
    responses(
        (status = 200, description = "Deletion staged", body = PendingDeleteResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Unknown alias (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn request_delete(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((alias, id)): Path<(String, i32)>,
) -> Result<Json<PendingDeleteResponse>, AppError> {
    let resource = state.registry.resolve(&alias)?;
    let mut list = ListController::mount(resource, &auth_user, None)?;
    list.request_delete(&auth_user, id)?;
    state.staging.stage(auth_user.user_id, &alias, id);

    let entity = &list.resource().descriptor().entity_name;
    Ok(Json(PendingDeleteResponse {
        pending_delete: id,
        confirm: format!("Delete this {entity}? This cannot be undone."),
    }))
}

#[utoipa::path(
    post,
    path = "/{alias}/delete/confirm",
    tag = "CRUD",
    operation_id = "confirmDelete",
    summary = "Delete the staged record",
    params(("alias" = String, Path, description = "Resource alias")),
    responses(
        (status = 200, description = "Deleted", body = NoticeResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Unknown alias, or the record is already gone (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Nothing staged (CONFLICT)", body = ErrorBody),
        (status = 500, description = "Deletion failed, the record is untouched (INTERNAL_ERROR)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn confirm_delete(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<Json<NoticeResponse>, AppError> {
    let resource = state.registry.resolve(&alias)?;
    let mut list = ListController::mount(resource, &auth_user, None)?;
    if let Some(id) = state.staging.clear(auth_user.user_id, &alias) {
        list.request_delete(&auth_user, id)?;
    }
    let notice = list.confirm_delete(&state.crud_context(), &auth_user).await?;
    Ok(Json(NoticeResponse { notice }))
}

#[utoipa::path(
    delete,
    path = "/{alias}/delete",
    tag = "CRUD",
    operation_id = "cancelDelete",
    summary = "Abandon a staged deletion",
    params(("alias" = String, Path, description = "Resource alias")),
    responses(
        (status = 204, description = "Nothing staged any more"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Unknown alias (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn cancel_delete(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<StatusCode, AppError> {
    state.registry.resolve(&alias)?;
    state.staging.clear(auth_user.user_id, &alias);
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/{alias}/{id}/attachments/{attachment_id}",
    tag = "CRUD",
    operation_id = "removeAttachment",
    summary = "Detach a file from a record",
    description = "The file itself is deleted once no record references it.",
    params(
        ("alias" = String, Path, description = "Resource alias"),
        ("id" = i32, Path, description = "Record ID"),
        ("attachment_id" = i32, Path, description = "Attachment ID"),
        RemoveAttachmentParams,
    ),
    responses(
        (status = 200, description = "Detached", body = NoticeResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Unknown record or attachment (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn remove_attachment(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((alias, id, attachment_id)): Path<(String, i32, i32)>,
    Query(params): Query<RemoveAttachmentParams>,
) -> Result<Json<NoticeResponse>, AppError> {
    let ctx = state.crud_context();
    let resource = state.registry.resolve(&alias)?;
    let mut form = EditController::initialize(&ctx, resource, &auth_user, Some(id), None).await?;
    let notice = form
        .remove_attachment(&ctx, &auth_user, attachment_id, params.collection.as_deref())
        .await?;
    Ok(Json(NoticeResponse { notice }))
}
