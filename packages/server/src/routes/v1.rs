use axum::extract::DefaultBodyLimit;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/crud", crud_routes(config))
        .nest("/attachments", attachment_routes())
        .nest("/settings", settings_routes())
        .nest("/activity", activity_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::me))
}

fn crud_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    // Several files may arrive in one submission, plus the JSON part.
    let upload_limit = usize::try_from(config.storage.max_blob_size.saturating_mul(8))
        .unwrap_or(usize::MAX);

    OpenApiRouter::new()
        .routes(routes!(handlers::crud::index))
        .routes(routes!(handlers::crud::list, handlers::crud::create))
        .routes(routes!(handlers::crud::create_form))
        .routes(routes!(handlers::crud::edit_form))
        .routes(routes!(handlers::crud::update))
        .routes(routes!(handlers::crud::request_delete))
        .routes(routes!(handlers::crud::confirm_delete))
        .routes(routes!(handlers::crud::cancel_delete))
        .routes(routes!(handlers::crud::remove_attachment))
        .layer(DefaultBodyLimit::max(upload_limit))
}

fn attachment_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::attachment::download))
}

fn settings_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::settings::list))
        .routes(routes!(handlers::settings::update))
}

fn activity_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::activity::list))
}
