use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;

use backoffice::entity::activity_log;
use backoffice::services::settings::parse_definitions;

use crate::common::{TestApp, routes};

const DEFINITIONS: &str = r#"
[[setting]]
key = "site.name"
value = "Backoffice"
description = "Shown in the page title"

[[setting]]
key = "content.pages_per_feed"
group = "content"
value = 10
"#;

async fn seeded() -> TestApp {
    let app = TestApp::spawn().await;
    let definitions = parse_definitions(DEFINITIONS).unwrap();
    let inserted = app.state.settings.sync_definitions(&definitions).await.unwrap();
    assert_eq!(inserted, 2);
    app
}

async fn setting_updates(app: &TestApp) -> u64 {
    activity_log::Entity::find()
        .filter(activity_log::Column::SubjectType.eq("setting"))
        .filter(activity_log::Column::Category.eq("updated"))
        .count(&app.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn lists_every_setting_with_its_group() {
    let app = seeded().await;
    let token = app.admin_token().await;

    let res = app.get_with_token(routes::SETTINGS, &token).await;

    assert_eq!(res.status, 200, "{}", res.text);
    let rows = res.body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    let name = rows.iter().find(|r| r["key"] == "site.name").unwrap();
    assert_eq!(name["group"], "general");
    assert_eq!(name["value"], "Backoffice");
    let feed = rows.iter().find(|r| r["key"] == "content.pages_per_feed").unwrap();
    assert_eq!(feed["group"], "content");
    assert_eq!(feed["value"], 10);
}

#[tokio::test]
async fn syncing_again_keeps_edited_values() {
    let app = seeded().await;
    app.state
        .settings
        .set("site.name", json!("Renamed"), None)
        .await
        .unwrap();

    let definitions = parse_definitions(DEFINITIONS).unwrap();
    let inserted = app.state.settings.sync_definitions(&definitions).await.unwrap();

    assert_eq!(inserted, 0);
    assert_eq!(app.state.settings.get("site.name").await.unwrap(), Some(json!("Renamed")));
}

#[tokio::test]
async fn update_stores_the_value_and_logs_it() {
    let app = seeded().await;
    let token = app.admin_token().await;

    let res = app
        .put_with_token(&routes::setting("site.name"), &json!({"value": "Acme"}), &token)
        .await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["changed"], true);
    assert_eq!(res.body["setting"]["value"], "Acme");
    assert_eq!(app.state.settings.get("site.name").await.unwrap(), Some(json!("Acme")));
    assert_eq!(setting_updates(&app).await, 1);

    let entry = activity_log::Entity::find()
        .filter(activity_log::Column::SubjectType.eq("setting"))
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        entry.properties,
        json!({"key": "site.name", "old": "Backoffice", "new": "Acme"})
    );
    assert_eq!(entry.causer_id, Some(app.admin_id().await));
}

#[tokio::test]
async fn writing_the_same_value_is_a_no_op() {
    let app = seeded().await;
    let token = app.admin_token().await;

    let res = app
        .put_with_token(
            &routes::setting("content.pages_per_feed"),
            &json!({"value": 10}),
            &token,
        )
        .await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["changed"], false);
    assert_eq!(setting_updates(&app).await, 0);
}

#[tokio::test]
async fn unknown_key_is_not_found() {
    let app = seeded().await;
    let token = app.admin_token().await;

    let res = app
        .put_with_token(&routes::setting("site.missing"), &json!({"value": 1}), &token)
        .await;

    assert_eq!(res.status, 404);
    assert_eq!(res.body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn body_without_value_is_rejected() {
    let app = seeded().await;
    let token = app.admin_token().await;

    let res = app
        .put_with_token(&routes::setting("site.name"), &json!({"val": 1}), &token)
        .await;

    assert_eq!(res.status, 400);
}

#[tokio::test]
async fn viewing_and_changing_need_separate_permissions() {
    let app = seeded().await;
    let token = app
        .user_with_permissions("reader@example.com", &["settings.view"])
        .await;

    let res = app.get_with_token(routes::SETTINGS, &token).await;
    assert_eq!(res.status, 200);

    let res = app
        .put_with_token(&routes::setting("site.name"), &json!({"value": "Nope"}), &token)
        .await;
    assert_eq!(res.status, 403);
    assert_eq!(app.state.settings.get("site.name").await.unwrap(), Some(json!("Backoffice")));
}

#[tokio::test]
async fn listing_requires_view_permission() {
    let app = seeded().await;
    let token = app
        .user_with_permissions("nobody@example.com", &["pages.viewAny"])
        .await;

    let res = app.get_with_token(routes::SETTINGS, &token).await;

    assert_eq!(res.status, 403);
}
