use serde_json::json;

use crate::common::{TestApp, routes};

#[tokio::test]
async fn newest_entries_come_first() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;
    let id = app.create_page(&token, "First").await;
    app.post_with_token(&routes::record("pages", id), &json!({"status": "archived"}), &token)
        .await;

    let res = app.get_with_token(routes::ACTIVITY, &token).await;

    assert_eq!(res.status, 200, "{}", res.text);
    let categories: Vec<&str> = res.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["category"].as_str().unwrap())
        .collect();
    assert_eq!(categories, ["updated", "created"]);
    assert_eq!(res.body["pagination"]["total"], 2);
}

#[tokio::test]
async fn filters_by_subject_and_category() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;
    let page = app.create_page(&token, "Page").await;
    app.create_term(&token, "Term").await;
    app.post_with_token(&routes::record("pages", page), &json!({"status": "archived"}), &token)
        .await;

    let res = app
        .get_query(
            routes::ACTIVITY,
            &[("subject_type", "page"), ("category", "updated")],
            &token,
        )
        .await;

    let data = res.body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["subject_id"], page);

    let res = app
        .get_query(routes::ACTIVITY, &[("subject_type", "term")], &token)
        .await;
    assert_eq!(res.body["pagination"]["total"], 1);
}

#[tokio::test]
async fn pages_through_entries() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;
    for title in ["A", "B", "C"] {
        app.create_page(&token, title).await;
    }

    let res = app
        .get_query(routes::ACTIVITY, &[("per_page", "2"), ("page", "2")], &token)
        .await;

    assert_eq!(res.body["data"].as_array().unwrap().len(), 1);
    assert_eq!(res.body["pagination"]["total"], 3);
    assert_eq!(res.body["pagination"]["total_pages"], 2);
}

#[tokio::test]
async fn requires_activity_permission() {
    let app = TestApp::spawn().await;
    let token = app
        .user_with_permissions("editor@example.com", &["pages.viewAny", "pages.create"])
        .await;

    let res = app.get_with_token(routes::ACTIVITY, &token).await;

    assert_eq!(res.status, 403);
}
