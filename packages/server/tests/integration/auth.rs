use serde_json::json;

use crate::common::{ADMIN_EMAIL, ADMIN_PASSWORD, TestApp, routes};

mod login {
    use super::*;

    #[tokio::test]
    async fn admin_can_log_in_and_sees_every_permission() {
        let app = TestApp::spawn().await;

        let res = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert!(res.body["token"].is_string());
        assert_eq!(res.body["expires_in"], 3600);
        assert_eq!(res.body["user"]["email"], ADMIN_EMAIL);
        assert_eq!(res.body["user"]["roles"], json!(["admin"]));
        let permissions = res.body["user"]["permissions"].as_array().unwrap();
        assert!(permissions.contains(&json!("pages.delete")));
        assert!(permissions.contains(&json!("settings.update")));
    }

    #[tokio::test]
    async fn email_is_matched_case_insensitively() {
        let app = TestApp::spawn().await;

        let res = app.login("ADMIN@Example.com", ADMIN_PASSWORD).await;

        assert_eq!(res.status, 200, "{}", res.text);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let app = TestApp::spawn().await;

        let res = app.login(ADMIN_EMAIL, "not-the-password").await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn unknown_email_gets_the_same_answer() {
        let app = TestApp::spawn().await;

        let res = app.login("nobody@example.com", ADMIN_PASSWORD).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn empty_fields_are_a_validation_error() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(routes::LOGIN, &json!({"email": " ", "password": ""}))
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn deactivated_account_cannot_log_in() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        app.user_with_permissions("editor@example.com", &["pages.viewAny"]).await;
        let editor = app
            .get_query(&routes::list("users"), &[("search", "editor@")], &token)
            .await;
        let editor_id = editor.row_ids()[0] as i32;

        let res = app
            .post_with_token(
                &routes::record("users", editor_id),
                &json!({"is_active": false}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        let res = app.login("editor@example.com", "user-password").await;
        assert_eq!(res.status, 401);
    }
}

mod me {
    use super::*;

    #[tokio::test]
    async fn returns_the_current_profile() {
        let app = TestApp::spawn().await;
        let token = app
            .user_with_permissions("viewer@example.com", &["pages.viewAny"])
            .await;

        let res = app.get_with_token(routes::ME, &token).await;

        assert_eq!(res.status, 200);
        assert_eq!(res.body["email"], "viewer@example.com");
        assert_eq!(res.body["permissions"], json!(["pages.viewAny"]));
    }

    #[tokio::test]
    async fn requires_a_token() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(routes::ME).await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");
    }

    #[tokio::test]
    async fn rejects_a_garbage_token() {
        let app = TestApp::spawn().await;

        let res = app.get_with_token(routes::ME, "not-a-jwt").await;

        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn role_changes_apply_without_a_new_token() {
        let app = TestApp::spawn().await;
        let admin = app.admin_token().await;
        let token = app
            .user_with_permissions("viewer@example.com", &["pages.viewAny"])
            .await;
        assert_eq!(app.get_with_token(&routes::list("terms"), &token).await.status, 403);

        let roles = app
            .get_query(&routes::list("roles"), &[("search", "role-for-viewer")], &admin)
            .await;
        let role_id = roles.row_ids()[0] as i32;
        let perms = app
            .get_query(&routes::list("permissions"), &[("search", "terms.viewAny")], &admin)
            .await;
        let terms_view = perms.row_ids()[0];
        let page_view = app
            .get_query(&routes::list("permissions"), &[("search", "pages.viewAny")], &admin)
            .await
            .row_ids()[0];

        let res = app
            .post_with_token(
                &routes::record("roles", role_id),
                &json!({"permissions": [page_view, terms_view]}),
                &admin,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        assert_eq!(app.get_with_token(&routes::list("terms"), &token).await.status, 200);
    }
}
