use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;

use backoffice::entity::{page, user};

use crate::common::{TestApp, routes};

mod forms {
    use super::*;

    #[tokio::test]
    async fn create_form_starts_from_field_defaults() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let res = app.get_with_token(&routes::create_form("pages"), &token).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["state"], "new");
        assert!(res.body["record_id"].is_null());
        assert_eq!(res.field("status")["value"], "draft");
        assert_eq!(res.field("is_featured")["checked"], false);
        assert_eq!(res.field("title")["translations"], json!({"en": "", "fr": ""}));
        assert_eq!(res.field("gallery")["multiple"], true);
    }

    #[tokio::test]
    async fn relationship_fields_offer_related_records() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let news = app.create_term(&token, "News").await;

        let res = app.get_with_token(&routes::create_form("pages"), &token).await;

        let options = res.field("terms")["options"].as_array().unwrap().clone();
        assert_eq!(options, vec![json!({"value": news, "label": "News"})]);
    }

    #[tokio::test]
    async fn create_form_requires_create_permission() {
        let app = TestApp::spawn().await;
        let token = app
            .user_with_permissions("viewer@example.com", &["pages.viewAny"])
            .await;

        let res = app.get_with_token(&routes::create_form("pages"), &token).await;

        assert_eq!(res.status, 403);
    }

    #[tokio::test]
    async fn edit_form_for_a_missing_record_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let res = app.get_with_token(&routes::edit_form("pages", 999), &token).await;

        assert_eq!(res.status, 404);
    }
}

mod saving {
    use super::*;

    #[tokio::test]
    async fn create_persists_and_reports() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let res = app
            .post_with_token(
                &routes::list("pages"),
                &json!({"title": {"en": "Hello World"}, "status": "published"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["notice"], json!({"severity": "success", "message": "Page created."}));
        assert_eq!(res.body["form"]["state"], "persisted");
        assert_eq!(res.field("slug")["value"], "hello-world");

        let stored = page::Entity::find_by_id(res.record_id())
            .one(&app.db)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.published_at.is_some());

        let log = app.activity_for("page", res.record_id()).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].category, "created");
        assert_eq!(log[0].causer_id, Some(app.admin_id().await));
    }

    #[tokio::test]
    async fn missing_required_translation_writes_nothing() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let res = app
            .post_with_token(
                &routes::list("pages"),
                &json!({"title": {"fr": "Bonjour"}, "slug": "bonjour"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 422, "{}", res.text);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert_eq!(
            res.body["errors"]["title.en"],
            json!(["The title (en) field is required."])
        );
        assert_eq!(page::Entity::find().count(&app.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn slugs_must_be_unique() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        app.create_page(&token, "About").await;

        let res = app
            .post_with_token(
                &routes::list("pages"),
                &json!({"title": {"en": "About us"}, "slug": "about"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 422);
        assert!(res.body["errors"]["slug"].is_array());
    }

    #[tokio::test]
    async fn derived_slugs_get_a_numeric_suffix() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let mut slugs = Vec::new();
        for _ in 0..3 {
            let id = app.create_page(&token, "Hello").await;
            let stored = page::Entity::find_by_id(id).one(&app.db).await.unwrap().unwrap();
            slugs.push(stored.slug);
        }

        assert_eq!(slugs, ["hello", "hello-2", "hello-3"]);
    }

    #[tokio::test]
    async fn emails_are_unique_after_normalising() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let before = user::Entity::find().count(&app.db).await.unwrap();

        let res = app
            .post_with_token(
                &routes::list("users"),
                &json!({
                    "name": "Shadow",
                    "email": "ADMIN@Example.com",
                    "password": "correct-horse",
                    "password_confirmation": "correct-horse",
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 422, "{}", res.text);
        assert_eq!(res.body["errors"]["email"], json!(["The email has already been taken."]));
        assert_eq!(user::Entity::find().count(&app.db).await.unwrap(), before);
    }

    #[tokio::test]
    async fn unknown_select_value_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let res = app
            .post_with_token(
                &routes::list("pages"),
                &json!({"title": {"en": "Odd"}, "status": "secret"}),
                &token,
            )
            .await;

        assert_eq!(res.status, 422);
        assert!(res.body["errors"]["status"].is_array());
    }

    #[tokio::test]
    async fn unknown_field_is_a_bad_request() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let res = app
            .post_with_token(
                &routes::list("pages"),
                &json!({"title": {"en": "Odd"}, "owner": 3}),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn update_requires_update_permission() {
        let app = TestApp::spawn().await;
        let admin = app.admin_token().await;
        let id = app.create_page(&admin, "Locked").await;
        let token = app
            .user_with_permissions("creator@example.com", &["pages.viewAny", "pages.create"])
            .await;

        let res = app
            .post_with_token(&routes::record("pages", id), &json!({"status": "archived"}), &token)
            .await;

        assert_eq!(res.status, 403);
        let stored = page::Entity::find_by_id(id).one(&app.db).await.unwrap().unwrap();
        assert_eq!(stored.status, "draft");
    }

    #[tokio::test]
    async fn saving_without_changes_is_reported_as_such() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let id = app.create_page(&token, "Stable").await;

        let res = app
            .post_with_token(
                &routes::record("pages", id),
                &json!({"title": {"en": "Stable"}}),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(
            res.body["notice"],
            json!({"severity": "info", "message": "No changes to save."})
        );
        let log = app.activity_for("page", id).await;
        assert!(log.iter().all(|entry| entry.category != "updated"));
    }

    #[tokio::test]
    async fn updates_log_old_and_new_values() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let id = app.create_page(&token, "Draft").await;

        let res = app
            .post_with_token(&routes::record("pages", id), &json!({"status": "archived"}), &token)
            .await;

        assert_eq!(res.body["notice"]["message"], "Page updated.");
        let log = app.activity_for("page", id).await;
        let updated = log.iter().find(|e| e.category == "updated").unwrap();
        assert_eq!(
            updated.properties["attributes"]["status"],
            json!({"old": "draft", "new": "archived"})
        );
    }
}

mod translations {
    use super::*;

    #[tokio::test]
    async fn untouched_locales_hydrate_empty() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let id = app.create_page(&token, "Hello").await;

        let res = app.get_with_token(&routes::edit_form("pages", id), &token).await;

        assert_eq!(res.field("title")["translations"], json!({"en": "Hello", "fr": ""}));
        assert_eq!(res.field("title")["value"], "Hello");
    }

    #[tokio::test]
    async fn plain_string_fills_the_active_locale_only() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let id = app.create_page(&token, "Hello").await;

        let res = app
            .post_with_token(
                &format!("{}?locale=fr", routes::record("pages", id)),
                &json!({"title": "Bonjour"}),
                &token,
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        let res = app
            .get_query(&routes::edit_form("pages", id), &[("locale", "fr")], &token)
            .await;
        assert_eq!(res.body["locale"], "fr");
        assert_eq!(
            res.field("title")["translations"],
            json!({"en": "Hello", "fr": "Bonjour"})
        );
        assert_eq!(res.field("title")["value"], "Bonjour");
    }

    #[tokio::test]
    async fn submitted_locales_overlay_stored_ones() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let id = app
            .post_with_token(
                &routes::list("pages"),
                &json!({"title": {"en": "Hello", "fr": "Salut"}}),
                &token,
            )
            .await
            .record_id();

        app.post_with_token(
            &routes::record("pages", id),
            &json!({"title": {"fr": "Bonjour"}}),
            &token,
        )
        .await;

        let stored = page::Entity::find_by_id(id).one(&app.db).await.unwrap().unwrap();
        assert_eq!(stored.title, json!({"en": "Hello", "fr": "Bonjour"}));
    }
}

mod passwords {
    use super::*;

    async fn create_user(app: &TestApp, token: &str) -> i32 {
        let res = app
            .post_with_token(
                &routes::list("users"),
                &json!({
                    "name": "Grace",
                    "email": "grace@example.com",
                    "password": "correct-horse",
                    "password_confirmation": "correct-horse",
                }),
                token,
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        res.record_id()
    }

    #[tokio::test]
    async fn password_is_hashed_and_never_rendered() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let id = create_user(&app, &token).await;

        let stored = user::Entity::find_by_id(id).one(&app.db).await.unwrap().unwrap();
        assert!(stored.password.starts_with("$argon2"));

        let res = app.get_with_token(&routes::edit_form("users", id), &token).await;
        assert_eq!(res.field("password"), &json!({
            "name": "password",
            "label": "Password",
            "column_span": 6,
            "translatable": false,
            "widget": "password",
        }));
        assert_eq!(res.field("password_confirmation")["widget"], "password");
        assert!(!res.text.contains("correct-horse"));
        assert!(!res.text.contains("$argon2"));

        let log = app.activity_for("user", id).await;
        assert!(log[0].properties.get("password").is_none());
        assert!(log[0].properties.get("password_confirmation").is_none());
    }

    #[tokio::test]
    async fn confirmation_must_match() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let res = app
            .post_with_token(
                &routes::list("users"),
                &json!({
                    "name": "Grace",
                    "email": "grace@example.com",
                    "password": "correct-horse",
                    "password_confirmation": "battery-staple",
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 422);
        assert!(res.body["errors"]["password"].is_array());
    }

    #[tokio::test]
    async fn blank_password_keeps_the_stored_hash() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let id = create_user(&app, &token).await;
        let before = user::Entity::find_by_id(id).one(&app.db).await.unwrap().unwrap();

        let res = app
            .post_with_token(
                &routes::record("users", id),
                &json!({"name": "Grace Hopper", "password": "", "password_confirmation": ""}),
                &token,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        let after = user::Entity::find_by_id(id).one(&app.db).await.unwrap().unwrap();
        assert_eq!(after.name, "Grace Hopper");
        assert_eq!(after.password, before.password);
        assert_eq!(app.login("grace@example.com", "correct-horse").await.status, 200);
    }

    #[tokio::test]
    async fn changed_password_is_logged_without_its_value() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let id = create_user(&app, &token).await;

        app.post_with_token(
            &routes::record("users", id),
            &json!({"password": "new-password", "password_confirmation": "new-password"}),
            &token,
        )
        .await;

        let log = app.activity_for("user", id).await;
        let updated = log.iter().find(|e| e.category == "updated").unwrap();
        assert_eq!(updated.properties["attributes"]["password"], json!({"changed": true}));
        assert_eq!(app.login("grace@example.com", "new-password").await.status, 200);
    }
}

mod relations {
    use super::*;

    #[tokio::test]
    async fn sync_replaces_the_related_set() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let news = app.create_term(&token, "News").await;
        let guides = app.create_term(&token, "Guides").await;
        let id = app
            .post_with_token(
                &routes::list("pages"),
                &json!({"title": {"en": "Tagged"}, "terms": [news, guides]}),
                &token,
            )
            .await
            .record_id();

        let res = app
            .post_with_token(&routes::record("pages", id), &json!({"terms": [guides]}), &token)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.field("terms")["values"], json!([guides]));
        let log = app.activity_for("page", id).await;
        let updated = log.iter().find(|e| e.category == "updated").unwrap();
        assert_eq!(
            updated.properties["relations"]["terms"],
            json!({"attached": [], "detached": [news]})
        );
    }

    #[tokio::test]
    async fn unknown_related_ids_are_rejected() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let res = app
            .post_with_token(
                &routes::list("pages"),
                &json!({"title": {"en": "Tagged"}, "terms": [404]}),
                &token,
            )
            .await;

        assert_eq!(res.status, 422);
        assert_eq!(res.body["errors"]["terms"], json!(["The selected terms is invalid."]));
    }

    #[tokio::test]
    async fn user_roles_are_synced() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let roles = app
            .get_query(&routes::list("roles"), &[("search", "admin")], &token)
            .await;
        let admin_role = roles.row_ids()[0];

        let res = app
            .post_with_token(
                &routes::list("users"),
                &json!({
                    "name": "Linus",
                    "email": "linus@example.com",
                    "password": "kernel-hacker",
                    "password_confirmation": "kernel-hacker",
                    "roles": [admin_role],
                }),
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.field("roles")["values"], json!([admin_role]));
        let me = app.login("linus@example.com", "kernel-hacker").await;
        assert!(
            me.body["user"]["permissions"]
                .as_array()
                .unwrap()
                .contains(&json!("pages.delete"))
        );
    }

    #[tokio::test]
    async fn a_term_cannot_be_its_own_parent() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let id = app.create_term(&token, "Loop").await;

        let res = app
            .post_with_token(&routes::record("terms", id), &json!({"parent_id": id}), &token)
            .await;

        assert_eq!(res.status, 422);
        assert!(res.body["errors"]["parent_id"].is_array());
    }
}

#[tokio::test]
async fn user_search_ignores_case() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;

    let res = app
        .get_query(&routes::list("users"), &[("search", "ADMIN@EXAMPLE")], &token)
        .await;

    assert_eq!(res.body["pagination"]["total"], 1);
}
