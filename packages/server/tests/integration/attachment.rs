use reqwest::StatusCode;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;

use backoffice::entity::{attachable, attachment};

use crate::common::{TestApp, Upload, png, routes};

fn cover(width: u32, height: u32) -> Upload {
    Upload {
        field: "cover",
        filename: "cover.png",
        mime: "image/png",
        bytes: png(width, height),
    }
}

fn gallery(width: u32) -> Upload {
    Upload {
        field: "gallery[]",
        filename: "shot.png",
        mime: "image/png",
        bytes: png(width, 3),
    }
}

async fn links_for(app: &TestApp, page_id: i32) -> u64 {
    attachable::Entity::find()
        .filter(attachable::Column::OwnerType.eq("page"))
        .filter(attachable::Column::OwnerId.eq(page_id))
        .count(&app.db)
        .await
        .unwrap()
}

mod uploads {
    use super::*;

    #[tokio::test]
    async fn cover_is_stored_with_image_metadata() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let res = app
            .post_multipart(
                &routes::list("pages"),
                &json!({"title": {"en": "Illustrated"}}),
                vec![cover(4, 3)],
                &token,
            )
            .await;

        assert_eq!(res.status, 201, "{}", res.text);
        let existing = res.field("cover")["existing"].as_array().unwrap().clone();
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0]["filename"], "cover.png");
        assert_eq!(existing[0]["mime_type"], "image/png");
        assert_eq!(existing[0]["collection"], "cover");
        assert_eq!(existing[0]["metadata"], json!({"width": 4, "height": 3}));

        let list = app.get_with_token(&routes::list("pages"), &token).await;
        assert_eq!(list.body["rows"][0]["cells"]["cover"]["url"], existing[0]["url"]);
    }

    #[tokio::test]
    async fn single_file_field_replaces_its_attachment() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let first = app
            .post_multipart(
                &routes::list("pages"),
                &json!({"title": {"en": "Illustrated"}}),
                vec![cover(4, 3)],
                &token,
            )
            .await;
        let id = first.record_id();
        let old = first.field("cover")["existing"][0]["id"].as_i64().unwrap();

        let res = app
            .post_multipart(&routes::record("pages", id), &json!({}), vec![cover(8, 6)], &token)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        let existing = res.field("cover")["existing"].as_array().unwrap().clone();
        assert_eq!(existing.len(), 1);
        assert_ne!(existing[0]["id"].as_i64().unwrap(), old);
        assert_eq!(links_for(&app, id).await, 1);
        assert!(
            attachment::Entity::find_by_id(old as i32)
                .one(&app.db)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn multiple_file_field_accumulates() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let id = app
            .post_multipart(
                &routes::list("pages"),
                &json!({"title": {"en": "Album"}}),
                vec![gallery(2), gallery(3)],
                &token,
            )
            .await
            .record_id();

        let res = app
            .post_multipart(&routes::record("pages", id), &json!({}), vec![gallery(4)], &token)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.field("gallery")["existing"].as_array().unwrap().len(), 3);
        assert_eq!(res.field("cover")["existing"], json!([]));
        assert_eq!(links_for(&app, id).await, 3);
    }

    #[tokio::test]
    async fn non_image_cover_is_rejected_before_anything_is_written() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let res = app
            .post_multipart(
                &routes::list("pages"),
                &json!({"title": {"en": "Broken"}}),
                vec![Upload {
                    field: "cover",
                    filename: "notes.txt",
                    mime: "text/plain",
                    bytes: b"not an image".to_vec(),
                }],
                &token,
            )
            .await;

        assert_eq!(res.status, 422, "{}", res.text);
        assert!(res.body["errors"]["cover"].is_array());
        assert_eq!(attachment::Entity::find().count(&app.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn files_for_non_file_fields_are_rejected() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;

        let res = app
            .post_multipart(
                &routes::list("pages"),
                &json!({"title": {"en": "Odd"}}),
                vec![Upload {
                    field: "slug",
                    filename: "slug.png",
                    mime: "image/png",
                    bytes: png(1, 1),
                }],
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
    }
}

mod downloads {
    use super::*;

    async fn page_with_cover(app: &TestApp, token: &str) -> (i32, i32) {
        let res = app
            .post_multipart(
                &routes::list("pages"),
                &json!({"title": {"en": "Illustrated"}}),
                vec![cover(5, 5)],
                token,
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        let attachment_id = res.field("cover")["existing"][0]["id"].as_i64().unwrap() as i32;
        (res.record_id(), attachment_id)
    }

    #[tokio::test]
    async fn serves_the_stored_bytes_with_caching_headers() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let (_, attachment_id) = page_with_cover(&app, &token).await;

        let res = app
            .client
            .get(app.url(&routes::attachment(attachment_id)))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let headers = res.headers().clone();
        assert_eq!(headers["content-type"], "image/png");
        assert!(headers["content-disposition"].to_str().unwrap().starts_with("inline"));
        let etag = headers["etag"].to_str().unwrap().to_string();
        assert_eq!(res.bytes().await.unwrap().to_vec(), png(5, 5));

        let cached = app
            .client
            .get(app.url(&routes::attachment(attachment_id)))
            .bearer_auth(&token)
            .header("If-None-Match", etag)
            .send()
            .await
            .unwrap();
        assert_eq!(cached.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn callers_who_cannot_see_the_owner_get_not_found() {
        let app = TestApp::spawn().await;
        let admin = app.admin_token().await;
        let (_, attachment_id) = page_with_cover(&app, &admin).await;
        let token = app
            .user_with_permissions("terms@example.com", &["terms.viewAny"])
            .await;

        let res = app.get_with_token(&routes::attachment(attachment_id), &token).await;

        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn requires_a_token() {
        let app = TestApp::spawn().await;
        let admin = app.admin_token().await;
        let (_, attachment_id) = page_with_cover(&app, &admin).await;

        let res = app.get_without_token(&routes::attachment(attachment_id)).await;

        assert_eq!(res.status, 401);
    }

    #[tokio::test]
    async fn removing_unlinks_and_logs() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let (page_id, attachment_id) = page_with_cover(&app, &token).await;

        let res = app
            .delete_with_token(&routes::remove_attachment("pages", page_id, attachment_id), &token)
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["notice"]["message"], "Attachment removed.");
        assert_eq!(links_for(&app, page_id).await, 0);
        let form = app.get_with_token(&routes::edit_form("pages", page_id), &token).await;
        assert_eq!(form.field("cover")["existing"], json!([]));
        let log = app.activity_for("page", page_id).await;
        assert!(
            log.iter()
                .any(|e| e.properties["detached_attachment"] == json!(attachment_id))
        );
    }

    #[tokio::test]
    async fn removing_from_the_wrong_collection_is_not_found() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let (page_id, attachment_id) = page_with_cover(&app, &token).await;

        let path = format!(
            "{}?collection=gallery",
            routes::remove_attachment("pages", page_id, attachment_id)
        );
        let res = app.delete_with_token(&path, &token).await;

        assert_eq!(res.status, 404);
        assert_eq!(links_for(&app, page_id).await, 1);
    }
}
