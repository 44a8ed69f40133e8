use std::net::SocketAddr;

use chrono::Utc;
use ::common::config::StorageConfig;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value;
use tempfile::TempDir;

use backoffice::config::{
    AdminConfig, AppConfig, AuthConfig, CorsConfig, DatabaseConfig, ImagesConfig, LocaleConfig,
    ServerConfig,
};
use backoffice::crud::Actor;
use backoffice::entity::{activity_log, permission, role, role_permission, user, user_role};
use backoffice::services::permissions::sync_permissions;
use backoffice::state::AppState;
use backoffice::utils::hash;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub mod routes {
    pub const LOGIN: &str = "/api/v1/auth/login";
    pub const ME: &str = "/api/v1/auth/me";
    pub const CRUD: &str = "/api/v1/crud";
    pub const SETTINGS: &str = "/api/v1/settings";
    pub const ACTIVITY: &str = "/api/v1/activity";

    pub fn list(alias: &str) -> String {
        format!("/api/v1/crud/{alias}")
    }

    pub fn create_form(alias: &str) -> String {
        format!("/api/v1/crud/{alias}/form")
    }

    pub fn edit_form(alias: &str, id: i32) -> String {
        format!("/api/v1/crud/{alias}/{id}/form")
    }

    pub fn record(alias: &str, id: i32) -> String {
        format!("/api/v1/crud/{alias}/{id}")
    }

    pub fn request_delete(alias: &str, id: i32) -> String {
        format!("/api/v1/crud/{alias}/{id}/delete")
    }

    pub fn confirm_delete(alias: &str) -> String {
        format!("/api/v1/crud/{alias}/delete/confirm")
    }

    pub fn cancel_delete(alias: &str) -> String {
        format!("/api/v1/crud/{alias}/delete")
    }

    pub fn remove_attachment(alias: &str, id: i32, attachment_id: i32) -> String {
        format!("/api/v1/crud/{alias}/{id}/attachments/{attachment_id}")
    }

    pub fn attachment(id: i32) -> String {
        format!("/api/v1/attachments/{id}")
    }

    pub fn setting(key: &str) -> String {
        format!("/api/v1/settings/{key}")
    }
}

/// A running test server on its own SQLite database and upload directory.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: DatabaseConnection,
    pub state: AppState,
    _dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

/// A file part for multipart submissions.
pub struct Upload {
    pub field: &'static str,
    pub filename: &'static str,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Actor holding every permission, for driving controllers directly.
pub struct Superuser(pub i32);

impl Actor for Superuser {
    fn actor_id(&self) -> Option<i32> {
        Some(self.0)
    }

    fn has_permission(&self, _permission: &str) -> bool {
        true
    }
}

pub fn test_config(dir: &TempDir) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors: CorsConfig {
                allow_origins: vec![],
                max_age: 3600,
            },
        },
        database: DatabaseConfig {
            url: format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display()),
            max_connections: 5,
        },
        auth: AuthConfig {
            jwt_secret: "test-secret-for-integration-tests".to_string(),
            token_ttl_hours: 1,
        },
        storage: StorageConfig {
            path: dir.path().join("uploads").display().to_string(),
            disk: "local".to_string(),
            max_blob_size: 2 * 1024 * 1024,
        },
        admin: AdminConfig {
            locales: vec![
                LocaleConfig {
                    code: "en".into(),
                    name: "English".into(),
                },
                LocaleConfig {
                    code: "fr".into(),
                    name: "Français".into(),
                },
            ],
            page_size: 15,
            page_sizes: vec![2, 15, 50],
            settings_file: dir.path().join("settings.toml").display().to_string(),
        },
        images: ImagesConfig {
            optimize: false,
            max_dimension: 64,
        },
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = test_config(&dir);
        adjust(&mut config);

        let db = backoffice::database::init_db(&config.database)
            .await
            .expect("Failed to initialize database");
        let state = AppState::build(config, db.clone())
            .await
            .expect("Failed to build state");
        sync_permissions(&db, &state.registry)
            .await
            .expect("Failed to sync permissions");
        backoffice::seed::create_admin(&db, "Admin", ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .expect("Failed to create admin");

        let app = backoffice::build_router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            db,
            state,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_query(&self, path: &str, query: &[(&str, &str)], token: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .query(query)
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn get_without_token(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn post_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_without_token(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn put_with_token(&self, path: &str, body: &Value, token: &str) -> TestResponse {
        let res = self
            .client
            .put(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .json(body)
            .send()
            .await
            .expect("Failed to send PUT request");

        TestResponse::from_response(res).await
    }

    pub async fn delete_with_token(&self, path: &str, token: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// Submit `data` as the `data` part plus one part per upload.
    pub async fn post_multipart(
        &self,
        path: &str,
        data: &Value,
        uploads: Vec<Upload>,
        token: &str,
    ) -> TestResponse {
        let mut form = Form::new().text("data", data.to_string());
        for upload in uploads {
            let part = Part::bytes(upload.bytes)
                .file_name(upload.filename)
                .mime_str(upload.mime)
                .expect("Failed to set MIME type");
            form = form.part(upload.field, part);
        }

        let res = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send multipart request");

        TestResponse::from_response(res).await
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.post_without_token(
            routes::LOGIN,
            &serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn admin_token(&self) -> String {
        let res = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(res.status, 200, "Login failed: {}", res.text);
        res.token()
    }

    pub async fn admin_id(&self) -> i32 {
        user::Entity::find()
            .filter(user::Column::Email.eq(ADMIN_EMAIL))
            .one(&self.db)
            .await
            .expect("DB query failed")
            .expect("admin missing")
            .id
    }

    /// Create a user whose only role grants exactly `permissions`, then log in.
    pub async fn user_with_permissions(&self, email: &str, permissions: &[&str]) -> String {
        let now = Utc::now();
        let password = "user-password";
        let account = user::ActiveModel {
            name: Set(email.to_string()),
            email: Set(email.to_string()),
            password: Set(hash::hash_password(password).unwrap()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert user");

        let grant = role::ActiveModel {
            name: Set(format!("role-for-{email}")),
            description: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert role");

        for slug in permissions {
            let perm = permission::Entity::find()
                .filter(permission::Column::Slug.eq(*slug))
                .one(&self.db)
                .await
                .expect("DB query failed")
                .unwrap_or_else(|| panic!("unknown permission {slug}"));
            role_permission::ActiveModel {
                role_id: Set(grant.id),
                permission_id: Set(perm.id),
            }
            .insert(&self.db)
            .await
            .expect("Failed to grant permission");
        }
        user_role::ActiveModel {
            user_id: Set(account.id),
            role_id: Set(grant.id),
        }
        .insert(&self.db)
        .await
        .expect("Failed to link role");

        let res = self.login(email, password).await;
        assert_eq!(res.status, 200, "Login failed: {}", res.text);
        res.token()
    }

    /// Create a page through the API and return its id.
    pub async fn create_page(&self, token: &str, title: &str) -> i32 {
        let res = self
            .post_with_token(
                &routes::list("pages"),
                &serde_json::json!({ "title": { "en": title } }),
                token,
            )
            .await;
        assert_eq!(res.status, 201, "create_page failed: {}", res.text);
        res.record_id()
    }

    pub async fn create_term(&self, token: &str, name: &str) -> i32 {
        let res = self
            .post_with_token(
                &routes::list("terms"),
                &serde_json::json!({ "name": { "en": name }, "taxonomy": "category" }),
                token,
            )
            .await;
        assert_eq!(res.status, 201, "create_term failed: {}", res.text);
        res.record_id()
    }

    /// Activity entries for one subject, oldest first.
    pub async fn activity_for(
        &self,
        subject_type: &str,
        subject_id: i32,
    ) -> Vec<activity_log::Model> {
        activity_log::Entity::find()
            .filter(activity_log::Column::SubjectType.eq(subject_type))
            .filter(activity_log::Column::SubjectId.eq(subject_id))
            .order_by_asc(activity_log::Column::Id)
            .all(&self.db)
            .await
            .expect("DB query failed")
    }
}

impl TestResponse {
    pub async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let text = res.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self { status, text, body }
    }

    pub fn token(&self) -> String {
        self.body["token"]
            .as_str()
            .expect("Login response should contain a token")
            .to_string()
    }

    /// Id of the record in a save response.
    pub fn record_id(&self) -> i32 {
        self.body["form"]["record_id"]
            .as_i64()
            .expect("response body should contain 'form.record_id'") as i32
    }

    /// Rendered form field by name.
    pub fn field(&self, name: &str) -> &Value {
        let form = if self.body.get("form").is_some() {
            &self.body["form"]
        } else {
            &self.body
        };
        form["fields"]
            .as_array()
            .and_then(|fields| fields.iter().find(|f| f["name"] == name))
            .unwrap_or_else(|| panic!("field `{name}` missing from {}", self.text))
    }

    /// Row ids of a list response, in order.
    pub fn row_ids(&self) -> Vec<i64> {
        self.body["rows"]
            .as_array()
            .expect("list response should contain rows")
            .iter()
            .map(|row| row["id"].as_i64().unwrap())
            .collect()
    }
}

/// A small PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode PNG");
    out.into_inner()
}
