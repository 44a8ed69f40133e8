//! Controllers driven directly, below the HTTP layer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::SelectStatement;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, PaginatorTrait};
use serde_json::{Map, Value, json};

use backoffice::configs::PageCrudConfig;
use backoffice::crud::config::{EntityConfig, RuleContext};
use backoffice::crud::descriptor::{EntityDescriptor, SelectOption, SortDirection};
use backoffice::crud::form::UploadedFile;
use backoffice::crud::relation::{
    ManyToMany, OptionSource, RelatedItem, Relation, RelationSync, SyncChanges,
};
use backoffice::crud::resource::Record;
use backoffice::crud::validation::RuleSet;
use backoffice::crud::{CrudError, CrudResource, EditController, ListController, Registry};
use backoffice::entity::{attachment, page, page_term, term};

use crate::common::{Superuser, TestApp, png};

/// Page terms whose sync always fails, after the page row is written.
struct BrokenTerms(ManyToMany<page_term::Entity, term::Entity>);

impl BrokenTerms {
    fn new() -> Self {
        Self(ManyToMany::new(
            page_term::Column::PageId,
            page_term::Column::TermId,
            term::Column::Id,
            "name",
        ))
    }
}

#[async_trait]
impl OptionSource for BrokenTerms {
    async fn options(
        &self,
        db: &DatabaseConnection,
        locale: &str,
    ) -> Result<Vec<SelectOption>, DbErr> {
        self.0.options(db, locale).await
    }
}

#[async_trait]
impl RelationSync for BrokenTerms {
    async fn related_ids(&self, db: &DatabaseConnection, owner: i32) -> Result<Vec<i32>, DbErr> {
        self.0.related_ids(db, owner).await
    }

    async fn related_for(
        &self,
        db: &DatabaseConnection,
        owners: &[i32],
        locale: &str,
    ) -> Result<HashMap<i32, Vec<RelatedItem>>, DbErr> {
        self.0.related_for(db, owners, locale).await
    }

    async fn sync(
        &self,
        _txn: &DatabaseTransaction,
        _owner: i32,
        _ids: &[i32],
    ) -> Result<SyncChanges, DbErr> {
        Err(DbErr::Custom("junction table unavailable".into()))
    }

    async fn detach_all(&self, txn: &DatabaseTransaction, owner: i32) -> Result<u64, DbErr> {
        self.0.detach_all(txn, owner).await
    }

    fn owners_related_to(&self, related: i32) -> SelectStatement {
        self.0.owners_related_to(related)
    }
}

struct BrokenPageConfig;

impl EntityConfig for BrokenPageConfig {
    type Entity = page::Entity;
    type Model = page::Model;
    type ActiveModel = page::ActiveModel;

    fn descriptor(&self) -> EntityDescriptor {
        PageCrudConfig.descriptor()
    }

    fn relations(&self) -> Vec<Relation> {
        vec![Relation::new("terms", BrokenTerms::new())]
    }

    fn validation_rules(&self, cx: RuleContext<'_>) -> RuleSet {
        PageCrudConfig.validation_rules(cx)
    }

    fn before_save(
        &self,
        record: Option<&Record>,
        data: &mut Map<String, Value>,
    ) -> Result<(), CrudError> {
        PageCrudConfig.before_save(record, data)
    }
}

fn broken_pages(app: &TestApp) -> Arc<dyn CrudResource> {
    Registry::builder(app.state.config.admin.locales())
        .register_as("broken-pages", BrokenPageConfig)
        .build()
        .unwrap()
        .resolve("broken-pages")
        .unwrap()
}

fn upload() -> UploadedFile {
    UploadedFile {
        filename: "cover.png".into(),
        content_type: Some("image/png".into()),
        bytes: png(3, 3),
    }
}

mod atomic_saves {
    use super::*;

    #[tokio::test]
    async fn failed_relation_sync_rolls_back_the_update() {
        let app = TestApp::spawn().await;
        let token = app.admin_token().await;
        let id = app.create_page(&token, "Original").await;
        let ctx = app.state.crud_context();
        let actor = Superuser(app.admin_id().await);

        let mut form = EditController::initialize(&ctx, broken_pages(&app), &actor, Some(id), None)
            .await
            .unwrap();
        form.fill("title", json!({"en": "Changed"})).unwrap();
        form.fill("status", json!("published")).unwrap();
        form.attach_files("cover", vec![upload()]).unwrap();
        let err = form.save(&ctx, &actor).await.unwrap_err();

        assert!(matches!(err, CrudError::Persistence(_)));
        assert_eq!(err.notice().message, "Something went wrong. Please try again.");
        let stored = page::Entity::find_by_id(id).one(&app.db).await.unwrap().unwrap();
        assert_eq!(stored.title, json!({"en": "Original", "fr": ""}));
        assert_eq!(stored.status, "draft");
        assert!(stored.published_at.is_none());
        assert_eq!(attachment::Entity::find().count(&app.db).await.unwrap(), 0);
        let log = app.activity_for("page", id).await;
        assert!(log.iter().all(|e| e.category != "updated"));
    }

    #[tokio::test]
    async fn failed_relation_sync_leaves_no_new_row() {
        let app = TestApp::spawn().await;
        let ctx = app.state.crud_context();
        let actor = Superuser(app.admin_id().await);

        let mut form = EditController::initialize(&ctx, broken_pages(&app), &actor, None, None)
            .await
            .unwrap();
        form.fill("title", json!({"en": "Never"})).unwrap();
        let err = form.save(&ctx, &actor).await.unwrap_err();

        assert!(matches!(err, CrudError::Persistence(_)));
        assert_eq!(page::Entity::find().count(&app.db).await.unwrap(), 0);
        assert!(form.record_id().is_none());
    }
}

mod edit_state {
    use super::*;
    use backoffice::crud::form::FieldValue;

    #[tokio::test]
    async fn switching_locale_targets_plain_string_input() {
        let app = TestApp::spawn().await;
        let ctx = app.state.crud_context();
        let actor = Superuser(app.admin_id().await);
        let resource = app.state.registry.resolve("pages").unwrap();
        let mut form = EditController::initialize(&ctx, resource, &actor, None, None)
            .await
            .unwrap();

        form.fill("title", json!("Hello")).unwrap();
        form.set_locale("fr").unwrap();
        form.fill("title", json!("Bonjour")).unwrap();

        let Some(FieldValue::Translations(title)) = form.value("title") else {
            panic!("title should hold translations");
        };
        assert_eq!(title["en"], "Hello");
        assert_eq!(title["fr"], "Bonjour");
        assert!(matches!(form.set_locale("de"), Err(CrudError::Malformed(_))));
        assert_eq!(form.locale(), "fr");
    }

    #[tokio::test]
    async fn saved_form_rehydrates_from_the_stored_record() {
        let app = TestApp::spawn().await;
        let ctx = app.state.crud_context();
        let actor = Superuser(app.admin_id().await);
        let resource = app.state.registry.resolve("users").unwrap();
        let mut form = EditController::initialize(&ctx, resource, &actor, None, None)
            .await
            .unwrap();

        form.fill_all(Map::from_iter([
            ("name".to_string(), json!("Ada")),
            ("email".to_string(), json!("ada@example.com")),
            ("password".to_string(), json!("analytical")),
            ("password_confirmation".to_string(), json!("analytical")),
        ]))
        .unwrap();
        let notice = form.save(&ctx, &actor).await.unwrap();

        assert_eq!(notice.message, "User created.");
        assert!(form.record_id().is_some());
        assert_eq!(form.value("password"), Some(&FieldValue::Scalar(json!(""))));
        assert_eq!(
            form.value("password_confirmation"),
            Some(&FieldValue::Scalar(json!("")))
        );
        assert_eq!(form.value("email"), Some(&FieldValue::Scalar(json!("ada@example.com"))));
    }
}

mod list_state {
    use super::*;

    fn pages(app: &TestApp) -> ListController {
        let resource = app.state.registry.resolve("pages").unwrap();
        ListController::mount(resource, &Superuser(1), None).unwrap()
    }

    #[tokio::test]
    async fn sorting_the_same_column_flips_and_a_new_column_starts_ascending() {
        let app = TestApp::spawn().await;
        let mut list = pages(&app);

        list.sort("slug").unwrap();
        assert_eq!(list.sort_state(), ("slug", SortDirection::Asc));
        list.sort("slug").unwrap();
        assert_eq!(list.sort_state(), ("slug", SortDirection::Desc));
        list.sort("status").unwrap();
        assert_eq!(list.sort_state(), ("status", SortDirection::Asc));
    }

    #[tokio::test]
    async fn every_navigation_returns_to_the_first_page() {
        let app = TestApp::spawn().await;
        let mut list = pages(&app);

        list.go_to_page(4);
        list.search("hello");
        assert_eq!(list.page(), 1);

        list.go_to_page(4);
        list.apply_filter("status", json!("draft")).unwrap();
        assert_eq!(list.page(), 1);

        list.go_to_page(4);
        list.sort("slug").unwrap();
        assert_eq!(list.page(), 1);

        list.go_to_page(4);
        list.set_page_size(50);
        assert_eq!(list.page(), 1);
    }

    #[tokio::test]
    async fn filters_are_idempotent_and_cleared_by_empty_values() {
        let app = TestApp::spawn().await;
        let mut list = pages(&app);

        list.apply_filter("status", json!("draft")).unwrap();
        let once = list.active_filters().clone();
        list.apply_filter("status", json!("draft")).unwrap();
        assert_eq!(list.active_filters(), &once);

        list.apply_filter("status", json!("")).unwrap();
        assert!(list.active_filters().is_empty());
        list.apply_filter("is_featured", Value::Null).unwrap();
        assert!(list.active_filters().is_empty());
    }

    #[tokio::test]
    async fn navigating_abandons_a_staged_deletion() {
        let app = TestApp::spawn().await;
        let mut list = pages(&app);
        let actor = Superuser(1);

        list.request_delete(&actor, 7).unwrap();
        assert_eq!(list.pending_delete(), Some(7));
        list.search("other");
        assert_eq!(list.pending_delete(), None);

        list.request_delete(&actor, 7).unwrap();
        list.go_to_page(2);
        assert_eq!(list.pending_delete(), None);
    }

    #[tokio::test]
    async fn confirming_with_nothing_staged_fails() {
        let app = TestApp::spawn().await;
        let mut list = pages(&app);

        let err = list
            .confirm_delete(&app.state.crud_context(), &Superuser(1))
            .await
            .unwrap_err();

        assert!(matches!(err, CrudError::NoPendingDeletion));
    }

    #[tokio::test]
    async fn reset_restores_configured_defaults() {
        let app = TestApp::spawn().await;
        let mut list = pages(&app);
        list.search("x");
        list.apply_filter("status", json!("draft")).unwrap();
        list.sort("slug").unwrap();

        list.reset_filters();

        assert!(list.active_filters().is_empty());
        assert_eq!(list.sort_state(), ("updated_at", SortDirection::Desc));
        assert_eq!(list.query().search, "");
    }
}
