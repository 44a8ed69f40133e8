use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::entity::activity_log;

pub const CREATED: &str = "created";
pub const UPDATED: &str = "updated";
pub const DELETED: &str = "deleted";

/// Append-only audit trail. Writing an entry never fails the operation
/// being audited.
#[derive(Clone)]
pub struct ActivityLogger {
    db: DatabaseConnection,
}

/// Filters for browsing the log.
#[derive(Debug, Clone, Default)]
pub struct ActivityQuery {
    pub category: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<i32>,
    pub page: u64,
    pub per_page: u64,
}

impl ActivityLogger {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn log(
        &self,
        category: &str,
        subject_type: &str,
        subject_id: Option<i32>,
        causer_id: Option<i32>,
        properties: Value,
    ) {
        let entry = activity_log::ActiveModel {
            category: Set(category.to_string()),
            subject_type: Set(subject_type.to_string()),
            subject_id: Set(subject_id),
            causer_id: Set(causer_id),
            properties: Set(properties),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        match entry.insert(&self.db).await {
            Ok(row) => debug!(id = row.id, category, subject_type, "activity recorded"),
            Err(e) => warn!(
                category,
                subject_type,
                ?subject_id,
                error = %e,
                "failed to record activity"
            ),
        }
    }

    pub async fn log_created(
        &self,
        subject_type: &str,
        id: i32,
        causer: Option<i32>,
        attributes: Value,
    ) {
        self.log(CREATED, subject_type, Some(id), causer, attributes).await;
    }

    pub async fn log_updated(
        &self,
        subject_type: &str,
        id: i32,
        causer: Option<i32>,
        changes: Value,
    ) {
        self.log(UPDATED, subject_type, Some(id), causer, changes).await;
    }

    pub async fn log_deleted(
        &self,
        subject_type: &str,
        id: i32,
        causer: Option<i32>,
        snapshot: Value,
    ) {
        self.log(DELETED, subject_type, Some(id), causer, snapshot).await;
    }

    /// Newest first, with the total number of matching entries.
    pub async fn list(
        &self,
        query: &ActivityQuery,
    ) -> Result<(Vec<activity_log::Model>, u64), DbErr> {
        let mut select = activity_log::Entity::find();
        if let Some(category) = &query.category {
            select = select.filter(activity_log::Column::Category.eq(category.as_str()));
        }
        if let Some(subject_type) = &query.subject_type {
            select = select.filter(activity_log::Column::SubjectType.eq(subject_type.as_str()));
        }
        if let Some(subject_id) = query.subject_id {
            select = select.filter(activity_log::Column::SubjectId.eq(subject_id));
        }
        let paginator = select
            .order_by_desc(activity_log::Column::CreatedAt)
            .order_by_desc(activity_log::Column::Id)
            .paginate(&self.db, query.per_page.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(query.page.saturating_sub(1)).await?;
        Ok((rows, total))
    }
}
