use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::shared::Pagination;
use crate::entity::activity_log;

/// Query parameters for browsing the activity log.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActivityListQuery {
    /// `created`, `updated`, `deleted` or a service category.
    pub category: Option<String>,
    /// Owner type such as `page` or `setting`.
    pub subject_type: Option<String>,
    pub subject_id: Option<i32>,
    /// Page number (1-based). Default: 1.
    pub page: Option<u64>,
    /// Items per page (1-100). Default: 20.
    pub per_page: Option<u64>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ActivityResponse {
    pub id: i32,
    #[schema(example = "updated")]
    pub category: String,
    #[schema(example = "page")]
    pub subject_type: String,
    pub subject_id: Option<i32>,
    pub causer_id: Option<i32>,
    #[schema(value_type = Object)]
    pub properties: Value,
    pub created_at: DateTime<Utc>,
}

impl From<activity_log::Model> for ActivityResponse {
    fn from(row: activity_log::Model) -> Self {
        Self {
            id: row.id,
            category: row.category,
            subject_type: row.subject_type,
            subject_id: row.subject_id,
            causer_id: row.causer_id,
            properties: row.properties,
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ActivityListResponse {
    pub data: Vec<ActivityResponse>,
    pub pagination: Pagination,
}
