use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::setting;

#[derive(Serialize, utoipa::ToSchema)]
pub struct SettingResponse {
    #[schema(example = "site.name")]
    pub key: String,
    #[schema(example = "general")]
    pub group: String,
    #[schema(value_type = Object, example = json!("My site"))]
    pub value: Value,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&setting::Model> for SettingResponse {
    fn from(row: &setting::Model) -> Self {
        Self {
            key: row.key.clone(),
            group: row.group.clone(),
            value: row.value.clone(),
            description: row.description.clone(),
            updated_at: row.updated_at,
        }
    }
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateSettingRequest {
    /// Any JSON value.
    #[schema(value_type = Object, example = json!("Renamed site"))]
    pub value: Value,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UpdateSettingResponse {
    pub setting: SettingResponse,
    /// `false` when the stored value already matched.
    pub changed: bool,
}
