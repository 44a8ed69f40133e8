use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activity_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// `created`, `updated`, `deleted` or a free-form service category.
    #[sea_orm(indexed)]
    pub category: String,

    pub subject_type: String,

    pub subject_id: Option<i32>,

    /// User who performed the action. Not a foreign key: entries outlive users.
    pub causer_id: Option<i32>,

    pub properties: Json,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
