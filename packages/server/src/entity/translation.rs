use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// UI string keyed by `group.key`, with one text per locale.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "translation")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub group: String,

    pub key: String,

    /// Locale code -> text.
    pub text: Json,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
