use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A node in a taxonomy tree (categories, tags).
///
/// `parent_id` points at another term of the same taxonomy. Cycles are not
/// prevented at the storage level.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "term")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Locale code -> display name.
    pub name: Json,

    pub slug: String,

    pub taxonomy: String,

    pub parent_id: Option<i32>,

    #[sea_orm(default_value = 0)]
    pub position: i32,

    #[sea_orm(has_many, via = "page_term")]
    pub pages: HasMany<super::page::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
