use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "page")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Locale code -> title.
    pub title: Json,

    /// Locale code -> rich-text body.
    pub body: Json,

    #[sea_orm(unique)]
    pub slug: String,

    /// One of `draft`, `published`, `archived`.
    pub status: String,

    #[sea_orm(default_value = false)]
    pub is_featured: bool,

    pub published_at: Option<DateTimeUtc>,

    #[sea_orm(has_many, via = "page_term")]
    pub terms: HasMany<super::term::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
