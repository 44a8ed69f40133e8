use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A stored file. Rows live as long as at least one `attachable` link
/// points at them.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "attachment")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Original upload filename.
    pub filename: String,

    /// Content hash of the blob holding the bytes.
    #[sea_orm(indexed)]
    pub storage_path: String,

    pub disk: String,

    pub mime_type: String,

    pub byte_size: i64,

    pub collection_name: String,

    /// `{ "width": .., "height": .. }` for images, `{}` otherwise.
    pub metadata: Json,

    #[sea_orm(has_many)]
    pub links: HasMany<super::attachable::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
