use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, EntityTrait, FromQueryResult, IntoActiveModel,
    ModelTrait,
};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::descriptor::EntityDescriptor;
use super::error::CrudError;
use super::relation::{Backlink, Lookup, Relation};
use super::resource::Record;
use super::validation::RuleSet;

/// Inputs available when building validation rules.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// `None` while creating.
    pub record: Option<&'a Record>,
    /// Locale tab the user is editing.
    pub locale: &'a str,
    /// First configured locale; translatable fields are usually required here.
    pub fallback_locale: &'a str,
}

impl RuleContext<'_> {
    pub fn record_id(&self) -> Option<i32> {
        self.record.map(|r| r.id)
    }

    pub fn is_new(&self) -> bool {
        self.record.is_none()
    }
}

/// Everything the generic list and edit controllers need to manage one
/// entity type.
pub trait EntityConfig: Send + Sync + 'static {
    type Entity: EntityTrait<Model = Self::Model, ActiveModel = Self::ActiveModel>;
    type Model: ModelTrait<Entity = Self::Entity>
        + FromQueryResult
        + IntoActiveModel<Self::ActiveModel>
        + Serialize
        + DeserializeOwned
        + Clone
        + Send
        + Sync;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity> + ActiveModelBehavior + Send + Sync;

    fn descriptor(&self) -> EntityDescriptor;

    /// Many-to-many associations referenced by `relationship` fields,
    /// relationship filters and eager loads.
    fn relations(&self) -> Vec<Relation> {
        Vec::new()
    }

    /// Junction tables on the far side of other entities' relations that
    /// point at this one. Their rows are removed with the record.
    fn referenced_by(&self) -> Vec<Arc<dyn Backlink>> {
        Vec::new()
    }

    /// Option sources referenced by `options_from`.
    fn lookups(&self) -> Vec<Lookup> {
        Vec::new()
    }

    /// Rebuilt on every validation pass.
    fn validation_rules(&self, cx: RuleContext<'_>) -> RuleSet;

    /// Adjust plain attributes before they are written (slugs, hashes).
    fn before_save(
        &self,
        _record: Option<&Record>,
        _data: &mut Map<String, Value>,
    ) -> Result<(), CrudError> {
        Ok(())
    }

    /// Unique columns `before_save` may fill in itself. A taken value gets
    /// a numeric suffix instead of failing validation.
    fn suffix_when_taken(&self) -> &'static [&'static str] {
        &[]
    }

    /// Attributes never exposed in list rows or activity payloads.
    fn hidden_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Writes to this entity change who holds which permission.
    fn affects_permissions(&self) -> bool {
        false
    }
}
