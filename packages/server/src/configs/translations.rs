use crate::crud::config::{EntityConfig, RuleContext};
use crate::crud::descriptor::{Column, EntityDescriptor, Field, FieldType, SortDirection};
use crate::crud::validation::{Rule, RuleSet};
use crate::entity::translation;

pub struct TranslationCrudConfig;

impl EntityConfig for TranslationCrudConfig {
    type Entity = translation::Entity;
    type Model = translation::Model;
    type ActiveModel = translation::ActiveModel;

    fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor::new("Translation", "Translations", "translations")
            .searchable(["group", "key", "text"])
            .default_sort("group", SortDirection::Asc)
            .column(Column::new("key", "Key").sortable().template("{group}.{key}"))
            .column(Column::new("text", "Text"))
            .column(Column::new("group", "Group").sortable())
            .field(Field::new("group", "Group", FieldType::Text).span(4))
            .field(Field::new("key", "Key", FieldType::Text).span(8))
            .field(Field::new("text", "Text", FieldType::Textarea).translatable())
    }

    fn validation_rules(&self, cx: RuleContext<'_>) -> RuleSet {
        RuleSet::new()
            .field("group", [Rule::Required, Rule::Slug, Rule::Max(64.0)])
            .field("key", [Rule::Required, Rule::Max(255.0)])
            .field(format!("text.{}", cx.fallback_locale), [Rule::Required])
    }
}
