use std::sync::Arc;

use serde_json::{Map, Value};

use crate::crud::CrudError;
use crate::crud::config::{EntityConfig, RuleContext};
use crate::crud::descriptor::{
    Column, EntityDescriptor, Field, FieldType, Filter, FilterType, SelectOption, SortDirection,
};
use crate::crud::relation::{Backlink, EntityOptions, Lookup, ReferencedBy};
use crate::crud::resource::{Record, as_i32};
use crate::crud::translatable;
use crate::crud::validation::{Rule, RuleSet};
use crate::entity::{page_term, term};
use crate::utils::slug::slugify;

pub const TAXONOMIES: [&str; 2] = ["category", "tag"];

pub struct TermCrudConfig;

fn taxonomy_options() -> Vec<SelectOption> {
    vec![
        SelectOption::new("category", "Category"),
        SelectOption::new("tag", "Tag"),
    ]
}

impl EntityConfig for TermCrudConfig {
    type Entity = term::Entity;
    type Model = term::Model;
    type ActiveModel = term::ActiveModel;

    fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor::new("Term", "Terms", "terms")
            .searchable(["name", "slug"])
            .default_sort("position", SortDirection::Asc)
            .column(Column::new("name", "Name"))
            .column(Column::new("slug", "Slug").sortable())
            .column(Column::new("taxonomy", "Taxonomy").sortable())
            .column(Column::new("position", "Position").sortable())
            .field(Field::new("name", "Name", FieldType::Text).translatable())
            .field(Field::new("slug", "Slug", FieldType::Text).span(6))
            .field(
                Field::new("taxonomy", "Taxonomy", FieldType::Select)
                    .options(taxonomy_options())
                    .default_value("category")
                    .span(6),
            )
            .field(
                Field::new("parent_id", "Parent", FieldType::Select)
                    .options_from("parents")
                    .span(6),
            )
            .field(
                Field::new("position", "Position", FieldType::Number)
                    .default_value(0)
                    .span(6),
            )
            .filter(
                Filter::new("taxonomy", "Taxonomy", FilterType::Select)
                    .options(taxonomy_options()),
            )
    }

    fn lookups(&self) -> Vec<Lookup> {
        vec![Lookup::new(
            "parents",
            EntityOptions::<term::Entity>::new(term::Column::Id, "name"),
        )]
    }

    fn referenced_by(&self) -> Vec<Arc<dyn Backlink>> {
        vec![Arc::new(ReferencedBy::<page_term::Entity>::new(page_term::Column::TermId))]
    }

    fn validation_rules(&self, cx: RuleContext<'_>) -> RuleSet {
        RuleSet::new()
            .field(format!("name.{}", cx.fallback_locale), [Rule::Required, Rule::Max(255.0)])
            .field("slug", [Rule::Slug, Rule::Max(255.0)])
            .field("taxonomy", [Rule::Required, Rule::one_of(TAXONOMIES)])
            .field("parent_id", [Rule::Integer])
            .field("position", [Rule::Integer, Rule::Min(0.0)])
    }

    fn before_save(
        &self,
        record: Option<&Record>,
        data: &mut Map<String, Value>,
    ) -> Result<(), CrudError> {
        if let (Some(record), Some(parent)) = (record, data.get("parent_id").and_then(as_i32))
            && parent == record.id
        {
            return Err(CrudError::validation("parent_id", "A term cannot be its own parent."));
        }
        let slug_missing = data
            .get("slug")
            .and_then(Value::as_str)
            .is_none_or(|s| s.trim().is_empty());
        if slug_missing {
            let name = data
                .get("name")
                .map(|n| translatable::text_for(n, "", ""))
                .unwrap_or_default();
            data.insert("slug".into(), Value::String(slugify(&name)));
        }
        if data.get("position").is_some_and(Value::is_null) {
            data.insert("position".into(), Value::from(0));
        }
        Ok(())
    }
}
