use chrono::Utc;
use serde_json::{Map, Value};

use crate::crud::CrudError;
use crate::crud::config::{EntityConfig, RuleContext};
use crate::crud::descriptor::{
    BadgeColor, ColorMap, Column, EntityDescriptor, Field, FieldType, Filter, FilterType,
    SelectOption, SortDirection,
};
use crate::crud::relation::{ManyToMany, Relation};
use crate::crud::resource::Record;
use crate::crud::translatable;
use crate::crud::validation::{Rule, RuleSet};
use crate::entity::{page, page_term, term};
use crate::utils::slug::slugify;

pub const STATUSES: [&str; 3] = ["draft", "published", "archived"];

pub struct PageCrudConfig;

fn status_options() -> Vec<SelectOption> {
    vec![
        SelectOption::new("draft", "Draft"),
        SelectOption::new("published", "Published"),
        SelectOption::new("archived", "Archived"),
    ]
}

impl EntityConfig for PageCrudConfig {
    type Entity = page::Entity;
    type Model = page::Model;
    type ActiveModel = page::ActiveModel;

    fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor::new("Page", "Pages", "pages")
            .searchable(["title", "slug"])
            .default_sort("updated_at", SortDirection::Desc)
            .column(Column::new("cover", "").image())
            .column(Column::new("title", "Title"))
            .column(Column::new("slug", "Slug").sortable())
            .column(
                Column::new("status", "Status").sortable().badge(
                    ColorMap::new()
                        .with("draft", BadgeColor::Yellow)
                        .with("published", BadgeColor::Green)
                        .with("archived", BadgeColor::Gray),
                ),
            )
            .column(
                Column::new("is_featured", "Featured").badge(
                    ColorMap::new()
                        .with(true, BadgeColor::Indigo)
                        .with(false, BadgeColor::Gray),
                ),
            )
            .column(Column::new("terms", "Terms"))
            .column(Column::new("updated_at", "Updated").sortable())
            .field(Field::new("title", "Title", FieldType::Text).translatable().span(8))
            .field(Field::new("slug", "Slug", FieldType::Text).span(4))
            .field(Field::new("body", "Body", FieldType::Editor).translatable())
            .field(
                Field::new("status", "Status", FieldType::Select)
                    .options(status_options())
                    .default_value("draft")
                    .span(6),
            )
            .field(
                Field::new("is_featured", "Featured", FieldType::Checkbox)
                    .default_value(false)
                    .span(6),
            )
            .field(Field::new("terms", "Terms", FieldType::Multiselect).relationship("terms"))
            .field(Field::new("cover", "Cover image", FieldType::FileUpload))
            .field(
                Field::new("gallery", "Gallery", FieldType::FileUpload)
                    .multiple()
                    .collection("gallery"),
            )
            .filter(Filter::new("status", "Status", FilterType::Select).options(status_options()))
            .filter(Filter::new("is_featured", "Featured", FilterType::Boolean))
            .filter(Filter::new("terms", "Term", FilterType::Select).through_relationship())
            .filter(Filter::new("created_at", "Created on", FilterType::Date))
            .eager_load("terms")
    }

    fn relations(&self) -> Vec<Relation> {
        vec![Relation::new(
            "terms",
            ManyToMany::<page_term::Entity, term::Entity>::new(
                page_term::Column::PageId,
                page_term::Column::TermId,
                term::Column::Id,
                "name",
            ),
        )]
    }

    fn validation_rules(&self, cx: RuleContext<'_>) -> RuleSet {
        RuleSet::new()
            .field(
                format!("title.{}", cx.fallback_locale),
                [Rule::Required, Rule::Max(255.0)],
            )
            .field(format!("title.{}", cx.locale), [Rule::Max(255.0)])
            .field(
                "slug",
                [Rule::Slug, Rule::Max(255.0), Rule::unique("slug", cx.record_id())],
            )
            .field("status", [Rule::Required, Rule::one_of(STATUSES)])
            .field("is_featured", [Rule::Boolean])
            .field("cover", [Rule::Image, Rule::MaxKilobytes(5120)])
            .field(
                "gallery",
                [Rule::mimes(["jpg", "jpeg", "png", "webp", "gif"]), Rule::MaxKilobytes(5120)],
            )
    }

    fn suffix_when_taken(&self) -> &'static [&'static str] {
        &["slug"]
    }

    /// Derive a missing slug from the title and stamp the first publication.
    fn before_save(
        &self,
        record: Option<&Record>,
        data: &mut Map<String, Value>,
    ) -> Result<(), CrudError> {
        let slug_missing = data
            .get("slug")
            .and_then(Value::as_str)
            .is_none_or(|s| s.trim().is_empty());
        if slug_missing {
            let title = data
                .get("title")
                .map(|t| translatable::text_for(t, "", ""))
                .unwrap_or_default();
            let slug = slugify(&title);
            if slug.is_empty() {
                return Err(CrudError::validation("slug", "The slug field is required."));
            }
            data.insert("slug".into(), Value::String(slug));
        }

        let publishing = data.get("status").and_then(Value::as_str) == Some("published");
        let already = record
            .and_then(|r| r.get("published_at"))
            .is_some_and(|v| !v.is_null());
        if publishing && !already {
            data.insert("published_at".into(), Value::String(Utc::now().to_rfc3339()));
        }
        Ok(())
    }
}
