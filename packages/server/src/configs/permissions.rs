use std::sync::Arc;

use crate::crud::config::{EntityConfig, RuleContext};
use crate::crud::descriptor::{Column, EntityDescriptor, Field, FieldType, SortDirection};
use crate::crud::relation::{Backlink, ReferencedBy};
use crate::crud::validation::{Rule, RuleSet};
use crate::entity::{permission, role_permission};

pub struct PermissionCrudConfig;

impl EntityConfig for PermissionCrudConfig {
    type Entity = permission::Entity;
    type Model = permission::Model;
    type ActiveModel = permission::ActiveModel;

    fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor::new("Permission", "Permissions", "permissions")
            .searchable(["slug", "description"])
            .default_sort("slug", SortDirection::Asc)
            .column(Column::new("slug", "Slug").sortable())
            .column(Column::new("description", "Description"))
            .field(Field::new("slug", "Slug", FieldType::Text).span(6))
            .field(Field::new("description", "Description", FieldType::Text).span(6))
    }

    fn referenced_by(&self) -> Vec<Arc<dyn Backlink>> {
        vec![Arc::new(ReferencedBy::<role_permission::Entity>::new(
            role_permission::Column::PermissionId,
        ))]
    }

    fn validation_rules(&self, cx: RuleContext<'_>) -> RuleSet {
        RuleSet::new()
            .field(
                "slug",
                [Rule::Required, Rule::Max(128.0), Rule::unique("slug", cx.record_id())],
            )
            .field("description", [Rule::Max(255.0)])
    }

    fn affects_permissions(&self) -> bool {
        true
    }
}
