use std::sync::Arc;

use crate::crud::config::{EntityConfig, RuleContext};
use crate::crud::descriptor::{Column, EntityDescriptor, Field, FieldType, SortDirection};
use crate::crud::relation::{Backlink, ManyToMany, ReferencedBy, Relation};
use crate::crud::validation::{Rule, RuleSet};
use crate::entity::{permission, role, role_permission, user_role};

pub struct RoleCrudConfig;

impl EntityConfig for RoleCrudConfig {
    type Entity = role::Entity;
    type Model = role::Model;
    type ActiveModel = role::ActiveModel;

    fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor::new("Role", "Roles", "roles")
            .searchable(["name", "description"])
            .default_sort("name", SortDirection::Asc)
            .column(Column::new("name", "Name").sortable())
            .column(Column::new("description", "Description"))
            .column(Column::new("permissions", "Permissions"))
            .field(Field::new("name", "Name", FieldType::Text))
            .field(Field::new("description", "Description", FieldType::Textarea))
            .field(
                Field::new("permissions", "Permissions", FieldType::Multiselect)
                    .relationship("permissions"),
            )
            .eager_load("permissions")
    }

    fn relations(&self) -> Vec<Relation> {
        vec![Relation::new(
            "permissions",
            ManyToMany::<role_permission::Entity, permission::Entity>::new(
                role_permission::Column::RoleId,
                role_permission::Column::PermissionId,
                permission::Column::Id,
                "slug",
            ),
        )]
    }

    fn referenced_by(&self) -> Vec<Arc<dyn Backlink>> {
        vec![Arc::new(ReferencedBy::<user_role::Entity>::new(user_role::Column::RoleId))]
    }

    fn validation_rules(&self, cx: RuleContext<'_>) -> RuleSet {
        RuleSet::new()
            .field(
                "name",
                [Rule::Required, Rule::Max(64.0), Rule::unique("name", cx.record_id())],
            )
            .field("description", [Rule::Max(1000.0)])
    }

    fn affects_permissions(&self) -> bool {
        true
    }
}
