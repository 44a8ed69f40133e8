use serde_json::{Map, Value};

use crate::crud::CrudError;
use crate::crud::config::{EntityConfig, RuleContext};
use crate::crud::descriptor::{
    BadgeColor, ColorMap, Column, EntityDescriptor, Field, FieldType, Filter, FilterType,
    SortDirection,
};
use crate::crud::relation::{ManyToMany, Relation};
use crate::crud::resource::Record;
use crate::crud::validation::{Rule, RuleSet};
use crate::entity::{role, user, user_role};
use crate::utils::hash::hash_password;

pub struct UserCrudConfig;

impl EntityConfig for UserCrudConfig {
    type Entity = user::Entity;
    type Model = user::Model;
    type ActiveModel = user::ActiveModel;

    fn descriptor(&self) -> EntityDescriptor {
        EntityDescriptor::new("User", "Users", "users")
            .searchable(["name", "email"])
            .default_sort("name", SortDirection::Asc)
            .column(Column::new("avatar", "").image())
            .column(Column::new("name", "Name").sortable())
            .column(Column::new("email", "Email").sortable())
            .column(Column::new("roles", "Roles"))
            .column(
                Column::new("is_active", "Active").sortable().badge(
                    ColorMap::new()
                        .with(true, BadgeColor::Green)
                        .with(false, BadgeColor::Red),
                ),
            )
            .column(Column::new("created_at", "Joined").sortable())
            .field(Field::new("name", "Name", FieldType::Text).span(6))
            .field(Field::new("email", "Email", FieldType::Email).span(6))
            .field(Field::new("password", "Password", FieldType::Password).span(6))
            .field(
                Field::new("password_confirmation", "Confirm password", FieldType::Password)
                    .write_only()
                    .span(6),
            )
            .field(Field::new("is_active", "Active", FieldType::Checkbox).default_value(true))
            .field(Field::new("roles", "Roles", FieldType::Multiselect).relationship("roles"))
            .field(Field::new("avatar", "Avatar", FieldType::Circular))
            .filter(Filter::new("is_active", "Active", FilterType::Boolean))
            .filter(Filter::new("roles", "Role", FilterType::Select).through_relationship())
            .eager_load("roles")
    }

    fn relations(&self) -> Vec<Relation> {
        vec![Relation::new(
            "roles",
            ManyToMany::<user_role::Entity, role::Entity>::new(
                user_role::Column::UserId,
                user_role::Column::RoleId,
                role::Column::Id,
                "name",
            ),
        )]
    }

    fn validation_rules(&self, cx: RuleContext<'_>) -> RuleSet {
        let mut password = vec![Rule::Min(8.0), Rule::Confirmed];
        if cx.is_new() {
            password.insert(0, Rule::Required);
        }
        RuleSet::new()
            .field("name", [Rule::Required, Rule::Max(255.0)])
            .field(
                "email",
                [Rule::Required, Rule::Email, Rule::unique("email", cx.record_id())],
            )
            .field("password", password)
            .field("is_active", [Rule::Boolean])
            .field("avatar", [Rule::Image, Rule::MaxKilobytes(2048)])
    }

    /// Hash a new password; an empty one keeps the stored hash.
    fn before_save(
        &self,
        _record: Option<&Record>,
        data: &mut Map<String, Value>,
    ) -> Result<(), CrudError> {
        match data.get("password").and_then(Value::as_str) {
            Some(plain) if !plain.is_empty() => {
                let hashed = hash_password(plain)
                    .map_err(|e| CrudError::InvalidConfiguration(e.to_string()))?;
                data.insert("password".into(), Value::String(hashed));
            }
            _ => {
                data.remove("password");
            }
        }
        if let Some(Value::String(email)) = data.get_mut("email") {
            *email = email.trim().to_lowercase();
        }
        Ok(())
    }

    fn hidden_attributes(&self) -> &'static [&'static str] {
        &["password"]
    }

    fn affects_permissions(&self) -> bool {
        true
    }
}
