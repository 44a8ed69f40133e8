use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::config::EntityConfig;
use super::descriptor::{ColumnType, FieldType, Locale};
use super::error::CrudError;
use super::resource::{ConfiguredResource, CrudResource};

/// Route alias for a configuration type: `crate::configs::PageCrudConfig`
/// becomes `pages`, `CategoryConfig` becomes `categories`.
pub fn derive_alias(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let base = base.rsplit("::").next().unwrap_or(base);
    let stem = base
        .strip_suffix("CrudConfig")
        .or_else(|| base.strip_suffix("Config"))
        .filter(|s| !s.is_empty())
        .unwrap_or(base);
    pluralize(&stem.to_lowercase())
}

fn pluralize(word: &str) -> String {
    let mut chars = word.chars().rev();
    let last = chars.next();
    let before = chars.next();
    match (before, last) {
        (Some(b), Some('y')) if !"aeiou".contains(b) => format!("{}ies", &word[..word.len() - 1]),
        (_, Some('s' | 'x' | 'z')) => format!("{word}es"),
        (Some('c' | 's'), Some('h')) => format!("{word}es"),
        _ => format!("{word}s"),
    }
}

/// Alias -> pre-built resource, fixed at startup.
pub struct Registry {
    by_alias: HashMap<String, Arc<dyn CrudResource>>,
    order: Vec<String>,
}

impl Registry {
    pub fn builder(locales: Vec<Locale>) -> RegistryBuilder {
        RegistryBuilder {
            locales,
            resources: Vec::new(),
        }
    }

    pub fn resolve(&self, alias: &str) -> Result<Arc<dyn CrudResource>, CrudError> {
        self.by_alias
            .get(alias)
            .cloned()
            .ok_or_else(|| CrudError::ConfigurationNotFound(alias.to_string()))
    }

    /// Resource whose entity table is `owner_type`.
    pub fn by_owner_type(&self, owner_type: &str) -> Option<Arc<dyn CrudResource>> {
        self.iter().find(|r| r.owner_type() == owner_type).cloned()
    }

    /// Resources in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CrudResource>> {
        self.order.iter().filter_map(|alias| self.by_alias.get(alias))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub struct RegistryBuilder {
    locales: Vec<Locale>,
    resources: Vec<Arc<dyn CrudResource>>,
}

impl RegistryBuilder {
    /// Register under the alias derived from the configuration's type name.
    pub fn register<C: EntityConfig>(self, config: C) -> Self {
        let alias = derive_alias(std::any::type_name::<C>());
        self.register_as(alias, config)
    }

    pub fn register_as<C: EntityConfig>(mut self, alias: impl Into<String>, config: C) -> Self {
        let resource = ConfiguredResource::new(alias, config);
        let mut descriptor = resource.descriptor().clone();
        descriptor.locales = self.locales.clone();
        self.resources
            .push(Arc::new(resource.with_descriptor(descriptor)));
        self
    }

    /// Check every configuration against its entity and freeze the table.
    pub fn build(self) -> Result<Registry, CrudError> {
        if self.locales.is_empty() {
            return Err(CrudError::InvalidConfiguration(
                "at least one locale must be configured".into(),
            ));
        }
        let mut by_alias = HashMap::with_capacity(self.resources.len());
        let mut order = Vec::with_capacity(self.resources.len());
        for resource in self.resources {
            check(resource.as_ref())?;
            let alias = resource.alias().to_string();
            if by_alias.insert(alias.clone(), resource).is_some() {
                return Err(CrudError::InvalidConfiguration(format!(
                    "alias `{alias}` is registered twice"
                )));
            }
            debug!(alias = %alias, "registered CRUD resource");
            order.push(alias);
        }
        Ok(Registry { by_alias, order })
    }
}

fn check(resource: &dyn CrudResource) -> Result<(), CrudError> {
    let d = resource.descriptor();
    let fail = |msg: String| {
        Err(CrudError::InvalidConfiguration(format!("{}: {msg}", resource.alias())))
    };

    let mut seen = std::collections::HashSet::new();
    for field in &d.fields {
        if !seen.insert(field.name.as_str()) {
            return fail(format!("field `{}` is declared twice", field.name));
        }
        if field.translatable && field.relationship.is_some() {
            return fail(format!(
                "field `{}` cannot be both translatable and a relationship",
                field.name
            ));
        }
        if let Some(relation) = &field.relationship
            && resource.relation(relation).is_none()
        {
            return fail(format!("field `{}` names unknown relation `{relation}`", field.name));
        }
        if let Some(source) = &field.options_from
            && resource.option_source(source).is_none()
        {
            return fail(format!("field `{}` names unknown option source `{source}`", field.name));
        }
        let needs_options = matches!(field.kind, FieldType::Select | FieldType::Multiselect);
        if needs_options
            && field.options.is_empty()
            && field.options_from.is_none()
            && field.relationship.is_none()
        {
            return fail(format!("select field `{}` has no options", field.name));
        }
        let stored_directly =
            field.persist && field.relationship.is_none() && !field.kind.is_file();
        if stored_directly && !resource.has_column(&field.name) {
            return fail(format!("field `{}` has no column", field.name));
        }
    }

    for column in &d.columns {
        if column.kind == ColumnType::Badge && column.color_map.is_none() {
            return fail(format!("badge column `{}` needs a color map", column.key));
        }
        if column.sortable && !resource.has_column(&column.key) {
            return fail(format!("sortable column `{}` is not an entity column", column.key));
        }
    }
    for name in &d.searchable {
        if !resource.has_column(name) {
            return fail(format!("searchable field `{name}` is not an entity column"));
        }
    }
    if !resource.has_column(&d.default_sort) {
        return fail(format!("default sort `{}` is not an entity column", d.default_sort));
    }
    for filter in &d.filters {
        let known = if filter.is_relationship {
            resource.relation(&filter.field).is_some()
        } else {
            resource.has_column(&filter.field)
        };
        if !known {
            return fail(format!("filter `{}` matches nothing", filter.field));
        }
    }
    for name in &d.eager_load {
        if resource.relation(name).is_none() {
            return fail(format!("eager load `{name}` has no relation"));
        }
    }
    Ok(())
}
