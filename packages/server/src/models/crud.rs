use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crud::descriptor::{Ability, SortDirection};
use crate::crud::edit::FormView;
use crate::crud::{CrudResource, ListController, Notice};
use crate::error::AppError;

/// A resource the caller may at least list.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ResourceSummary {
    #[schema(example = "pages")]
    pub alias: String,
    #[schema(example = "Page")]
    pub entity_name: String,
    #[schema(example = "Pages")]
    pub plural_name: String,
    /// Abilities the caller holds on this resource.
    #[schema(example = json!(["viewAny", "create", "update"]))]
    pub abilities: Vec<String>,
}

impl ResourceSummary {
    /// `None` unless `granted` includes `viewAny`.
    pub fn for_resource(
        resource: &dyn CrudResource,
        granted: impl Fn(&str) -> bool,
    ) -> Option<Self> {
        let descriptor = resource.descriptor();
        let abilities: Vec<String> = Ability::ALL
            .into_iter()
            .filter(|ability| granted(&descriptor.permission(*ability)))
            .map(|ability| ability.as_str().to_string())
            .collect();
        if !abilities.iter().any(|a| a == Ability::ViewAny.as_str()) {
            return None;
        }
        Some(Self {
            alias: resource.alias().to_string(),
            entity_name: descriptor.entity_name.clone(),
            plural_name: descriptor.plural_name.clone(),
            abilities,
        })
    }
}

/// Query string of the list endpoint.
///
/// Filters use `filter[field]=value`; an empty value clears the filter.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ListParams {
    pub search: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<SortDirection>,
    pub per_page: Option<u64>,
    pub page: Option<u64>,
    pub locale: Option<String>,
    pub filters: Vec<(String, Value)>,
}

impl ListParams {
    pub fn from_query(query: HashMap<String, String>) -> Result<Self, AppError> {
        let mut params = ListParams::default();
        for (key, value) in query {
            match key.as_str() {
                "search" => params.search = Some(value),
                "sort" => params.sort = Some(value),
                "direction" => {
                    params.direction = Some(SortDirection::parse(&value).ok_or_else(|| {
                        AppError::Validation("direction must be `asc` or `desc`".into())
                    })?)
                }
                "per_page" => params.per_page = Some(parse_number(&key, &value)?),
                "page" => params.page = Some(parse_number(&key, &value)?),
                "locale" => params.locale = Some(value),
                _ => {
                    if let Some(field) = key
                        .strip_prefix("filter[")
                        .and_then(|rest| rest.strip_suffix(']'))
                    {
                        params.filters.push((field.to_string(), Value::String(value)));
                    }
                }
            }
        }
        params.filters.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(params)
    }

    /// Replay the query onto a freshly mounted controller. Page selection
    /// goes last since every other change returns to page 1.
    pub fn apply(&self, list: &mut ListController, page_size: u64) -> Result<(), AppError> {
        if let Some(term) = &self.search {
            list.search(term);
        }
        for (field, value) in &self.filters {
            list.apply_filter(field, value.clone())?;
        }
        match (&self.sort, self.direction) {
            (Some(field), Some(direction)) => list.set_sort(field, direction)?,
            (Some(field), None) => list.sort(field)?,
            (None, _) => {}
        }
        list.set_page_size(page_size);
        if let Some(page) = self.page {
            list.go_to_page(page);
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("`{key}` must be a positive integer")))
}

/// `?locale=` on form endpoints.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LocaleParams {
    /// Locale code of the active translation tab.
    pub locale: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RemoveAttachmentParams {
    /// Restrict removal to a collection.
    pub collection: Option<String>,
}

/// A flash message after an action.
#[derive(Serialize, utoipa::ToSchema)]
pub struct NoticeResponse {
    pub notice: Notice,
}

/// Result of a create or update: the message and the re-rendered form.
#[derive(Serialize, utoipa::ToSchema)]
pub struct SaveResponse {
    pub notice: Notice,
    pub form: FormView,
}

/// Deletion waiting for confirmation.
#[derive(Serialize, utoipa::ToSchema)]
pub struct PendingDeleteResponse {
    #[schema(example = 7)]
    pub pending_delete: i32,
    /// Question to show the user.
    #[schema(example = "Delete this Page? This cannot be undone.")]
    pub confirm: String,
}
