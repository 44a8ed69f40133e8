use std::collections::BTreeMap;
use std::sync::Arc;

use sea_orm::TransactionTrait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, instrument};

use super::attachments;
use super::descriptor::{Ability, ColumnType, FilterType, SelectOption, SortDirection};
use super::error::CrudError;
use super::notice::Notice;
use super::render::{Cell, render_cell};
use super::resource::{CrudResource, ListQuery, Record};
use super::{Actor, CrudContext};

pub const DEFAULT_PAGE_SIZE: u64 = 15;

/// Paginated, searchable, sortable listing of one resource.
///
/// Every state change that alters which rows are visible sends the user
/// back to page 1 and abandons a staged deletion.
pub struct ListController {
    resource: Arc<dyn CrudResource>,
    locale: String,
    search: String,
    filters: BTreeMap<String, Value>,
    sort_field: String,
    sort_direction: SortDirection,
    page_size: u64,
    page: u64,
    pending_delete: Option<i32>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ColumnHeader {
    pub key: String,
    pub label: String,
    pub sortable: bool,
    #[schema(value_type = String)]
    pub kind: ColumnType,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct FilterView {
    pub field: String,
    pub label: String,
    #[schema(value_type = String)]
    pub kind: FilterType,
    #[schema(value_type = Vec<Object>)]
    pub options: Vec<SelectOption>,
    #[schema(value_type = Object)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct RowView {
    pub id: i32,
    /// Keyed by column key.
    #[schema(value_type = Object)]
    pub cells: BTreeMap<String, Cell>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Pagination {
    pub total: u64,
    pub current_page: u64,
    pub last_page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ListView {
    pub alias: String,
    pub entity_name: String,
    pub plural_name: String,
    pub locale: String,
    pub search: String,
    pub sort_field: String,
    #[schema(value_type = String)]
    pub sort_direction: SortDirection,
    pub columns: Vec<ColumnHeader>,
    pub filters: Vec<FilterView>,
    pub rows: Vec<RowView>,
    pub pagination: Pagination,
    pub pending_delete: Option<i32>,
}

impl ListController {
    /// Requires `{prefix}.viewAny`. Sorting starts from the configured
    /// defaults.
    pub fn mount(
        resource: Arc<dyn CrudResource>,
        actor: &dyn Actor,
        locale: Option<&str>,
    ) -> Result<Self, CrudError> {
        let descriptor = resource.descriptor();
        actor.authorize(&descriptor.permission(Ability::ViewAny))?;

        let locale = locale
            .filter(|code| descriptor.has_locale(code))
            .unwrap_or(descriptor.fallback_locale())
            .to_string();
        Ok(Self {
            locale,
            search: String::new(),
            filters: BTreeMap::new(),
            sort_field: descriptor.default_sort.clone(),
            sort_direction: descriptor.default_direction,
            page_size: DEFAULT_PAGE_SIZE,
            page: 1,
            pending_delete: None,
            resource,
        })
    }

    pub fn resource(&self) -> &Arc<dyn CrudResource> {
        &self.resource
    }

    pub fn sort_state(&self) -> (&str, SortDirection) {
        (&self.sort_field, self.sort_direction)
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn active_filters(&self) -> &BTreeMap<String, Value> {
        &self.filters
    }

    pub fn pending_delete(&self) -> Option<i32> {
        self.pending_delete
    }

    fn navigated(&mut self) {
        self.page = 1;
        self.pending_delete = None;
    }

    pub fn search(&mut self, term: &str) {
        self.search = term.trim().to_string();
        self.navigated();
    }

    /// An empty or null value removes the constraint.
    pub fn apply_filter(&mut self, field: &str, value: Value) -> Result<(), CrudError> {
        if self.resource.descriptor().filter_named(field).is_none() {
            return Err(CrudError::Malformed(format!("unknown filter `{field}`")));
        }
        let empty = match &value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if empty {
            self.filters.remove(field);
        } else {
            self.filters.insert(field.to_string(), value);
        }
        self.navigated();
        Ok(())
    }

    /// Same field flips the direction; a new field starts ascending.
    pub fn sort(&mut self, field: &str) -> Result<(), CrudError> {
        self.check_sortable(field)?;
        if self.sort_field == field {
            self.sort_direction = self.sort_direction.flipped();
        } else {
            self.sort_field = field.to_string();
            self.sort_direction = SortDirection::Asc;
        }
        self.navigated();
        Ok(())
    }

    pub fn set_sort(&mut self, field: &str, direction: SortDirection) -> Result<(), CrudError> {
        self.check_sortable(field)?;
        self.sort_field = field.to_string();
        self.sort_direction = direction;
        self.navigated();
        Ok(())
    }

    fn check_sortable(&self, field: &str) -> Result<(), CrudError> {
        let descriptor = self.resource.descriptor();
        let sortable = field == descriptor.default_sort
            || descriptor
                .column_named(field)
                .is_some_and(|column| column.sortable);
        if sortable {
            Ok(())
        } else {
            Err(CrudError::Malformed(format!("`{field}` is not sortable")))
        }
    }

    pub fn set_page_size(&mut self, size: u64) {
        self.page_size = size.max(1);
        self.navigated();
    }

    /// Out-of-range pages are clamped when rendering.
    pub fn go_to_page(&mut self, page: u64) {
        self.page = page.max(1);
        self.pending_delete = None;
    }

    pub fn reset_filters(&mut self) {
        let descriptor = self.resource.descriptor();
        self.search.clear();
        self.filters.clear();
        self.sort_field = descriptor.default_sort.clone();
        self.sort_direction = descriptor.default_direction;
        self.page_size = DEFAULT_PAGE_SIZE;
        self.navigated();
    }

    /// Stage `id` for deletion. Nothing is removed until
    /// [`confirm_delete`](Self::confirm_delete).
    pub fn request_delete(&mut self, actor: &dyn Actor, id: i32) -> Result<(), CrudError> {
        actor.authorize(&self.resource.descriptor().permission(Ability::Delete))?;
        self.pending_delete = Some(id);
        Ok(())
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Delete the staged record.
    ///
    /// Database failures are logged here and surface as
    /// [`CrudError::Persistence`], whose notice carries no detail. The
    /// record stays in place.
    #[instrument(skip_all, fields(alias = %self.resource.alias()))]
    pub async fn confirm_delete(
        &mut self,
        ctx: &CrudContext,
        actor: &dyn Actor,
    ) -> Result<Notice, CrudError> {
        let id = self.pending_delete.take().ok_or(CrudError::NoPendingDeletion)?;
        let descriptor = self.resource.descriptor();
        actor.authorize(&descriptor.permission(Ability::Delete))?;

        let (record, orphans) = self.delete_record(ctx, id).await.inspect_err(|e| {
            if let CrudError::Persistence(db) = e {
                error!(id, error = %db, "delete failed");
            }
        })?;

        attachments::purge_orphans(&ctx.db, ctx.store.as_ref(), &orphans).await;
        let mut snapshot = record.attributes;
        for key in self.resource.hidden_attributes() {
            snapshot.remove(*key);
        }
        ctx.activity
            .log_deleted(self.resource.owner_type(), id, actor.actor_id(), Value::Object(snapshot))
            .await;
        ctx.permissions_changed(self.resource.as_ref());
        info!(id, "record deleted");

        Ok(Notice::success(format!("{} deleted.", descriptor.entity_name)))
    }

    async fn delete_record(
        &self,
        ctx: &CrudContext,
        id: i32,
    ) -> Result<(Record, Vec<String>), CrudError> {
        let txn = ctx.db.begin().await?;
        let record = self
            .resource
            .find_for_update(&txn, id)
            .await?
            .ok_or_else(|| CrudError::NotFound {
                entity: self.resource.descriptor().entity_name.clone(),
                id,
            })?;

        for field in &self.resource.descriptor().fields {
            if let Some(name) = &field.relationship
                && let Some(relation) = self.resource.relation(name)
            {
                relation.detach_all(&txn, id).await?;
            }
        }
        for backlink in self.resource.referenced_by() {
            backlink.unlink(&txn, id).await?;
        }
        let orphans = attachments::detach_all(&txn, self.resource.owner_type(), id).await?;
        self.resource.delete(&txn, id).await?;
        txn.commit().await?;
        Ok((record, orphans))
    }

    pub fn query(&self) -> ListQuery {
        ListQuery {
            search: self.search.clone(),
            filters: self.filters.clone(),
            sort_field: self.sort_field.clone(),
            sort_direction: self.sort_direction,
            page_size: self.page_size,
            page: self.page,
            locale: self.locale.clone(),
        }
    }

    /// Run the query and render the visible page.
    #[instrument(skip_all, fields(alias = %self.resource.alias()))]
    pub async fn render(&mut self, ctx: &CrudContext) -> Result<ListView, CrudError> {
        let descriptor = self.resource.descriptor();
        let page = self.resource.fetch_page(&ctx.db, &self.query()).await?;
        self.page = page.current_page;

        let mut rows = page.rows;
        self.fill_image_columns(ctx, &mut rows).await?;

        let fallback = descriptor.fallback_locale();
        let rows = rows
            .iter()
            .map(|row| RowView {
                id: row.get("id").and_then(Value::as_i64).unwrap_or_default() as i32,
                cells: descriptor
                    .columns
                    .iter()
                    .map(|column| {
                        let cell = render_cell(column, row, &self.locale, fallback);
                        (column.key.clone(), cell)
                    })
                    .collect(),
            })
            .collect();

        let mut filters = Vec::with_capacity(descriptor.filters.len());
        for filter in &descriptor.filters {
            let options = if !filter.options.is_empty() {
                filter.options.clone()
            } else if filter.kind == FilterType::Boolean {
                vec![SelectOption::new(true, "Yes"), SelectOption::new(false, "No")]
            } else if let Some(source) = self.resource.option_source(&filter.field) {
                source.options(&ctx.db, &self.locale).await?
            } else {
                Vec::new()
            };
            filters.push(FilterView {
                field: filter.field.clone(),
                label: filter.label.clone(),
                kind: filter.kind,
                options,
                value: self.filters.get(&filter.field).cloned(),
            });
        }

        Ok(ListView {
            alias: self.resource.alias().to_string(),
            entity_name: descriptor.entity_name.clone(),
            plural_name: descriptor.plural_name.clone(),
            locale: self.locale.clone(),
            search: self.search.clone(),
            sort_field: self.sort_field.clone(),
            sort_direction: self.sort_direction,
            columns: descriptor
                .columns
                .iter()
                .map(|c| ColumnHeader {
                    key: c.key.clone(),
                    label: c.label.clone(),
                    sortable: c.sortable,
                    kind: c.kind,
                })
                .collect(),
            filters,
            rows,
            pagination: Pagination {
                total: page.total,
                current_page: page.current_page,
                last_page: page.last_page,
                per_page: page.per_page,
            },
            pending_delete: self.pending_delete,
        })
    }

    async fn fill_image_columns(
        &self,
        ctx: &CrudContext,
        rows: &mut [Map<String, Value>],
    ) -> Result<(), CrudError> {
        let descriptor = self.resource.descriptor();
        let ids: Vec<i32> = rows
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_i64))
            .map(|id| id as i32)
            .collect();
        for column in descriptor.columns.iter().filter(|c| c.kind == ColumnType::Image) {
            let collection = descriptor
                .field_named(&column.key)
                .map(|f| f.collection_name().to_string())
                .unwrap_or_else(|| column.key.clone());
            let firsts = attachments::first_in_collection(
                &ctx.db,
                self.resource.owner_type(),
                &ids,
                &collection,
            )
            .await?;
            for row in rows.iter_mut() {
                let id = row.get("id").and_then(Value::as_i64).unwrap_or_default() as i32;
                let url = firsts.get(&id).map(|a| Value::String(a.url.clone()));
                row.insert(column.key.clone(), url.unwrap_or(Value::Null));
            }
        }
        Ok(())
    }
}
