use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use sea_orm::sea_query::{Alias, Expr, Func, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityName, EntityTrait, ExprTrait, IntoActiveModel, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Value as DbValue,
};
use serde_json::{Map, Value};

use super::config::{EntityConfig, RuleContext};
use super::descriptor::{EntityDescriptor, FilterType, SortDirection};
use super::error::CrudError;
use super::relation::{Backlink, Lookup, OptionSource, Relation, RelationSync};
use super::validation::RuleSet;
use crate::models::shared::escape_like;

/// A persisted row as a JSON attribute map.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: i32,
    pub attributes: Map<String, Value>,
}

impl Record {
    fn from_json(value: Value) -> Result<Self, CrudError> {
        let Value::Object(attributes) = value else {
            return Err(CrudError::InvalidConfiguration(
                "model does not serialize to an object".into(),
            ));
        };
        let id = attributes
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| CrudError::InvalidConfiguration("model has no integer `id`".into()))?;
        Ok(Self {
            id: id as i32,
            attributes,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Fully resolved list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub search: String,
    pub filters: BTreeMap<String, Value>,
    pub sort_field: String,
    pub sort_direction: SortDirection,
    pub page_size: u64,
    pub page: u64,
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub rows: Vec<Map<String, Value>>,
    pub total: u64,
    pub current_page: u64,
    pub last_page: u64,
    pub per_page: u64,
}

/// Outcome of writing plain attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Persisted {
    pub record: Record,
    pub created: bool,
    /// `attribute -> [old, new]` for updates; empty when nothing changed.
    pub changes: BTreeMap<String, [Value; 2]>,
}

/// Type-erased view of an [`EntityConfig`] bound to its entity.
#[async_trait]
pub trait CrudResource: Send + Sync {
    fn alias(&self) -> &str;
    fn descriptor(&self) -> &EntityDescriptor;
    /// Table name, recorded as `owner_type` on attachment links.
    fn owner_type(&self) -> &str;
    fn has_column(&self, name: &str) -> bool;
    fn relation(&self, name: &str) -> Option<&Arc<dyn RelationSync>>;
    fn referenced_by(&self) -> &[Arc<dyn Backlink>];
    /// Relation or lookup able to list choices for `name`.
    fn option_source(&self, name: &str) -> Option<&dyn OptionSource>;
    fn hidden_attributes(&self) -> &'static [&'static str];
    fn suffix_when_taken(&self) -> &'static [&'static str];
    fn affects_permissions(&self) -> bool;
    fn validation_rules(&self, cx: RuleContext<'_>) -> RuleSet;
    fn before_save(
        &self,
        record: Option<&Record>,
        data: &mut Map<String, Value>,
    ) -> Result<(), CrudError>;

    async fn fetch_page(&self, db: &DatabaseConnection, query: &ListQuery)
    -> Result<Page, CrudError>;
    async fn find(&self, db: &DatabaseConnection, id: i32) -> Result<Option<Record>, CrudError>;
    async fn find_for_update(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<Record>, CrudError>;
    async fn value_taken(
        &self,
        db: &DatabaseConnection,
        column: &str,
        value: &Value,
        except: Option<i32>,
    ) -> Result<bool, CrudError>;
    async fn persist(
        &self,
        txn: &DatabaseTransaction,
        existing: Option<&Record>,
        data: Map<String, Value>,
    ) -> Result<Persisted, CrudError>;
    async fn delete(&self, txn: &DatabaseTransaction, id: i32) -> Result<u64, CrudError>;
}

pub struct ConfiguredResource<C: EntityConfig> {
    alias: String,
    owner_type: String,
    config: C,
    descriptor: EntityDescriptor,
    relations: Vec<Relation>,
    referenced_by: Vec<Arc<dyn Backlink>>,
    lookups: Vec<Lookup>,
}

type ColumnOf<C> = <<C as EntityConfig>::Entity as EntityTrait>::Column;

impl<C: EntityConfig> ConfiguredResource<C> {
    pub fn new(alias: impl Into<String>, config: C) -> Self {
        let descriptor = config.descriptor();
        let relations = config.relations();
        let referenced_by = config.referenced_by();
        let lookups = config.lookups();
        Self {
            alias: alias.into(),
            owner_type: C::Entity::default().table_name().to_string(),
            config,
            descriptor,
            relations,
            referenced_by,
            lookups,
        }
    }

    pub fn with_descriptor(mut self, descriptor: EntityDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    fn column(name: &str) -> Result<ColumnOf<C>, CrudError> {
        <ColumnOf<C> as FromStr>::from_str(name)
            .map_err(|_| CrudError::InvalidConfiguration(format!("unknown column `{name}`")))
    }

    fn id_column() -> Result<ColumnOf<C>, CrudError> {
        Self::column("id")
    }

    fn stamp(data: &mut Map<String, Value>, column: &str) {
        if Self::column(column).is_ok() {
            data.insert(column.to_string(), timestamp());
        }
    }

    async fn load<Cn: ConnectionTrait>(
        &self,
        conn: &Cn,
        id: i32,
    ) -> Result<Option<Record>, CrudError> {
        let model = C::Entity::find()
            .filter(Self::id_column()?.eq(id))
            .one(conn)
            .await?;
        model.map(|m| to_record(&m)).transpose()
    }

    fn apply_search(
        &self,
        select: Select<C::Entity>,
        term: &str,
    ) -> Result<Select<C::Entity>, CrudError> {
        let term = term.trim();
        if term.is_empty() || self.descriptor.searchable.is_empty() {
            return Ok(select);
        }
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        let matches = |text: Expr| {
            Expr::expr(Func::lower(text)).like(LikeExpr::new(pattern.clone()).escape('\\'))
        };
        let mut any = Condition::any();
        for field in &self.descriptor.searchable {
            let col = Self::column(field)?;
            let translatable = self
                .descriptor
                .field_named(field)
                .is_some_and(|f| f.translatable);
            if translatable {
                // Match each locale's text, never the serialised map.
                for code in self.descriptor.locale_codes() {
                    any = any.add(matches(Expr::cust_with_exprs(
                        "$1 ->> $2",
                        [Expr::col(col), Expr::val(code.to_string())],
                    )));
                }
            } else {
                any = any.add(matches(Func::cast_as(Expr::col(col), Alias::new("text")).into()));
            }
        }
        Ok(select.filter(any))
    }

    fn apply_filters(
        &self,
        mut select: Select<C::Entity>,
        filters: &BTreeMap<String, Value>,
    ) -> Result<Select<C::Entity>, CrudError> {
        for (field, value) in filters {
            let filter = self
                .descriptor
                .filter_named(field)
                .ok_or_else(|| CrudError::Malformed(format!("unknown filter `{field}`")))?;

            if filter.is_relationship {
                let relation = self.relation(field).ok_or_else(|| {
                    CrudError::InvalidConfiguration(format!("filter `{field}` has no relation"))
                })?;
                let related = as_i32(value).ok_or_else(|| {
                    CrudError::Malformed(format!("filter `{field}` expects an id"))
                })?;
                select = select.filter(
                    Self::id_column()?.in_subquery(relation.owners_related_to(related)),
                );
                continue;
            }

            let col = Self::column(field)?;
            select = match filter.kind {
                FilterType::Boolean => {
                    let flag = as_bool(value).ok_or_else(|| {
                        CrudError::Malformed(format!("filter `{field}` expects true or false"))
                    })?;
                    select.filter(col.eq(flag))
                }
                FilterType::Date => {
                    let day = value
                        .as_str()
                        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                        .ok_or_else(|| {
                            CrudError::Malformed(format!("filter `{field}` expects YYYY-MM-DD"))
                        })?;
                    let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
                    select
                        .filter(col.gte(start))
                        .filter(col.lt(start + Duration::days(1)))
                }
                FilterType::Select => {
                    let scalar = to_db_value(value).ok_or_else(|| {
                        CrudError::Malformed(format!("filter `{field}` expects a scalar"))
                    })?;
                    select.filter(col.eq(scalar))
                }
            };
        }
        Ok(select)
    }

    async fn eager_load(
        &self,
        db: &DatabaseConnection,
        rows: &mut [Map<String, Value>],
        locale: &str,
    ) -> Result<(), CrudError> {
        let ids: Vec<i32> = rows
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_i64))
            .map(|id| id as i32)
            .collect();
        for name in &self.descriptor.eager_load {
            let relation = self.relation(name).ok_or_else(|| {
                CrudError::InvalidConfiguration(format!("eager load `{name}` has no relation"))
            })?;
            let related = relation.related_for(db, &ids, locale).await?;
            for row in rows.iter_mut() {
                let id = row.get("id").and_then(Value::as_i64).unwrap_or_default() as i32;
                let items = related.get(&id).cloned().unwrap_or_default();
                let json = serde_json::to_value(items)
                    .map_err(|e| CrudError::InvalidConfiguration(e.to_string()))?;
                row.insert(name.clone(), json);
            }
        }
        Ok(())
    }

    fn strip_hidden(&self, mut row: Map<String, Value>) -> Map<String, Value> {
        for key in self.config.hidden_attributes() {
            row.remove(*key);
        }
        row
    }
}

#[async_trait]
impl<C: EntityConfig> CrudResource for ConfiguredResource<C> {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    fn owner_type(&self) -> &str {
        &self.owner_type
    }

    fn has_column(&self, name: &str) -> bool {
        Self::column(name).is_ok()
    }

    fn relation(&self, name: &str) -> Option<&Arc<dyn RelationSync>> {
        self.relations.iter().find(|r| r.name == name).map(|r| &r.sync)
    }

    fn referenced_by(&self) -> &[Arc<dyn Backlink>] {
        &self.referenced_by
    }

    fn option_source(&self, name: &str) -> Option<&dyn OptionSource> {
        if let Some(lookup) = self.lookups.iter().find(|l| l.name == name) {
            return Some(lookup.source.as_ref());
        }
        self.relations
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.sync.as_ref() as &dyn OptionSource)
    }

    fn hidden_attributes(&self) -> &'static [&'static str] {
        self.config.hidden_attributes()
    }

    fn suffix_when_taken(&self) -> &'static [&'static str] {
        self.config.suffix_when_taken()
    }

    fn affects_permissions(&self) -> bool {
        self.config.affects_permissions()
    }

    fn validation_rules(&self, cx: RuleContext<'_>) -> RuleSet {
        self.config.validation_rules(cx)
    }

    fn before_save(
        &self,
        record: Option<&Record>,
        data: &mut Map<String, Value>,
    ) -> Result<(), CrudError> {
        self.config.before_save(record, data)
    }

    async fn fetch_page(
        &self,
        db: &DatabaseConnection,
        query: &ListQuery,
    ) -> Result<Page, CrudError> {
        let select = C::Entity::find();
        let select = self.apply_search(select, &query.search)?;
        let select = self.apply_filters(select, &query.filters)?;

        let order = match query.sort_direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };
        let select = select
            .order_by(Self::column(&query.sort_field)?, order)
            .order_by(Self::id_column()?, Order::Asc);

        let per_page = Ord::max(query.page_size, 1);
        let total = select.clone().paginate(db, per_page).num_items().await?;
        let last_page = Ord::max(total.div_ceil(per_page), 1);
        let current_page = query.page.clamp(1, last_page);

        let models = select
            .offset(Some((current_page - 1) * per_page))
            .limit(Some(per_page))
            .all(db)
            .await?;

        let mut rows = Vec::with_capacity(models.len());
        for model in &models {
            rows.push(self.strip_hidden(to_record(model)?.attributes));
        }
        self.eager_load(db, &mut rows, &query.locale).await?;

        Ok(Page {
            rows,
            total,
            current_page,
            last_page,
            per_page,
        })
    }

    async fn find(&self, db: &DatabaseConnection, id: i32) -> Result<Option<Record>, CrudError> {
        self.load(db, id).await
    }

    async fn find_for_update(
        &self,
        txn: &DatabaseTransaction,
        id: i32,
    ) -> Result<Option<Record>, CrudError> {
        self.load(txn, id).await
    }

    async fn value_taken(
        &self,
        db: &DatabaseConnection,
        column: &str,
        value: &Value,
        except: Option<i32>,
    ) -> Result<bool, CrudError> {
        let Some(scalar) = to_db_value(value) else {
            return Ok(false);
        };
        let mut select = C::Entity::find().filter(Self::column(column)?.eq(scalar));
        if let Some(id) = except {
            select = select.filter(Self::id_column()?.ne(id));
        }
        Ok(select.count(db).await? > 0)
    }

    async fn persist(
        &self,
        txn: &DatabaseTransaction,
        existing: Option<&Record>,
        data: Map<String, Value>,
    ) -> Result<Persisted, CrudError> {
        let id_col = Self::id_column()?;

        let Some(existing) = existing else {
            let mut attributes = data;
            attributes.insert("id".into(), Value::from(0));
            Self::stamp(&mut attributes, "created_at");
            Self::stamp(&mut attributes, "updated_at");

            let model: C::Model = serde_json::from_value(Value::Object(attributes))
                .map_err(|e| CrudError::Malformed(e.to_string()))?;
            let mut active: C::ActiveModel = model.into_active_model().reset_all();
            active.not_set(id_col);
            let saved = active.insert(txn).await?;
            return Ok(Persisted {
                record: to_record(&saved)?,
                created: true,
                changes: BTreeMap::new(),
            });
        };

        let current = C::Entity::find()
            .filter(id_col.eq(existing.id))
            .one(txn)
            .await?
            .ok_or_else(|| CrudError::NotFound {
                entity: self.descriptor.entity_name.clone(),
                id: existing.id,
            })?;
        let before = to_record(&current)?.attributes;

        let mut merged = before.clone();
        merged.extend(data);
        let candidate: C::Model = serde_json::from_value(Value::Object(merged))
            .map_err(|e| CrudError::Malformed(e.to_string()))?;
        let mut after = to_record(&candidate)?.attributes;

        let changes: BTreeMap<String, [Value; 2]> = after
            .iter()
            .filter(|(key, _)| key.as_str() != "updated_at")
            .filter_map(|(key, new)| {
                let old = before.get(key).cloned().unwrap_or(Value::Null);
                (old != *new).then(|| (key.clone(), [old, new.clone()]))
            })
            .collect();

        if changes.is_empty() {
            return Ok(Persisted {
                record: Record {
                    id: existing.id,
                    attributes: before,
                },
                created: false,
                changes,
            });
        }

        let mut dirty: Vec<&str> = changes.keys().map(String::as_str).collect();
        if self.has_column("updated_at") {
            after.insert("updated_at".into(), timestamp());
            dirty.push("updated_at");
        }
        let model: C::Model = serde_json::from_value(Value::Object(after))
            .map_err(|e| CrudError::Malformed(e.to_string()))?;
        let mut active: C::ActiveModel = model.into_active_model();
        for key in dirty {
            active.reset(Self::column(key)?);
        }
        let saved = active.update(txn).await?;

        Ok(Persisted {
            record: to_record(&saved)?,
            created: false,
            changes,
        })
    }

    async fn delete(&self, txn: &DatabaseTransaction, id: i32) -> Result<u64, CrudError> {
        let result = C::Entity::delete_many()
            .filter(Self::id_column()?.eq(id))
            .exec(txn)
            .await?;
        Ok(result.rows_affected)
    }
}

fn to_record<M: serde::Serialize>(model: &M) -> Result<Record, CrudError> {
    let json =
        serde_json::to_value(model).map_err(|e| CrudError::InvalidConfiguration(e.to_string()))?;
    Record::from_json(json)
}

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339())
}

/// Scalar JSON -> bound query parameter. Objects and arrays have no scalar form.
pub fn to_db_value(value: &Value) -> Option<DbValue> {
    match value {
        Value::Bool(b) => Some(DbValue::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(DbValue::from)
            .or_else(|| n.as_f64().map(DbValue::from)),
        Value::String(s) => Some(DbValue::from(s.clone())),
        _ => None,
    }
}

pub fn as_i32(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
