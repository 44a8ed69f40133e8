use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;

use async_trait::async_trait;
use sea_orm::sea_query::{Query, SelectStatement};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, IdenStatic, QueryFilter, QueryOrder, QuerySelect, Value as DbValue,
};
use serde::Serialize;
use serde_json::Value;

use super::descriptor::SelectOption;
use super::translatable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedItem {
    pub id: i32,
    pub label: String,
}

/// What a relationship sync actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncChanges {
    pub attached: Vec<i32>,
    pub detached: Vec<i32>,
}

impl SyncChanges {
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty()
    }
}

/// Supplies select choices for a field or filter.
#[async_trait]
pub trait OptionSource: Send + Sync {
    async fn options(&self, db: &DatabaseConnection, locale: &str)
    -> Result<Vec<SelectOption>, DbErr>;
}

/// A many-to-many association owned by a CRUD entity.
#[async_trait]
pub trait RelationSync: OptionSource {
    async fn related_ids(&self, db: &DatabaseConnection, owner: i32) -> Result<Vec<i32>, DbErr>;

    /// Related items for a batch of owners, used for eager loading list rows.
    async fn related_for(
        &self,
        db: &DatabaseConnection,
        owners: &[i32],
        locale: &str,
    ) -> Result<HashMap<i32, Vec<RelatedItem>>, DbErr>;

    /// Make the owner's associations exactly `ids`: drop the missing ones,
    /// add the new ones, leave the rest untouched.
    async fn sync(
        &self,
        txn: &DatabaseTransaction,
        owner: i32,
        ids: &[i32],
    ) -> Result<SyncChanges, DbErr>;

    async fn detach_all(&self, txn: &DatabaseTransaction, owner: i32) -> Result<u64, DbErr>;

    /// Sub-select of owner ids associated with `related`.
    fn owners_related_to(&self, related: i32) -> SelectStatement;
}

/// Junction rows that reference an entity from the other side of a relation.
#[async_trait]
pub trait Backlink: Send + Sync {
    /// Drop every row pointing at `target`.
    async fn unlink(&self, txn: &DatabaseTransaction, target: i32) -> Result<u64, DbErr>;
}

/// Rows of junction table `J` whose `column` holds the target id.
pub struct ReferencedBy<J: EntityTrait> {
    column: J::Column,
}

impl<J: EntityTrait> ReferencedBy<J> {
    pub fn new(column: J::Column) -> Self {
        Self { column }
    }
}

#[async_trait]
impl<J: EntityTrait> Backlink for ReferencedBy<J> {
    async fn unlink(&self, txn: &DatabaseTransaction, target: i32) -> Result<u64, DbErr> {
        let result = J::delete_many()
            .filter(self.column.eq(target))
            .exec(txn)
            .await?;
        Ok(result.rows_affected)
    }
}

/// Named relation attached to an entity configuration.
#[derive(Clone)]
pub struct Relation {
    pub name: String,
    pub sync: std::sync::Arc<dyn RelationSync>,
}

impl Relation {
    pub fn new(name: impl Into<String>, sync: impl RelationSync + 'static) -> Self {
        Self {
            name: name.into(),
            sync: std::sync::Arc::new(sync),
        }
    }
}

/// Named option source that does not own an association (e.g. a parent id).
#[derive(Clone)]
pub struct Lookup {
    pub name: String,
    pub source: std::sync::Arc<dyn OptionSource>,
}

impl Lookup {
    pub fn new(name: impl Into<String>, source: impl OptionSource + 'static) -> Self {
        Self {
            name: name.into(),
            source: std::sync::Arc::new(source),
        }
    }
}

/// Junction-table relation: `J` links owners to rows of `R`.
pub struct ManyToMany<J: EntityTrait, R: EntityTrait> {
    owner: J::Column,
    related: J::Column,
    related_key: R::Column,
    label: &'static str,
    _marker: PhantomData<fn() -> (J, R)>,
}

impl<J: EntityTrait, R: EntityTrait> ManyToMany<J, R> {
    /// `label` is the attribute of `R` shown to users; translatable columns
    /// are resolved for the requested locale.
    pub fn new(
        owner: J::Column,
        related: J::Column,
        related_key: R::Column,
        label: &'static str,
    ) -> Self {
        Self {
            owner,
            related,
            related_key,
            label,
            _marker: PhantomData,
        }
    }
}

async fn labelled<R>(
    db: &DatabaseConnection,
    key: R::Column,
    label: &str,
    ids: Option<Vec<i32>>,
    locale: &str,
) -> Result<Vec<RelatedItem>, DbErr>
where
    R: EntityTrait,
    R::Model: Serialize,
{
    let mut select = R::find().order_by_asc(key);
    if let Some(ids) = ids {
        select = select.filter(key.is_in(ids));
    }
    let mut items = Vec::new();
    for model in select.all(db).await? {
        let json = serde_json::to_value(&model).map_err(|e| DbErr::Custom(e.to_string()))?;
        let Some(id) = json.get(key.as_str()).and_then(Value::as_i64) else {
            continue;
        };
        let text = json
            .get(label)
            .map(|v| translatable::text_for(v, locale, locale))
            .unwrap_or_default();
        items.push(RelatedItem {
            id: id as i32,
            label: text,
        });
    }
    Ok(items)
}

#[async_trait]
impl<J, R> OptionSource for ManyToMany<J, R>
where
    J: EntityTrait,
    R: EntityTrait,
    R::Model: Serialize + Send + Sync,
{
    async fn options(
        &self,
        db: &DatabaseConnection,
        locale: &str,
    ) -> Result<Vec<SelectOption>, DbErr> {
        let mut items = labelled::<R>(db, self.related_key, self.label, None, locale).await?;
        items.sort_by_key(|item| item.label.to_lowercase());
        Ok(items
            .into_iter()
            .map(|item| SelectOption::new(item.id, item.label))
            .collect())
    }
}

#[async_trait]
impl<J, R> RelationSync for ManyToMany<J, R>
where
    J: EntityTrait,
    J::ActiveModel: ActiveModelTrait<Entity = J> + ActiveModelBehavior + Send,
    R: EntityTrait,
    R::Model: Serialize + Send + Sync,
{
    async fn related_ids(&self, db: &DatabaseConnection, owner: i32) -> Result<Vec<i32>, DbErr> {
        J::find()
            .select_only()
            .column(self.related)
            .filter(self.owner.eq(owner))
            .order_by_asc(self.related)
            .into_tuple::<i32>()
            .all(db)
            .await
    }

    async fn related_for(
        &self,
        db: &DatabaseConnection,
        owners: &[i32],
        locale: &str,
    ) -> Result<HashMap<i32, Vec<RelatedItem>>, DbErr> {
        if owners.is_empty() {
            return Ok(HashMap::new());
        }
        let pairs: Vec<(i32, i32)> = J::find()
            .select_only()
            .column(self.owner)
            .column(self.related)
            .filter(self.owner.is_in(owners.iter().copied()))
            .into_tuple()
            .all(db)
            .await?;

        let ids: BTreeSet<i32> = pairs.iter().map(|(_, related)| *related).collect();
        let labels: HashMap<i32, RelatedItem> = labelled::<R>(
            db,
            self.related_key,
            self.label,
            Some(ids.into_iter().collect()),
            locale,
        )
        .await?
        .into_iter()
        .map(|item| (item.id, item))
        .collect();

        let mut grouped: HashMap<i32, Vec<RelatedItem>> = HashMap::new();
        for (owner, related) in pairs {
            if let Some(item) = labels.get(&related) {
                grouped.entry(owner).or_default().push(item.clone());
            }
        }
        for items in grouped.values_mut() {
            items.sort_by_key(|item| item.id);
        }
        Ok(grouped)
    }

    async fn sync(
        &self,
        txn: &DatabaseTransaction,
        owner: i32,
        ids: &[i32],
    ) -> Result<SyncChanges, DbErr> {
        let existing: BTreeSet<i32> = J::find()
            .select_only()
            .column(self.related)
            .filter(self.owner.eq(owner))
            .into_tuple::<i32>()
            .all(txn)
            .await?
            .into_iter()
            .collect();
        let wanted: BTreeSet<i32> = ids.iter().copied().collect();

        let changes = SyncChanges {
            attached: wanted.difference(&existing).copied().collect(),
            detached: existing.difference(&wanted).copied().collect(),
        };

        if !changes.detached.is_empty() {
            J::delete_many()
                .filter(self.owner.eq(owner))
                .filter(self.related.is_in(changes.detached.clone()))
                .exec(txn)
                .await?;
        }
        if !changes.attached.is_empty() {
            let rows = changes.attached.iter().map(|related| {
                let mut row = <J::ActiveModel as ActiveModelTrait>::default();
                row.set(self.owner, DbValue::from(owner));
                row.set(self.related, DbValue::from(*related));
                row
            });
            J::insert_many(rows).exec_without_returning(txn).await?;
        }
        Ok(changes)
    }

    async fn detach_all(&self, txn: &DatabaseTransaction, owner: i32) -> Result<u64, DbErr> {
        let result = J::delete_many()
            .filter(self.owner.eq(owner))
            .exec(txn)
            .await?;
        Ok(result.rows_affected)
    }

    fn owners_related_to(&self, related: i32) -> SelectStatement {
        Query::select()
            .column(self.owner)
            .from(J::default())
            .and_where(self.related.eq(related))
            .to_owned()
    }
}

/// Choices drawn from every row of `R`, without an association table.
pub struct EntityOptions<R: EntityTrait> {
    key: R::Column,
    label: &'static str,
}

impl<R: EntityTrait> EntityOptions<R> {
    pub fn new(key: R::Column, label: &'static str) -> Self {
        Self { key, label }
    }
}

#[async_trait]
impl<R> OptionSource for EntityOptions<R>
where
    R: EntityTrait,
    R::Model: Serialize + Send + Sync,
{
    async fn options(
        &self,
        db: &DatabaseConnection,
        locale: &str,
    ) -> Result<Vec<SelectOption>, DbErr> {
        let items = labelled::<R>(db, self.key, self.label, None, locale).await?;
        Ok(items
            .into_iter()
            .map(|item| SelectOption::new(item.id, item.label))
            .collect())
    }
}
