use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{error, info, instrument};

use super::attachments::{self, AttachmentSummary, StoredUpload};
use super::config::RuleContext;
use super::descriptor::{Ability, Field, FieldType, Locale};
use super::error::{CrudError, ValidationErrors};
use super::form::{self, FieldValue, FormData, UploadedFile};
use super::notice::Notice;
use super::relation::SyncChanges;
use super::render::{FieldExtras, RenderedField, render_field};
use super::resource::{CrudResource, Persisted, Record};
use super::translatable;
use super::validation::{self, UniquenessCheck};
use super::{Actor, CrudContext};
use crate::entity::attachment;

/// Highest numeric suffix tried for a derived unique value.
const MAX_SUFFIX: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditState {
    New,
    Persisted,
}

/// Create/edit form for one record.
///
/// Starts `New` (guarded by `create`) or `Persisted` (guarded by `update`)
/// and becomes `Persisted` after the first successful save.
pub struct EditController {
    resource: Arc<dyn CrudResource>,
    record: Option<Record>,
    locale: String,
    data: FormData,
    errors: ValidationErrors,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct FormView {
    pub alias: String,
    pub entity_name: String,
    #[schema(value_type = String)]
    pub state: EditState,
    pub record_id: Option<i32>,
    pub locale: String,
    #[schema(value_type = Vec<Object>)]
    pub locales: Vec<Locale>,
    #[schema(value_type = Vec<Object>)]
    pub fields: Vec<RenderedField>,
    #[schema(value_type = Object)]
    pub errors: ValidationErrors,
}

struct WriteOutcome {
    persisted: Persisted,
    relations: BTreeMap<String, SyncChanges>,
    attached: Vec<attachment::Model>,
    orphans: Vec<String>,
}

struct ResourceUniqueness<'a> {
    resource: &'a dyn CrudResource,
    db: &'a DatabaseConnection,
}

#[async_trait]
impl UniquenessCheck for ResourceUniqueness<'_> {
    async fn is_taken(
        &self,
        column: &str,
        value: &Value,
        except: Option<i32>,
    ) -> Result<bool, CrudError> {
        self.resource.value_taken(self.db, column, value, except).await
    }
}

impl EditController {
    /// Load `id` (or prepare a new record) and hydrate the form.
    #[instrument(skip(ctx, resource, actor), fields(alias = %resource.alias()))]
    pub async fn initialize(
        ctx: &CrudContext,
        resource: Arc<dyn CrudResource>,
        actor: &dyn Actor,
        id: Option<i32>,
        locale: Option<&str>,
    ) -> Result<Self, CrudError> {
        let descriptor = resource.descriptor();
        let record = match id {
            Some(id) => {
                let record = resource.find(&ctx.db, id).await?.ok_or_else(|| CrudError::NotFound {
                    entity: descriptor.entity_name.clone(),
                    id,
                })?;
                actor.authorize(&descriptor.permission(Ability::Update))?;
                Some(record)
            }
            None => {
                actor.authorize(&descriptor.permission(Ability::Create))?;
                None
            }
        };
        let locale = locale
            .filter(|code| descriptor.has_locale(code))
            .unwrap_or(descriptor.fallback_locale())
            .to_string();

        let mut controller = Self {
            resource,
            record,
            locale,
            data: FormData::new(),
            errors: ValidationErrors::new(),
        };
        controller.hydrate(ctx).await?;
        Ok(controller)
    }

    pub fn state(&self) -> EditState {
        if self.record.is_some() {
            EditState::Persisted
        } else {
            EditState::New
        }
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn record_id(&self) -> Option<i32> {
        self.record.as_ref().map(|r| r.id)
    }

    pub fn data(&self) -> &FormData {
        &self.data
    }

    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.data.get(field)
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn set_locale(&mut self, code: &str) -> Result<(), CrudError> {
        if !self.resource.descriptor().has_locale(code) {
            return Err(CrudError::Malformed(format!("unknown locale `{code}`")));
        }
        self.locale = code.to_string();
        Ok(())
    }

    /// Build the form state from the stored record, or from field defaults
    /// for a new one. Write-only and password inputs always start empty.
    pub async fn hydrate(&mut self, ctx: &CrudContext) -> Result<(), CrudError> {
        let descriptor = self.resource.descriptor();
        let mut data = FormData::new();
        for field in &descriptor.fields {
            let value = if field.kind.is_file() {
                FieldValue::Files(Vec::new())
            } else if let Some(name) = &field.relationship {
                let ids = match (&self.record, self.resource.relation(name)) {
                    (Some(record), Some(relation)) => {
                        relation.related_ids(&ctx.db, record.id).await?
                    }
                    _ => default_ids(field),
                };
                FieldValue::Related(ids)
            } else if field.translatable {
                let stored = if field.persist {
                    self.stored(field)
                } else {
                    None
                };
                FieldValue::Translations(translatable::hydrate(
                    stored.or(field.default.as_ref()),
                    descriptor.locale_codes(),
                    descriptor.fallback_locale(),
                ))
            } else if !field.persist || field.kind == FieldType::Password {
                FieldValue::Scalar(empty_value(field.kind))
            } else {
                let value = self
                    .stored(field)
                    .or(field.default.as_ref())
                    .cloned()
                    .unwrap_or_else(|| empty_value(field.kind));
                FieldValue::Scalar(value)
            };
            data.insert(field.name.clone(), value);
        }
        self.data = data;
        Ok(())
    }

    fn stored(&self, field: &Field) -> Option<&Value> {
        self.record
            .as_ref()
            .and_then(|r| r.get(&field.name))
            .filter(|v| !v.is_null())
    }

    fn field(&self, name: &str) -> Result<&Field, CrudError> {
        self.resource
            .descriptor()
            .field_named(name)
            .ok_or_else(|| CrudError::Malformed(format!("unknown field `{name}`")))
    }

    /// Set one field from submitted JSON. A plain string for a translatable
    /// field fills the current locale only.
    pub fn fill(&mut self, name: &str, raw: Value) -> Result<(), CrudError> {
        let field = self.field(name)?.clone();
        let value = form::decode(&field, raw, &self.locale, self.data.get(name))?;
        self.data.insert(field.name, value);
        Ok(())
    }

    /// Fill every entry of a submitted object, collecting per-field errors.
    pub fn fill_all(&mut self, submitted: Map<String, Value>) -> Result<(), CrudError> {
        let mut errors = ValidationErrors::new();
        for (name, raw) in submitted {
            match self.fill(&name, raw) {
                Ok(()) => {}
                Err(CrudError::Validation(e)) => {
                    for field in e.fields() {
                        for message in e.get(field).unwrap_or_default() {
                            errors.add(field, message.clone());
                        }
                    }
                }
                Err(other) => return Err(other),
            }
        }
        errors.into_result()
    }

    pub fn attach_files(&mut self, name: &str, files: Vec<UploadedFile>) -> Result<(), CrudError> {
        let field = self.field(name)?;
        if !field.kind.is_file() {
            return Err(CrudError::Malformed(format!("`{name}` does not accept files")));
        }
        let multiple = field.multiple;
        let entry = self
            .data
            .entry(name.to_string())
            .or_insert_with(|| FieldValue::Files(Vec::new()));
        match entry {
            FieldValue::Files(existing) if multiple => existing.extend(files),
            other => *other = FieldValue::Files(files),
        }
        Ok(())
    }

    /// Run the rules for the current record and locale. Rules are rebuilt
    /// on every pass.
    pub async fn validate(&mut self, ctx: &CrudContext) -> Result<(), CrudError> {
        let descriptor = self.resource.descriptor();
        let rules = self.resource.validation_rules(RuleContext {
            record: self.record.as_ref(),
            locale: &self.locale,
            fallback_locale: descriptor.fallback_locale(),
        });
        let bag = form::validation_bag(&self.data);
        let checker = ResourceUniqueness {
            resource: self.resource.as_ref(),
            db: &ctx.db,
        };
        let mut errors = match rules.validate(&bag, &checker).await {
            Ok(()) => ValidationErrors::new(),
            Err(CrudError::Validation(errors)) => errors,
            Err(other) => return Err(other),
        };

        for field in &descriptor.fields {
            let Some(source_name) = field.relationship.as_ref().or(field.options_from.as_ref())
            else {
                continue;
            };
            let chosen: Vec<Value> = match self.data.get(&field.name) {
                Some(FieldValue::Related(ids)) => ids.iter().map(|id| Value::from(*id)).collect(),
                Some(FieldValue::Scalar(Value::Null)) | None => continue,
                Some(FieldValue::Scalar(Value::Array(items))) => items.clone(),
                Some(FieldValue::Scalar(v)) => vec![v.clone()],
                _ => continue,
            };
            if chosen.is_empty() {
                continue;
            }
            let Some(source) = self.resource.option_source(source_name) else {
                continue;
            };
            let options = source.options(&ctx.db, &self.locale).await?;
            let valid = chosen.iter().all(|v| {
                options
                    .iter()
                    .any(|o| translatable::scalar_text(&o.value) == translatable::scalar_text(v))
            });
            if !valid && errors.get(&field.name).is_none() {
                let label = field.label.to_lowercase();
                errors.add(&field.name, format!("The selected {label} is invalid."));
            }
        }

        self.errors = errors.clone();
        errors.into_result()
    }

    /// Validate, re-authorize and write everything in one transaction.
    ///
    /// Plain attributes, relation syncs and attachment links commit
    /// together. Blobs are written before the transaction and removed again
    /// if it rolls back.
    #[instrument(skip_all, fields(alias = %self.resource.alias(), id = ?self.record_id()))]
    pub async fn save(
        &mut self,
        ctx: &CrudContext,
        actor: &dyn Actor,
    ) -> Result<Notice, CrudError> {
        self.validate(ctx).await?;

        let resource = Arc::clone(&self.resource);
        let descriptor = resource.descriptor();
        let ability = if self.record.is_some() {
            Ability::Update
        } else {
            Ability::Create
        };
        actor.authorize(&descriptor.permission(ability))?;

        let mut parts = form::partition(descriptor, &self.data, self.record.as_ref());
        resource.before_save(self.record.as_ref(), &mut parts.plain)?;
        self.settle_unique(ctx, &mut parts.plain).await?;

        let uploads = attachments::store_uploads(ctx.store.as_ref(), &parts.files).await?;
        let outcome = match self.write(ctx, parts.plain, parts.relations, &uploads).await {
            Ok(outcome) => outcome,
            Err(e) => {
                attachments::discard_unreferenced(&ctx.db, ctx.store.as_ref(), &uploads).await;
                if let CrudError::Persistence(db) = &e {
                    error!(error = %db, "save failed, transaction rolled back");
                }
                return Err(e);
            }
        };

        attachments::purge_orphans(&ctx.db, ctx.store.as_ref(), &outcome.orphans).await;
        for row in &outcome.attached {
            ctx.images.schedule(row.clone());
        }

        let id = outcome.persisted.record.id;
        let changed = outcome.persisted.created
            || !outcome.persisted.changes.is_empty()
            || !outcome.relations.is_empty()
            || !outcome.attached.is_empty()
            || !outcome.orphans.is_empty();
        self.log_save(ctx, actor, &outcome).await;
        if changed {
            ctx.permissions_changed(resource.as_ref());
        }

        self.record = Some(outcome.persisted.record);
        self.errors = ValidationErrors::new();
        self.hydrate(ctx).await?;

        let notice = if outcome.persisted.created {
            info!(id, "record created");
            Notice::success(format!("{} created.", descriptor.entity_name))
        } else if changed {
            info!(id, "record updated");
            Notice::success(format!("{} updated.", descriptor.entity_name))
        } else {
            Notice::info("No changes to save.")
        };
        Ok(notice)
    }

    /// Re-check unique columns after `before_save`, which may have derived
    /// or normalised them. Columns listed in `suffix_when_taken` get `-2`,
    /// `-3` and so on; any other clash is a validation error.
    async fn settle_unique(
        &mut self,
        ctx: &CrudContext,
        plain: &mut Map<String, Value>,
    ) -> Result<(), CrudError> {
        let resource = self.resource.as_ref();
        let rules = resource.validation_rules(RuleContext {
            record: self.record.as_ref(),
            locale: &self.locale,
            fallback_locale: resource.descriptor().fallback_locale(),
        });
        let mut errors = ValidationErrors::new();

        for (path, column, except) in rules.unique_rules() {
            let Some(value) = plain.get(path).filter(|v| !v.is_null()).cloned() else {
                continue;
            };
            if !resource.value_taken(&ctx.db, column, &value, except).await? {
                continue;
            }
            let base = match &value {
                Value::String(base) if resource.suffix_when_taken().iter().any(|c| *c == path) => {
                    base
                }
                _ => {
                    errors.add(path, validation::taken_message(path));
                    continue;
                }
            };
            let mut free = None;
            for n in 2..=MAX_SUFFIX {
                let candidate = Value::String(format!("{base}-{n}"));
                if !resource.value_taken(&ctx.db, column, &candidate, except).await? {
                    free = Some(candidate);
                    break;
                }
            }
            match free {
                Some(candidate) => {
                    plain.insert(path.to_string(), candidate);
                }
                None => errors.add(path, validation::taken_message(path)),
            }
        }

        self.errors = errors.clone();
        errors.into_result()
    }

    async fn write(
        &self,
        ctx: &CrudContext,
        plain: Map<String, Value>,
        relations: Vec<(String, Vec<i32>)>,
        uploads: &[StoredUpload],
    ) -> Result<WriteOutcome, CrudError> {
        let resource = self.resource.as_ref();
        let owner_type = resource.owner_type();
        let txn = ctx.db.begin().await?;

        let existing = match &self.record {
            Some(record) => Some(resource.find_for_update(&txn, record.id).await?.ok_or_else(|| {
                CrudError::NotFound {
                    entity: resource.descriptor().entity_name.clone(),
                    id: record.id,
                }
            })?),
            None => None,
        };
        let persisted = resource.persist(&txn, existing.as_ref(), plain).await?;
        let owner = persisted.record.id;

        let mut synced = BTreeMap::new();
        for (name, ids) in relations {
            let relation = resource.relation(&name).ok_or_else(|| {
                CrudError::InvalidConfiguration(format!("relation `{name}` is not declared"))
            })?;
            let changes = relation.sync(&txn, owner, &ids).await?;
            if !changes.is_empty() {
                synced.insert(name, changes);
            }
        }

        let mut orphans = Vec::new();
        let mut attached = Vec::with_capacity(uploads.len());
        for upload in uploads {
            if upload.single {
                let collection = &upload.collection;
                orphans.extend(
                    attachments::clear_collection(&txn, owner_type, owner, collection).await?,
                );
            }
            let disk = ctx.store.disk();
            attached.push(attachments::attach(&txn, owner_type, owner, upload, disk).await?);
        }

        txn.commit().await?;
        Ok(WriteOutcome {
            persisted,
            relations: synced,
            attached,
            orphans,
        })
    }

    async fn log_save(&self, ctx: &CrudContext, actor: &dyn Actor, outcome: &WriteOutcome) {
        let resource = self.resource.as_ref();
        let hidden = resource.hidden_attributes();
        let id = outcome.persisted.record.id;

        if outcome.persisted.created {
            let mut attributes = outcome.persisted.record.attributes.clone();
            for key in hidden {
                attributes.remove(*key);
            }
            ctx.activity
                .log_created(resource.owner_type(), id, actor.actor_id(), Value::Object(attributes))
                .await;
            return;
        }

        let attributes: Map<String, Value> = outcome
            .persisted
            .changes
            .iter()
            .map(|(key, [old, new])| {
                let change = if hidden.contains(&key.as_str()) {
                    json!({ "changed": true })
                } else {
                    json!({ "old": old, "new": new })
                };
                (key.clone(), change)
            })
            .collect();
        if attributes.is_empty() && outcome.relations.is_empty() && outcome.attached.is_empty() {
            return;
        }
        let properties = json!({
            "attributes": attributes,
            "relations": outcome.relations,
            "attachments": outcome.attached.iter().map(|a| a.id).collect::<Vec<_>>(),
        });
        ctx.activity
            .log_updated(resource.owner_type(), id, actor.actor_id(), properties)
            .await;
    }

    /// Unlink one attachment from the record being edited.
    #[instrument(skip(self, ctx, actor), fields(alias = %self.resource.alias()))]
    pub async fn remove_attachment(
        &mut self,
        ctx: &CrudContext,
        actor: &dyn Actor,
        attachment_id: i32,
        collection: Option<&str>,
    ) -> Result<Notice, CrudError> {
        let resource = Arc::clone(&self.resource);
        actor.authorize(&resource.descriptor().permission(Ability::Update))?;
        let Some(owner) = self.record_id() else {
            return Err(CrudError::NotFound {
                entity: "Attachment".into(),
                id: attachment_id,
            });
        };

        let owned = attachments::for_owner(&ctx.db, resource.owner_type(), owner).await?;
        let found = owned
            .iter()
            .any(|a| a.id == attachment_id && collection.is_none_or(|c| a.collection_name == c));
        if !found {
            return Err(CrudError::NotFound {
                entity: "Attachment".into(),
                id: attachment_id,
            });
        }

        let txn = ctx.db.begin().await?;
        let orphan = attachments::unlink(&txn, attachment_id, resource.owner_type(), owner).await?;
        txn.commit().await?;

        attachments::purge_orphans(&ctx.db, ctx.store.as_ref(), orphan.as_slice()).await;
        ctx.activity
            .log_updated(
                resource.owner_type(),
                owner,
                actor.actor_id(),
                json!({ "detached_attachment": attachment_id }),
            )
            .await;
        info!(owner, attachment_id, "attachment removed");
        Ok(Notice::success("Attachment removed."))
    }

    pub async fn render(&self, ctx: &CrudContext) -> Result<FormView, CrudError> {
        let descriptor = self.resource.descriptor();
        let existing: Vec<AttachmentSummary> = match self.record_id() {
            Some(owner) => attachments::for_owner(&ctx.db, self.resource.owner_type(), owner)
                .await?
                .into_iter()
                .map(AttachmentSummary::from)
                .collect(),
            None => Vec::new(),
        };

        let mut fields = Vec::with_capacity(descriptor.fields.len());
        for field in &descriptor.fields {
            let mut extras = FieldExtras::default();
            if field.kind.is_file() {
                extras.attachments = existing
                    .iter()
                    .filter(|a| a.collection == field.collection_name())
                    .cloned()
                    .collect();
            } else if field.options.is_empty()
                && let Some(source) = field
                    .relationship
                    .as_ref()
                    .or(field.options_from.as_ref())
                    .and_then(|name| self.resource.option_source(name))
            {
                extras.options = source.options(&ctx.db, &self.locale).await?;
            }
            fields.push(render_field(field, self.data.get(&field.name), &self.locale, extras));
        }

        Ok(FormView {
            alias: self.resource.alias().to_string(),
            entity_name: descriptor.entity_name.clone(),
            state: self.state(),
            record_id: self.record_id(),
            locale: self.locale.clone(),
            locales: descriptor.locales.clone(),
            fields,
            errors: self.errors.clone(),
        })
    }
}

fn default_ids(field: &Field) -> Vec<i32> {
    match &field.default {
        Some(Value::Array(items)) => items.iter().filter_map(super::resource::as_i32).collect(),
        Some(single) => super::resource::as_i32(single).into_iter().collect(),
        None => Vec::new(),
    }
}

fn empty_value(kind: FieldType) -> Value {
    match kind {
        FieldType::Checkbox => Value::Bool(false),
        FieldType::Number | FieldType::Select => Value::Null,
        FieldType::Multiselect => Value::Array(Vec::new()),
        _ => Value::String(String::new()),
    }
}
