use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use common::InvalidatingCache;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, Set};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

use super::activity::{ActivityLogger, UPDATED};
use crate::entity::setting;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unknown setting `{0}`")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("invalid settings definitions: {0}")]
    Definitions(String),
}

/// One entry of `config/settings.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingDefinition {
    pub key: String,
    #[serde(default = "default_group")]
    pub group: String,
    pub value: Value,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_group() -> String {
    "general".into()
}

#[derive(Debug, Deserialize)]
struct DefinitionFile {
    #[serde(default, rename = "setting")]
    settings: Vec<SettingDefinition>,
}

type Snapshot = BTreeMap<String, setting::Model>;

/// Key/value settings backed by the `setting` table.
///
/// The whole table is cached after the first read and dropped on every
/// write, so the next read sees the new value.
pub struct SettingsService {
    db: DatabaseConnection,
    activity: ActivityLogger,
    cache: InvalidatingCache<(), Snapshot>,
}

impl SettingsService {
    pub fn new(db: DatabaseConnection, activity: ActivityLogger) -> Self {
        Self {
            db,
            activity,
            cache: InvalidatingCache::new(),
        }
    }

    pub async fn all(&self) -> Result<Arc<Snapshot>, SettingsError> {
        let db = self.db.clone();
        self.cache
            .get_or_try_load((), || async move {
                let rows = setting::Entity::find().all(&db).await?;
                Ok::<_, SettingsError>(rows.into_iter().map(|row| (row.key.clone(), row)).collect())
            })
            .await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        Ok(self.all().await?.get(key).map(|row| row.value.clone()))
    }

    /// Store `value` under `key`. Returns `false`, and writes nothing,
    /// when the value is unchanged.
    pub async fn set(
        &self,
        key: &str,
        value: Value,
        causer: Option<i32>,
    ) -> Result<bool, SettingsError> {
        let current = setting::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| SettingsError::NotFound(key.to_string()))?;
        if current.value == value {
            return Ok(false);
        }

        let old = current.value.clone();
        let mut active = current.into_active_model();
        active.value = Set(value.clone());
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        self.cache.invalidate_all();

        self.activity
            .log(UPDATED, "setting", None, causer, json!({ "key": key, "old": old, "new": value }))
            .await;
        Ok(true)
    }

    /// Insert definitions that have no row yet. Existing values are kept.
    pub async fn sync_definitions(
        &self,
        definitions: &[SettingDefinition],
    ) -> Result<usize, SettingsError> {
        let existing = self.all().await?;
        let mut inserted = 0;
        for def in definitions.iter().filter(|d| !existing.contains_key(&d.key)) {
            setting::ActiveModel {
                key: Set(def.key.clone()),
                group: Set(def.group.clone()),
                value: Set(def.value.clone()),
                description: Set(def.description.clone()),
                updated_at: Set(Utc::now()),
            }
            .insert(&self.db)
            .await?;
            info!(key = %def.key, "setting defined");
            inserted += 1;
        }
        if inserted > 0 {
            self.cache.invalidate_all();
        }
        Ok(inserted)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}

pub fn parse_definitions(raw: &str) -> Result<Vec<SettingDefinition>, SettingsError> {
    let file: DefinitionFile =
        toml::from_str(raw).map_err(|e| SettingsError::Definitions(e.to_string()))?;
    let mut seen = std::collections::HashSet::new();
    for def in &file.settings {
        if !seen.insert(def.key.as_str()) {
            return Err(SettingsError::Definitions(format!("duplicate key `{}`", def.key)));
        }
    }
    Ok(file.settings)
}

pub fn load_definitions(path: &Path) -> Result<Vec<SettingDefinition>, SettingsError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SettingsError::Definitions(format!("{}: {e}", path.display())))?;
    parse_definitions(&raw)
}
