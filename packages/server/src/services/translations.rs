use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, QueryOrder, Set,
};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::entity::translation;

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{0}` is not a `group.key` identifier")]
    InvalidKey(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Flat `group.key -> text` map for one locale file.
pub type LocaleFile = BTreeMap<String, String>;

fn locale_path(dir: &Path, locale: &str) -> PathBuf {
    dir.join(format!("{locale}.json"))
}

pub fn split_key(full: &str) -> Result<(&str, &str), TranslationError> {
    match full.split_once('.') {
        Some((group, key)) if !group.is_empty() && !key.is_empty() => Ok((group, key)),
        _ => Err(TranslationError::InvalidKey(full.to_string())),
    }
}

/// Group stored rows into one flat map per locale. Empty texts are kept so
/// translators see what is missing.
pub fn to_locale_files(
    rows: &[translation::Model],
    locales: &[String],
) -> BTreeMap<String, LocaleFile> {
    let mut files: BTreeMap<String, LocaleFile> = locales
        .iter()
        .map(|code| (code.clone(), LocaleFile::new()))
        .collect();
    for row in rows {
        let full = format!("{}.{}", row.group, row.key);
        for (code, file) in files.iter_mut() {
            let text = row
                .text
                .get(code)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            file.insert(full.clone(), text);
        }
    }
    files
}

/// Write `lang/{locale}.json` for every locale. Returns the number of keys.
pub async fn export(
    db: &DatabaseConnection,
    dir: &Path,
    locales: &[String],
) -> Result<usize, TranslationError> {
    let rows = translation::Entity::find()
        .order_by_asc(translation::Column::Group)
        .order_by_asc(translation::Column::Key)
        .all(db)
        .await?;
    std::fs::create_dir_all(dir).map_err(|source| TranslationError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for (locale, file) in to_locale_files(&rows, locales) {
        let path = locale_path(dir, &locale);
        let json = serde_json::to_string_pretty(&file).map_err(|source| TranslationError::Json {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json + "\n").map_err(|source| TranslationError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), keys = file.len(), "exported translations");
    }
    Ok(rows.len())
}

/// Read every locale file present in `dir` and write back only rows whose
/// text actually changed. Locales without a file are skipped.
pub async fn import(
    db: &DatabaseConnection,
    dir: &Path,
    locales: &[String],
) -> Result<ImportReport, TranslationError> {
    let mut incoming: BTreeMap<(String, String), Map<String, Value>> = BTreeMap::new();
    for locale in locales {
        let path = locale_path(dir, locale);
        if !path.exists() {
            warn!(path = %path.display(), "no translation file for locale");
            continue;
        }
        let raw = std::fs::read_to_string(&path).map_err(|source| TranslationError::Io {
            path: path.clone(),
            source,
        })?;
        let file: LocaleFile = serde_json::from_str(&raw).map_err(|source| TranslationError::Json {
            path: path.clone(),
            source,
        })?;
        for (full, text) in file {
            let (group, key) = split_key(&full)?;
            incoming
                .entry((group.to_string(), key.to_string()))
                .or_default()
                .insert(locale.clone(), Value::String(text));
        }
    }

    let existing: BTreeMap<(String, String), translation::Model> = translation::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|row| ((row.group.clone(), row.key.clone()), row))
        .collect();

    let mut report = ImportReport::default();
    let now = Utc::now();
    for ((group, key), texts) in incoming {
        match existing.get(&(group.clone(), key.clone())) {
            None => {
                translation::ActiveModel {
                    group: Set(group),
                    key: Set(key),
                    text: Set(Value::Object(texts)),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(db)
                .await?;
                report.created += 1;
            }
            Some(row) => {
                let mut merged = row.text.as_object().cloned().unwrap_or_default();
                merged.extend(texts);
                let merged = Value::Object(merged);
                if merged == row.text {
                    report.unchanged += 1;
                    continue;
                }
                let mut active = row.clone().into_active_model();
                active.text = Set(merged);
                active.updated_at = Set(now);
                active.update(db).await?;
                report.updated += 1;
            }
        }
    }
    info!(
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        "imported translations"
    );
    Ok(report)
}
