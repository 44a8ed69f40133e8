use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value, json};

use super::descriptor::{EntityDescriptor, Field, FieldType};
use super::error::CrudError;
use super::resource::{Record, as_bool, as_i32};
use super::translatable::{self, Translations};

/// A file received with a submission, not yet stored.
#[derive(Clone, PartialEq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn mime(&self) -> String {
        match self.content_type.as_deref() {
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
            _ => mime_guess::from_path(&self.filename)
                .first_or_octet_stream()
                .to_string(),
        }
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(Value),
    Translations(Translations),
    Related(Vec<i32>),
    Files(Vec<UploadedFile>),
}

/// Edit-form state, one entry per configured field.
pub type FormData = BTreeMap<String, FieldValue>;

/// Decode one submitted value according to the field's type.
///
/// Values that cannot be coerced are kept as sent so validation reports them.
pub fn decode(
    field: &Field,
    raw: Value,
    locale: &str,
    current: Option<&FieldValue>,
) -> Result<FieldValue, CrudError> {
    if field.kind.is_file() {
        return Err(CrudError::Malformed(format!(
            "`{}` expects a file upload",
            field.name
        )));
    }

    if field.relationship.is_some() {
        let items = match raw {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            single => vec![single],
        };
        let mut ids = Vec::with_capacity(items.len());
        for item in &items {
            if item.as_str().is_some_and(|s| s.trim().is_empty()) {
                continue;
            }
            let id = as_i32(item).ok_or_else(|| {
                let message = format!("The selected {} is invalid.", field.name);
                CrudError::validation(&field.name, message)
            })?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        return Ok(FieldValue::Related(ids));
    }

    if field.translatable {
        let mut translations = match current {
            Some(FieldValue::Translations(t)) => t.clone(),
            _ => Translations::new(),
        };
        match raw {
            Value::Object(map) => {
                for (code, text) in map {
                    translations.insert(code, translatable::scalar_text(&text));
                }
            }
            other => {
                translations.insert(locale.to_string(), translatable::scalar_text(&other));
            }
        }
        return Ok(FieldValue::Translations(translations));
    }

    let value = match field.kind {
        FieldType::Checkbox => as_bool(&raw).map(Value::Bool).unwrap_or(raw),
        FieldType::Number => match &raw {
            Value::String(s) if s.trim().is_empty() => Value::Null,
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| s.trim().parse::<f64>().map(Value::from))
                .unwrap_or(raw),
            _ => raw,
        },
        FieldType::Select => match &raw {
            Value::String(s) if s.is_empty() => Value::Null,
            // Dynamic choices are keyed by id.
            Value::String(s) if field.options.is_empty() => {
                s.trim().parse::<i64>().map(Value::from).unwrap_or(raw)
            }
            _ => field
                .options
                .iter()
                .find(|o| {
                    o.value == raw
                        || translatable::scalar_text(&o.value) == translatable::scalar_text(&raw)
                })
                .map(|o| o.value.clone())
                .unwrap_or(raw),
        },
        FieldType::Multiselect => match raw {
            Value::Null => Value::Array(Vec::new()),
            Value::Array(items) => Value::Array(items),
            single => Value::Array(vec![single]),
        },
        FieldType::Text
        | FieldType::Textarea
        | FieldType::Password
        | FieldType::Email
        | FieldType::Editor => match raw {
            Value::Null => Value::String(String::new()),
            Value::String(s) => Value::String(s),
            other => Value::String(translatable::scalar_text(&other)),
        },
        FieldType::FileUpload | FieldType::Circular => raw,
    };
    Ok(FieldValue::Scalar(value))
}

/// JSON view of the form used as the validation data bag.
pub fn validation_bag(form: &FormData) -> Value {
    let mut bag = Map::new();
    for (name, value) in form {
        let json = match value {
            FieldValue::Scalar(v) => v.clone(),
            FieldValue::Translations(t) => json!(t),
            FieldValue::Related(ids) => json!(ids),
            FieldValue::Files(files) => Value::Array(
                files
                    .iter()
                    .map(|f| {
                        json!({ "filename": f.filename, "mime": f.mime(), "size": f.bytes.len() })
                    })
                    .collect(),
            ),
        };
        bag.insert(name.clone(), json);
    }
    Value::Object(bag)
}

/// Submitted fields split by how they are persisted.
#[derive(Debug, Default, PartialEq)]
pub struct Partition {
    /// Attributes written to the entity row.
    pub plain: Map<String, Value>,
    /// `(relation, ids)` pairs synced after the row is written.
    pub relations: Vec<(String, Vec<i32>)>,
    /// File fields with newly submitted uploads.
    pub files: Vec<(Field, Vec<UploadedFile>)>,
    /// Write-only inputs dropped before persistence.
    pub discarded: Vec<String>,
}

pub fn partition(
    descriptor: &EntityDescriptor,
    form: &FormData,
    stored: Option<&Record>,
) -> Partition {
    let mut out = Partition::default();
    for field in &descriptor.fields {
        let Some(value) = form.get(&field.name) else {
            continue;
        };
        if field.kind.is_file() {
            if let FieldValue::Files(files) = value
                && !files.is_empty()
            {
                out.files.push((field.clone(), files.clone()));
            }
            continue;
        }
        if let Some(relation) = &field.relationship {
            let ids = match value {
                FieldValue::Related(ids) => ids.clone(),
                _ => Vec::new(),
            };
            out.relations.push((relation.clone(), ids));
            continue;
        }
        if !field.persist {
            out.discarded.push(field.name.clone());
            continue;
        }
        let json = match value {
            FieldValue::Translations(t) => {
                translatable::merge(stored.and_then(|r| r.get(&field.name)), t)
            }
            FieldValue::Scalar(v) => v.clone(),
            FieldValue::Related(ids) => json!(ids),
            FieldValue::Files(_) => continue,
        };
        out.plain.insert(field.name.clone(), json);
    }
    out
}
