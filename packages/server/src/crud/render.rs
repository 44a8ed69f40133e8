//! Render descriptors for list cells and form widgets.
//!
//! The API does not produce markup. Each column and field is turned into a
//! tagged JSON value the admin frontend draws.

use serde::Serialize;
use serde_json::{Map, Value};

use super::attachments::AttachmentSummary;
use super::descriptor::{BadgeColor, Column, ColumnType, Field, FieldType, SelectOption};
use super::form::FieldValue;
use super::translatable::{self, Translations};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cell {
    Text { value: String },
    Badge { value: String, color: BadgeColor },
    Image { url: Option<String> },
    Template { value: String },
}

/// Render one list cell. A template wins over the column type.
pub fn render_cell(
    column: &Column,
    row: &Map<String, Value>,
    locale: &str,
    fallback: &str,
) -> Cell {
    if let Some(template) = &column.template {
        return Cell::Template {
            value: fill_template(template, row, locale, fallback),
        };
    }
    let raw = row.get(&column.key).unwrap_or(&Value::Null);
    match column.kind {
        ColumnType::Plain => Cell::Text {
            value: display(raw, locale, fallback),
        },
        ColumnType::Badge => Cell::Badge {
            value: display(raw, locale, fallback),
            color: column
                .color_map
                .as_ref()
                .map(|colors| colors.color_for(raw))
                .unwrap_or_default(),
        },
        ColumnType::Image => Cell::Image {
            url: raw.as_str().filter(|s| !s.is_empty()).map(str::to_owned),
        },
    }
}

fn display(value: &Value, locale: &str, fallback: &str) -> String {
    match value {
        // Eager-loaded relations: [{ id, label }, ..]
        Value::Array(items) => items
            .iter()
            .map(|item| match item.get("label") {
                Some(label) => translatable::scalar_text(label),
                None => display(item, locale, fallback),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => translatable::text_for(other, locale, fallback),
    }
}

fn fill_template(template: &str, row: &Map<String, Value>, locale: &str, fallback: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let key = after[..end].trim();
                let value = row.get(key).unwrap_or(&Value::Null);
                out.push_str(&display(value, locale, fallback));
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum Widget {
    Text { value: String },
    Textarea { value: String },
    /// Never carries the stored hash or the last submitted value.
    Password,
    Email { value: String },
    Number { value: Value },
    Checkbox { checked: bool },
    Select { value: Value, options: Vec<SelectOption> },
    Multiselect { values: Vec<Value>, options: Vec<SelectOption> },
    FileUpload {
        multiple: bool,
        collection: String,
        existing: Vec<AttachmentSummary>,
    },
    Circular {
        collection: String,
        existing: Option<AttachmentSummary>,
    },
    Editor { value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedField {
    pub name: String,
    pub label: String,
    pub column_span: u8,
    pub translatable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translations: Option<Translations>,
    #[serde(flatten)]
    pub widget: Widget,
}

/// Inputs a field needs beyond its own state.
#[derive(Debug, Default)]
pub struct FieldExtras {
    pub options: Vec<SelectOption>,
    pub attachments: Vec<AttachmentSummary>,
}

pub fn render_field(
    field: &Field,
    value: Option<&FieldValue>,
    locale: &str,
    extras: FieldExtras,
) -> RenderedField {
    let translations = match value {
        Some(FieldValue::Translations(t)) if field.translatable => Some(t.clone()),
        _ => None,
    };
    let scalar = match value {
        Some(FieldValue::Scalar(v)) => v.clone(),
        Some(FieldValue::Translations(t)) => {
            Value::String(t.get(locale).cloned().unwrap_or_default())
        }
        Some(FieldValue::Related(ids)) => {
            Value::Array(ids.iter().map(|id| Value::from(*id)).collect())
        }
        Some(FieldValue::Files(_)) | None => Value::Null,
    };
    let text = || translatable::scalar_text(&scalar);
    let options = if field.options.is_empty() {
        extras.options
    } else {
        field.options.clone()
    };

    let widget = match field.kind {
        FieldType::Text => Widget::Text { value: text() },
        FieldType::Textarea => Widget::Textarea { value: text() },
        FieldType::Password => Widget::Password,
        FieldType::Email => Widget::Email { value: text() },
        FieldType::Number => Widget::Number { value: scalar.clone() },
        FieldType::Checkbox => Widget::Checkbox {
            checked: super::resource::as_bool(&scalar).unwrap_or(false),
        },
        FieldType::Select => Widget::Select {
            value: scalar.clone(),
            options,
        },
        FieldType::Multiselect => Widget::Multiselect {
            values: match &scalar {
                Value::Array(items) => items.clone(),
                Value::Null => Vec::new(),
                other => vec![other.clone()],
            },
            options,
        },
        FieldType::FileUpload => Widget::FileUpload {
            multiple: field.multiple,
            collection: field.collection_name().to_string(),
            existing: extras.attachments,
        },
        FieldType::Circular => Widget::Circular {
            collection: field.collection_name().to_string(),
            existing: extras.attachments.into_iter().next(),
        },
        FieldType::Editor => Widget::Editor { value: text() },
    };

    RenderedField {
        name: field.name.clone(),
        label: field.label.clone(),
        column_span: field.column_span,
        translatable: field.translatable,
        translations,
        widget,
    }
}
