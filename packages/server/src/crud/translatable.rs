use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Per-locale values of one translatable attribute.
pub type Translations = BTreeMap<String, String>;

/// Read a stored translation column for every configured locale.
///
/// Missing locales (and a column that was never written) come back as empty
/// strings. A legacy plain-string column is treated as the fallback locale's
/// text.
pub fn hydrate<'a>(
    stored: Option<&Value>,
    locales: impl IntoIterator<Item = &'a str>,
    fallback: &str,
) -> Translations {
    locales
        .into_iter()
        .map(|code| {
            let text = match stored {
                Some(Value::Object(map)) => map.get(code).and_then(as_text),
                Some(Value::String(s)) if code == fallback => Some(s.clone()),
                _ => None,
            };
            (code.to_string(), text.unwrap_or_default())
        })
        .collect()
}

/// Overlay submitted locales on what is stored; locales absent from the
/// submission keep their stored text.
pub fn merge(stored: Option<&Value>, submitted: &Translations) -> Value {
    let mut out = match stored {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    for (code, text) in submitted {
        out.insert(code.clone(), Value::String(text.clone()));
    }
    Value::Object(out)
}

/// Pick the text to display for `locale`, falling back to `fallback` and
/// then to the first non-empty translation.
pub fn text_for(value: &Value, locale: &str, fallback: &str) -> String {
    match value {
        Value::Object(map) => [locale, fallback]
            .iter()
            .filter_map(|code| map.get(*code).and_then(as_text))
            .find(|s| !s.is_empty())
            .or_else(|| map.values().filter_map(as_text).find(|s| !s.is_empty()))
            .unwrap_or_default(),
        other => scalar_text(other),
    }
}

/// Display form of a non-translatable JSON value.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(scalar_text(other)),
    }
}
