use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use validator::ValidateEmail;

use super::error::{CrudError, ValidationErrors};

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required,
    Email,
    /// Characters for strings, value for numbers, items for lists.
    Min(f64),
    Max(f64),
    Numeric,
    Integer,
    Boolean,
    In(Vec<Value>),
    /// `{field}_confirmation` must carry the same value.
    Confirmed,
    /// No other row may hold this value in `column`; `except` skips the row being edited.
    Unique { column: String, except: Option<i32> },
    Slug,
    Image,
    /// Allowed file extensions, e.g. `["jpg", "png"]`.
    Mimes(Vec<String>),
    MaxKilobytes(u64),
}

impl Rule {
    pub fn unique(column: impl Into<String>, except: Option<i32>) -> Self {
        Self::Unique {
            column: column.into(),
            except,
        }
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(values.into_iter().map(Into::into).collect())
    }

    pub fn mimes<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Mimes(extensions.into_iter().map(Into::into).collect())
    }
}

/// Answers uniqueness questions against the entity's table.
#[async_trait]
pub trait UniquenessCheck: Send + Sync {
    async fn is_taken(&self, column: &str, value: &Value, except: Option<i32>)
    -> Result<bool, CrudError>;
}

/// Rules keyed by data path. Translatable fields use `field.locale` paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet(BTreeMap<String, Vec<Rule>>);

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<I>(mut self, path: impl Into<String>, rules: I) -> Self
    where
        I: IntoIterator<Item = Rule>,
    {
        self.0.entry(path.into()).or_default().extend(rules);
        self
    }

    pub fn rules_for(&self, path: &str) -> &[Rule] {
        self.0.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `(path, column, except)` for every uniqueness rule.
    pub fn unique_rules(&self) -> impl Iterator<Item = (&str, &str, Option<i32>)> {
        self.0.iter().flat_map(|(path, rules)| {
            rules.iter().filter_map(move |rule| match rule {
                Rule::Unique { column, except } => Some((path.as_str(), column.as_str(), *except)),
                _ => None,
            })
        })
    }

    /// Check `bag` against every rule. All failures are collected before
    /// returning.
    pub async fn validate(
        &self,
        bag: &Value,
        unique: &dyn UniquenessCheck,
    ) -> Result<(), CrudError> {
        let mut errors = ValidationErrors::new();

        for (path, rules) in &self.0 {
            let value = lookup(bag, path);
            let attribute = attribute_name(path);

            if is_empty(value) {
                if rules.contains(&Rule::Required) {
                    errors.add(path, format!("The {attribute} field is required."));
                }
                continue;
            }
            let value = value.unwrap_or(&Value::Null);

            for rule in rules {
                let failure = match rule {
                    Rule::Unique { column, except } => {
                        if unique.is_taken(column, value, *except).await? {
                            Some(taken_message(path))
                        } else {
                            None
                        }
                    }
                    Rule::Confirmed => {
                        let confirmation = lookup(bag, &format!("{path}_confirmation"));
                        (confirmation != Some(value))
                            .then(|| format!("The {attribute} field confirmation does not match."))
                    }
                    other => check(other, value, &attribute),
                };
                if let Some(message) = failure {
                    errors.add(path, message);
                }
            }
        }

        errors.into_result()
    }
}

fn check(rule: &Rule, value: &Value, attribute: &str) -> Option<String> {
    match rule {
        Rule::Required | Rule::Unique { .. } | Rule::Confirmed => None,
        Rule::Email => {
            let ok = value.as_str().is_some_and(|s| s.validate_email());
            (!ok).then(|| format!("The {attribute} field must be a valid email address."))
        }
        Rule::Min(min) => match measure(value) {
            Some((size, unit)) if size < *min => Some(match unit {
                Unit::Characters => format!(
                    "The {attribute} field must be at least {} characters.",
                    number(*min)
                ),
                Unit::Value => format!("The {attribute} field must be at least {}.", number(*min)),
                Unit::Items => format!(
                    "The {attribute} field must have at least {} items.",
                    number(*min)
                ),
            }),
            _ => None,
        },
        Rule::Max(max) => match measure(value) {
            Some((size, unit)) if size > *max => Some(match unit {
                Unit::Characters => format!(
                    "The {attribute} field must not be greater than {} characters.",
                    number(*max)
                ),
                Unit::Value => format!(
                    "The {attribute} field must not be greater than {}.",
                    number(*max)
                ),
                Unit::Items => format!(
                    "The {attribute} field must not have more than {} items.",
                    number(*max)
                ),
            }),
            _ => None,
        },
        Rule::Numeric => as_number(value)
            .is_none()
            .then(|| format!("The {attribute} field must be a number.")),
        Rule::Integer => {
            let ok = as_number(value).is_some_and(|n| n.fract() == 0.0);
            (!ok).then(|| format!("The {attribute} field must be an integer."))
        }
        Rule::Boolean => {
            let ok = matches!(value, Value::Bool(_))
                || matches!(value.as_i64(), Some(0 | 1))
                || matches!(value.as_str(), Some("0" | "1" | "true" | "false"));
            (!ok).then(|| format!("The {attribute} field must be true or false."))
        }
        Rule::In(allowed) => {
            let ok = match value {
                Value::Array(items) => items.iter().all(|item| allowed.contains(item)),
                single => allowed.contains(single),
            };
            (!ok).then(|| format!("The selected {attribute} is invalid."))
        }
        Rule::Slug => {
            let ok = value.as_str().is_some_and(is_slug);
            (!ok).then(|| {
                format!(
                    "The {attribute} field may only contain lowercase letters, numbers and dashes."
                )
            })
        }
        Rule::Image => {
            let ok = files(value).all(|f| f.mime.starts_with("image/"));
            (!ok).then(|| format!("The {attribute} field must be an image."))
        }
        Rule::Mimes(extensions) => {
            let ok = files(value).all(|f| {
                let ext = f.extension();
                extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext))
            });
            (!ok).then(|| {
                format!(
                    "The {attribute} field must be a file of type: {}.",
                    extensions.join(", ")
                )
            })
        }
        Rule::MaxKilobytes(limit) => {
            let ok = files(value).all(|f| f.size <= limit * 1024);
            (!ok).then(|| {
                format!("The {attribute} field must not be greater than {limit} kilobytes.")
            })
        }
    }
}

enum Unit {
    Characters,
    Value,
    Items,
}

fn measure(value: &Value) -> Option<(f64, Unit)> {
    match value {
        Value::String(s) => Some((s.chars().count() as f64, Unit::Characters)),
        Value::Number(n) => n.as_f64().map(|n| (n, Unit::Value)),
        Value::Array(items) => Some((items.len() as f64, Unit::Items)),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Upload summary as it appears in a validation bag.
struct FileFacts {
    filename: String,
    mime: String,
    size: u64,
}

impl FileFacts {
    fn extension(&self) -> String {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

fn files(value: &Value) -> impl Iterator<Item = FileFacts> + '_ {
    let items: Box<dyn Iterator<Item = &Value> + '_> = match value {
        Value::Array(items) => Box::new(items.iter()),
        single => Box::new(std::iter::once(single)),
    };
    items.map(|item| FileFacts {
        filename: item["filename"].as_str().unwrap_or_default().to_string(),
        mime: item["mime"].as_str().unwrap_or_default().to_string(),
        size: item["size"].as_u64().unwrap_or(0),
    })
}

pub fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('-')
        && !s.ends_with('-')
        && !s.contains("--")
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn lookup<'a>(bag: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(bag, |node, segment| node.get(segment))
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// `"title.en"` -> `"title (en)"`, `"is_active"` -> `"is active"`.
pub fn taken_message(path: &str) -> String {
    format!("The {} has already been taken.", attribute_name(path))
}

fn attribute_name(path: &str) -> String {
    let mut parts = path.split('.');
    let head = parts.next().unwrap_or_default().replace('_', " ");
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        head
    } else {
        format!("{head} ({})", rest.join("."))
    }
}
