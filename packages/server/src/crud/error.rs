use std::collections::BTreeMap;
use std::fmt;

use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

use super::notice::Notice;

/// Field-keyed validation failures, e.g. `"title.fr" -> ["The title (fr) field is required."]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), CrudError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CrudError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields().collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

#[derive(Debug, Error)]
pub enum CrudError {
    #[error("no configuration registered for alias `{0}`")]
    ConfigurationNotFound(String),

    #[error("not permitted")]
    Authorization,

    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("{entity} #{id} not found")]
    NotFound { entity: String, id: i32 },

    #[error("nothing is staged for deletion")]
    NoPendingDeletion,

    #[error("malformed submission: {0}")]
    Malformed(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] DbErr),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("image processing failed: {0}")]
    ImageProcessing(String),

    #[error("invalid entity configuration: {0}")]
    InvalidConfiguration(String),
}

impl CrudError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    /// User-facing notice for failures that must not leak detail.
    pub fn notice(&self) -> Notice {
        match self {
            Self::Validation(_) => Notice::error("Please correct the highlighted fields."),
            Self::Authorization => Notice::error("You are not permitted to do that."),
            Self::UploadFailed(_) => Notice::error("The file could not be uploaded."),
            _ => Notice::error("Something went wrong. Please try again."),
        }
    }
}
