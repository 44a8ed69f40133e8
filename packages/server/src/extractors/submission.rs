use std::collections::BTreeMap;

use axum::{
    extract::{FromRequest, Multipart, Request},
    http::header,
};
use serde_json::{Map, Value};

use crate::crud::form::UploadedFile;
use crate::error::AppError;
use crate::extractors::json::{AppJson, from_slice};

/// A create or update form submission.
///
/// Accepted either as a JSON object of field values, or as
/// `multipart/form-data` where the `data` part carries that same object and
/// every part with a filename is an upload for the field it is named after
/// (`gallery` and `gallery[]` are the same field).
#[derive(Debug, Default)]
pub struct FormSubmission {
    pub data: Map<String, Value>,
    pub files: BTreeMap<String, Vec<UploadedFile>>,
}

impl<S> FromRequest<S> for FormSubmission
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let AppJson(data) = AppJson::<Map<String, Value>>::from_request(req, state).await?;
            return Ok(FormSubmission {
                data,
                files: BTreeMap::new(),
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        let mut submission = FormSubmission::default();

        while let Some(part) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
        {
            let Some(name) = part.name().map(field_name) else {
                continue;
            };
            match part.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = part.content_type().map(str::to_string);
                    let bytes = part
                        .bytes()
                        .await
                        .map_err(|e| {
                            AppError::Validation(format!("Failed to read `{name}`: {e}"))
                        })?;
                    // Browsers send an empty part for an untouched file input.
                    if filename.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    submission.files.entry(name).or_default().push(UploadedFile {
                        filename,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                None if name == "data" => {
                    let bytes = part
                        .bytes()
                        .await
                        .map_err(|e| AppError::Validation(format!("Failed to read `data`: {e}")))?;
                    submission.data = from_slice(&bytes, "`data` part")?;
                }
                None => {
                    let text = part
                        .text()
                        .await
                        .map_err(|e| {
                            AppError::Validation(format!("Failed to read `{name}`: {e}"))
                        })?;
                    submission.data.insert(name, Value::String(text));
                }
            }
        }

        Ok(submission)
    }
}

fn field_name(raw: &str) -> String {
    raw.strip_suffix("[]").unwrap_or(raw).to_string()
}
