use thiserror::Error;

/// Why an uploaded file name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FilenameError {
    #[error("The file name cannot be empty.")]
    Empty,
    #[error("The file name may not contain control characters.")]
    ControlCharacter,
    #[error("The file name may not be a hidden file.")]
    Hidden,
    #[error("The file name is too long.")]
    TooLong,
}

const MAX_NAME_LEN: usize = 255;

/// Reduce a client-supplied name to a flat file name.
///
/// Browsers and some HTTP clients send full paths (`C:\fakepath\cv.pdf`);
/// only the last component is kept.
pub fn clean_upload_name(raw: &str) -> Result<String, FilenameError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();

    if base.is_empty() || base == "." || base == ".." {
        return Err(FilenameError::Empty);
    }
    if base.chars().any(|c| c.is_control()) {
        return Err(FilenameError::ControlCharacter);
    }
    if base.starts_with('.') {
        return Err(FilenameError::Hidden);
    }
    if base.len() > MAX_NAME_LEN {
        return Err(FilenameError::TooLong);
    }
    Ok(base.to_string())
}

/// `Content-Disposition` value with an ASCII fallback and an RFC 5987 UTF-8 name.
pub fn content_disposition(disposition: &str, filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' | b'_' | b'~' => {
                (b as char).to_string()
            }
            other => format!("%{other:02X}"),
        })
        .collect();
    format!("{disposition}; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}
