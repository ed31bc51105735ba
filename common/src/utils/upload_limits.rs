use mime_guess::{from_path, mime};
use thiserror::Error;

use super::config::AppConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadValidationError {
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    BadRequest(String),
}

/// Admission rules applied to a file before any upload work starts.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub accepted_media_types: Vec<String>,
    pub max_file_bytes: usize,
}

impl UploadLimits {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            accepted_media_types: config.accepted_media_types.clone(),
            max_file_bytes: config.ingest_max_file_bytes,
        }
    }

    fn accepts(&self, media_type: &str) -> bool {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.accepted_media_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(&essence))
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

pub fn validate_source_file(
    limits: &UploadLimits,
    file_name: &str,
    media_type: &str,
    size: usize,
) -> Result<(), UploadValidationError> {
    if file_name.trim().is_empty() {
        return Err(UploadValidationError::BadRequest(
            "File name is missing".to_string(),
        ));
    }

    if size == 0 {
        return Err(UploadValidationError::BadRequest(format!(
            "File {file_name} is empty"
        )));
    }

    if !limits.accepts(media_type) {
        return Err(UploadValidationError::BadRequest(format!(
            "Unsupported media type {media_type}. Accepted types: {}",
            limits.accepted_media_types.join(", ")
        )));
    }

    if size > limits.max_file_bytes {
        return Err(UploadValidationError::PayloadTooLarge(format!(
            "File is too large. Maximum allowed is {} bytes",
            limits.max_file_bytes
        )));
    }

    Ok(())
}

/// Resolve the media type of an upload, falling back to the file extension
/// when the client sent nothing useful.
pub fn resolve_media_type(file_name: &str, declared: Option<&str>) -> String {
    match declared.map(str::trim) {
        Some(declared)
            if !declared.is_empty() && declared != mime::APPLICATION_OCTET_STREAM.as_ref() =>
        {
            declared.to_string()
        }
        _ => from_path(file_name)
            .first_or(mime::APPLICATION_OCTET_STREAM)
            .to_string(),
    }
}

/// Replace anything but ASCII alphanumerics and underscores, keeping the extension.
pub fn sanitize_file_name(file_name: &str) -> String {
    let scrub = |part: &str| -> String {
        part.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    };

    match file_name.rfind('.') {
        Some(idx) if idx > 0 => {
            let (name, ext) = file_name.split_at(idx);
            format!("{}.{}", scrub(name), scrub(ext.trim_start_matches('.')))
        }
        _ => scrub(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf_limits(max_file_bytes: usize) -> UploadLimits {
        UploadLimits {
            accepted_media_types: vec!["application/pdf".to_string()],
            max_file_bytes,
        }
    }

    #[test]
    fn validate_source_file_accepts_pdf_within_limit() {
        let result = validate_source_file(&pdf_limits(1024), "notes.pdf", "application/pdf", 512);

        assert!(result.is_ok());
    }

    #[test]
    fn validate_source_file_ignores_media_type_parameters() {
        let result = validate_source_file(
            &pdf_limits(1024),
            "notes.pdf",
            "Application/PDF; charset=binary",
            10,
        );

        assert!(result.is_ok());
    }

    #[test]
    fn validate_source_file_rejects_unsupported_media_type() {
        let result = validate_source_file(&pdf_limits(1024), "notes.txt", "text/plain", 10);

        assert!(matches!(result, Err(UploadValidationError::BadRequest(_))));
    }

    #[test]
    fn validate_source_file_rejects_oversized_file() {
        let result = validate_source_file(&pdf_limits(4), "notes.pdf", "application/pdf", 5);

        assert!(matches!(
            result,
            Err(UploadValidationError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn validate_source_file_rejects_empty_file() {
        let result = validate_source_file(&pdf_limits(4), "notes.pdf", "application/pdf", 0);

        assert!(matches!(result, Err(UploadValidationError::BadRequest(_))));
    }

    #[test]
    fn resolve_media_type_prefers_declared_value() {
        assert_eq!(
            resolve_media_type("scan.bin", Some("application/pdf")),
            "application/pdf"
        );
        assert_eq!(resolve_media_type("notes.pdf", None), "application/pdf");
        assert_eq!(
            resolve_media_type("notes.pdf", Some("application/octet-stream")),
            "application/pdf"
        );
    }

    #[test]
    fn sanitize_file_name_keeps_extension() {
        assert_eq!(sanitize_file_name("week 3 notes.pdf"), "week_3_notes.pdf");
        assert_eq!(sanitize_file_name("a/b..c.pdf"), "a_b__c.pdf");
        assert_eq!(sanitize_file_name("README"), "README");
    }
}
