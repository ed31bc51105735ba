use common::utils::upload_limits::UploadValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, serialisable classification of an ingestion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFile,
    StoreUnavailable,
    MetadataWriteFailed,
    IndexingTriggerFailed,
    ReadinessTimeout,
    SessionCancelled,
    Internal,
}

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("File rejected: {0}")]
    UnsupportedFile(#[from] UploadValidationError),
    #[error("Content store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Metadata write failed: {0}")]
    MetadataWriteFailed(String),
    #[error("Indexing trigger failed after {attempts} attempts: {cause}")]
    IndexingTriggerFailed { attempts: u32, cause: String },
    #[error(
        "Index not ready after {attempts} checks in {elapsed_ms} ms{}",
        describe_cause(.last_error)
    )]
    ReadinessTimeout {
        attempts: u32,
        elapsed_ms: u64,
        last_error: Option<String>,
    },
    #[error("Session cancelled")]
    SessionCancelled,
    #[error("Internal ingestion error: {0}")]
    Internal(String),
}

fn describe_cause(cause: &Option<String>) -> String {
    cause
        .as_deref()
        .map(|cause| format!(" (last error: {cause})"))
        .unwrap_or_default()
}

impl IngestionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFile(_) => ErrorKind::UnsupportedFile,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::MetadataWriteFailed(_) => ErrorKind::MetadataWriteFailed,
            Self::IndexingTriggerFailed { .. } => ErrorKind::IndexingTriggerFailed,
            Self::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            Self::SessionCancelled => ErrorKind::SessionCancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Fatal errors end the session in `Failed` and surface to the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MetadataWriteFailed(_) | Self::SessionCancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_and_metadata_failures_are_not_fatal() {
        assert!(!IngestionError::SessionCancelled.is_fatal());
        assert!(!IngestionError::MetadataWriteFailed("db down".into()).is_fatal());
        assert!(IngestionError::StoreUnavailable("quota".into()).is_fatal());
        assert!(IngestionError::IndexingTriggerFailed {
            attempts: 4,
            cause: "503".into()
        }
        .is_fatal());
    }

    #[test]
    fn readiness_timeout_mentions_last_error() {
        let err = IngestionError::ReadinessTimeout {
            attempts: 2,
            elapsed_ms: 20_000,
            last_error: Some("connection refused".into()),
        };
        assert_eq!(err.kind(), ErrorKind::ReadinessTimeout);
        assert_eq!(
            err.to_string(),
            "Index not ready after 2 checks in 20000 ms (last error: connection refused)"
        );

        let quiet = IngestionError::ReadinessTimeout {
            attempts: 30,
            elapsed_ms: 300_000,
            last_error: None,
        };
        assert_eq!(
            quiet.to_string(),
            "Index not ready after 30 checks in 300000 ms"
        );
    }

    #[test]
    fn kinds_serialise_in_snake_case() {
        let json = serde_json::to_string(&ErrorKind::IndexingTriggerFailed).expect("serialise");
        assert_eq!(json, "\"indexing_trigger_failed\"");
    }
}
