use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ErrorKind, IngestionError},
    progress::ProgressReading,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Uploading,
    Stored,
    Triggering,
    Polling,
    Ready,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

/// Name, media type and size of an ingested file. Sessions carry this
/// instead of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub file_name: String,
    pub media_type: String,
    pub size: u64,
}

/// The payload being ingested. Immutable once constructed; only the upload
/// stage holds on to the bytes.
#[derive(Debug, Clone)]
pub struct SourceFile {
    info: SourceInfo,
    bytes: Bytes,
}

impl SourceFile {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            info: SourceInfo {
                file_name: file_name.into(),
                media_type: media_type.into(),
                size: bytes.len() as u64,
            },
            bytes,
        }
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn file_name(&self) -> &str {
        &self.info.file_name
    }

    pub fn media_type(&self) -> &str {
        &self.info.media_type
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

/// Where the content store put an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&IngestionError> for SessionFailure {
    fn from(err: &IngestionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// One ingestion attempt for one owner.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSession {
    pub id: String,
    pub owner_id: String,
    pub source: SourceInfo,
    pub state: SessionState,
    pub upload_progress: u8,
    pub index_progress: u8,
    pub overall_progress: u8,
    pub retry_count: u32,
    pub locator: Option<Locator>,
    pub error: Option<SessionFailure>,
    /// Non-fatal problems, such as a failed metadata write.
    pub warnings: Vec<String>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(owner_id: impl Into<String>, source: SourceInfo) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            source,
            state: SessionState::Idle,
            upload_progress: 0,
            index_progress: 0,
            overall_progress: 0,
            retry_count: 0,
            locator: None,
            error: None,
            warnings: Vec::new(),
            cancelled: false,
            started_at: now,
            updated_at: now,
        }
    }

    /// Whether nothing will change this session anymore.
    pub fn is_settled(&self) -> bool {
        self.cancelled || self.state.is_terminal()
    }

    /// Raise progress fields to `reading`. A phase shows 100 only once the
    /// session state says it is done.
    pub(crate) fn raise_progress(&mut self, reading: ProgressReading) -> bool {
        let upload_cap = if matches!(self.state, SessionState::Idle | SessionState::Uploading) {
            99
        } else {
            100
        };
        let index_cap = if self.state == SessionState::Ready {
            100
        } else {
            99
        };

        let upload = self.upload_progress.max(reading.upload.min(upload_cap));
        let index = self.index_progress.max(reading.index.min(index_cap));
        let overall = self
            .overall_progress
            .max(ProgressReading { upload, index }.overall());
        if (upload, index, overall)
            == (self.upload_progress, self.index_progress, self.overall_progress)
        {
            return false;
        }

        self.upload_progress = upload;
        self.index_progress = index;
        self.overall_progress = overall;
        true
    }

    pub(crate) fn mark_stored(&mut self, locator: Locator) {
        if self.locator.is_none() {
            self.locator = Some(locator);
        }
        self.state = SessionState::Stored;
    }

    pub(crate) fn mark_failed(&mut self, failure: SessionFailure) {
        self.state = SessionState::Failed;
        self.error = Some(failure);
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.state = SessionState::Idle;
        self.cancelled = true;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> UploadSession {
        UploadSession::new(
            "owner-1",
            SourceFile::new("notes.pdf", "application/pdf", Bytes::from_static(b"%PDF"))
                .info()
                .clone(),
        )
    }

    #[test]
    fn new_sessions_start_idle_with_unique_ids() {
        let first = session();
        let second = session();

        assert_eq!(first.state, SessionState::Idle);
        assert_eq!(first.source.size, 4);
        assert_ne!(first.id, second.id);
        assert!(!first.is_settled());
    }

    #[test]
    fn locator_is_never_replaced() {
        let mut session = session();
        let first = Locator {
            key: "uploads/public/1-notes.pdf".into(),
            url: "http://files/1".into(),
        };
        session.mark_stored(first.clone());
        session.mark_stored(Locator {
            key: "other".into(),
            url: "http://files/2".into(),
        });

        assert_eq!(session.locator, Some(first));
        assert_eq!(session.state, SessionState::Stored);
    }

    #[test]
    fn progress_only_rises_and_respects_phase_caps() {
        let mut session = session();
        session.state = SessionState::Uploading;

        assert!(session.raise_progress(ProgressReading {
            upload: 100,
            index: 0
        }));
        assert_eq!(session.upload_progress, 99);
        assert!(!session.raise_progress(ProgressReading {
            upload: 40,
            index: 0
        }));
        assert_eq!(session.upload_progress, 99);

        session.state = SessionState::Polling;
        session.raise_progress(ProgressReading {
            upload: 100,
            index: 100,
        });
        assert_eq!((session.upload_progress, session.index_progress), (100, 99));

        session.state = SessionState::Ready;
        session.raise_progress(ProgressReading {
            upload: 100,
            index: 100,
        });
        assert_eq!(session.index_progress, 100);
        assert_eq!(session.overall_progress, 100);
    }

    #[test]
    fn cancelled_session_resets_to_idle_without_error() {
        let mut session = session();
        session.mark_failed(SessionFailure::from(&IngestionError::StoreUnavailable(
            "quota".into(),
        )));
        session.mark_cancelled();

        assert_eq!(session.state, SessionState::Idle);
        assert!(session.error.is_none());
        assert!(session.is_settled());
    }

    #[test]
    fn serialised_session_omits_file_bytes() {
        let json = serde_json::to_value(session()).expect("serialise");

        assert_eq!(json["state"], "idle");
        assert_eq!(json["source"]["file_name"], "notes.pdf");
        assert_eq!(json["source"]["size"], 4);
        assert!(json["source"].get("bytes").is_none());
    }
}
