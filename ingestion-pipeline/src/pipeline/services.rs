use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::{PutSettings, StorageManager},
        types::asset_metadata::AssetMetadata,
    },
    utils::{config::AppConfig, upload_limits::sanitize_file_name},
};
use tracing::info;

use super::session::{Locator, SourceFile, SourceInfo};
use crate::indexing::IndexingClient;

/// Stores a payload and reports byte progress as `(sent, total)`.
#[async_trait]
pub trait ContentStoreClient: Send + Sync {
    async fn upload(
        &self,
        owner_id: &str,
        file: &SourceFile,
        on_progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> Result<Locator, AppError>;
}

#[async_trait]
pub trait MetadataRecorder: Send + Sync {
    async fn record(
        &self,
        locator: &Locator,
        owner_id: &str,
        file: &SourceInfo,
    ) -> Result<AssetMetadata, AppError>;
}

/// Starts remote indexing. Implementations must tolerate repeated calls for
/// the same locator.
#[async_trait]
pub trait IndexingTrigger: Send + Sync {
    async fn trigger(&self, locator: &Locator, owner_id: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self, owner_id: &str) -> Result<bool, AppError>;
}

/// The collaborators one orchestrator drives.
#[derive(Clone)]
pub struct PipelineServices {
    pub store: Arc<dyn ContentStoreClient>,
    pub metadata: Arc<dyn MetadataRecorder>,
    pub trigger: Arc<dyn IndexingTrigger>,
    pub readiness: Arc<dyn ReadinessCheck>,
}

impl PipelineServices {
    pub fn new(
        store: Arc<dyn ContentStoreClient>,
        metadata: Arc<dyn MetadataRecorder>,
        trigger: Arc<dyn IndexingTrigger>,
        readiness: Arc<dyn ReadinessCheck>,
    ) -> Self {
        Self {
            store,
            metadata,
            trigger,
            readiness,
        }
    }

    /// Wire the production collaborators: object storage, SurrealDB and the
    /// HTTP indexing service.
    pub fn from_app_config(
        db: Arc<SurrealDbClient>,
        storage: StorageManager,
        config: &AppConfig,
    ) -> Result<Self, AppError> {
        let indexing = Arc::new(IndexingClient::from_app_config(config)?);

        Ok(Self::new(
            Arc::new(StorageContentStore::new(storage, config)),
            Arc::new(SurrealMetadataRecorder::new(db)),
            Arc::clone(&indexing) as Arc<dyn IndexingTrigger>,
            indexing,
        ))
    }
}

pub struct StorageContentStore {
    storage: StorageManager,
    bucket: String,
    public_base_url: String,
    put_settings: PutSettings,
}

impl StorageContentStore {
    pub fn new(storage: StorageManager, config: &AppConfig) -> Self {
        Self {
            storage,
            bucket: config.upload_bucket.trim_matches('/').to_string(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            put_settings: PutSettings::from_app_config(config),
        }
    }

    fn object_key(&self, file_name: &str) -> String {
        format!(
            "{}/public/{}-{}",
            self.bucket,
            Utc::now().timestamp_millis(),
            sanitize_file_name(file_name)
        )
    }
}

#[async_trait]
impl ContentStoreClient for StorageContentStore {
    async fn upload(
        &self,
        owner_id: &str,
        file: &SourceFile,
        on_progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> Result<Locator, AppError> {
        let key = self.object_key(file.file_name());
        let settings = PutSettings {
            content_type: Some(file.media_type().to_string()),
            ..self.put_settings.clone()
        };

        self.storage
            .put_with_progress(&key, file.bytes().clone(), &settings, on_progress)
            .await?;

        info!(owner_id, key = %key, bytes = file.size(), "asset stored");

        Ok(Locator {
            url: format!("{}/{}", self.public_base_url, key),
            key,
        })
    }
}

pub struct SurrealMetadataRecorder {
    db: Arc<SurrealDbClient>,
}

impl SurrealMetadataRecorder {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataRecorder for SurrealMetadataRecorder {
    async fn record(
        &self,
        locator: &Locator,
        owner_id: &str,
        file: &SourceInfo,
    ) -> Result<AssetMetadata, AppError> {
        let item = AssetMetadata::new(
            locator.key.clone(),
            locator.url.clone(),
            owner_id.to_string(),
            file.file_name.clone(),
            file.size,
            file.media_type.clone(),
        );

        self.db.store_item(item).await?.ok_or_else(|| {
            AppError::InternalError("metadata insert returned no record".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use common::utils::config::StorageKind;
    use futures::StreamExt;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn memory_config() -> AppConfig {
        AppConfig {
            storage: StorageKind::Memory,
            public_base_url: "http://files.test/api/v1/files/".into(),
            upload_chunk_bytes: 3,
            ..Default::default()
        }
    }

    fn pdf() -> SourceFile {
        SourceFile::new(
            "week 3 notes.pdf",
            "application/pdf",
            Bytes::from_static(b"%PDF-1.7"),
        )
    }

    #[tokio::test]
    async fn storage_content_store_uploads_under_public_prefix() {
        let config = memory_config();
        let storage = StorageManager::new(&config).await.expect("storage");
        let store = StorageContentStore::new(storage.clone(), &config);
        let reports = Mutex::new(Vec::new());

        let locator = store
            .upload("owner-1", &pdf(), &|sent, total| {
                reports.lock().expect("reports lock").push((sent, total));
            })
            .await
            .expect("upload");

        assert!(locator.key.starts_with("uploads/public/"));
        assert!(locator.key.ends_with("-week_3_notes.pdf"));
        assert_eq!(
            locator.url,
            format!("http://files.test/api/v1/files/{}", locator.key)
        );
        let mut stored = Vec::new();
        let mut stream = storage.get_stream(&locator.key).await.expect("stored object");
        while let Some(chunk) = stream.next().await {
            stored.extend_from_slice(&chunk.expect("stream chunk"));
        }
        assert_eq!(stored, b"%PDF-1.7");
        assert_eq!(
            reports.lock().expect("reports lock").last().copied(),
            Some((8, 8))
        );
    }

    #[tokio::test]
    async fn surreal_metadata_recorder_inserts_once() {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        );
        let recorder = SurrealMetadataRecorder::new(Arc::clone(&db));
        let locator = Locator {
            key: "uploads/public/1-notes.pdf".into(),
            url: "http://files.test/uploads/public/1-notes.pdf".into(),
        };

        let stored = recorder
            .record(&locator, "owner-1", pdf().info())
            .await
            .expect("metadata stored");
        assert_eq!(stored.locator_key, locator.key);
        assert_eq!(stored.file_size, 8);
        assert_eq!(stored.mime_type, "application/pdf");

        let listed = AssetMetadata::list_for_owner("owner-1", &db)
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);

        assert!(recorder.record(&locator, "owner-1", pdf().info()).await.is_err());
    }
}
