use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{
    path::Path as ObjPath, Attribute, AttributeValue, Attributes, ObjectStore, PutMultipartOpts,
    PutPayload,
};
use tracing::debug;

use crate::utils::config::{AppConfig, StorageKind};

pub type DynStore = Arc<dyn ObjectStore>;

/// Per-object settings applied by [`StorageManager::put_with_progress`].
#[derive(Debug, Clone)]
pub struct PutSettings {
    /// Size of each multipart chunk; progress is reported once per chunk.
    pub chunk_bytes: usize,
    pub cache_control: Option<String>,
    pub content_type: Option<String>,
}

impl PutSettings {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            chunk_bytes: cfg.upload_chunk_bytes,
            cache_control: Some(format!("max-age={}", cfg.upload_cache_control)),
            content_type: None,
        }
    }
}

/// Storage manager with persistent state and proper lifecycle management.
#[derive(Clone)]
pub struct StorageManager {
    store: DynStore,
    backend_kind: StorageKind,
    local_base: Option<PathBuf>,
}

impl StorageManager {
    /// Create a new StorageManager with the specified configuration.
    pub async fn new(cfg: &AppConfig) -> object_store::Result<Self> {
        let backend_kind = cfg.storage.clone();
        let (store, local_base) = create_storage_backend(cfg).await?;

        Ok(Self {
            store,
            backend_kind,
            local_base,
        })
    }

    /// Create a StorageManager with a custom storage backend.
    pub fn with_backend(store: DynStore, backend_kind: StorageKind) -> Self {
        Self {
            store,
            backend_kind,
            local_base: None,
        }
    }

    pub fn backend_kind(&self) -> &StorageKind {
        &self.backend_kind
    }

    pub fn local_base_path(&self) -> Option<&Path> {
        self.local_base.as_deref()
    }

    /// Store bytes as a multipart upload, calling `on_progress(sent, total)`
    /// after every part is accepted by the backend.
    ///
    /// Object attributes are only attached on backends that persist them;
    /// the local filesystem backend rejects attributes outright.
    pub async fn put_with_progress(
        &self,
        location: &str,
        data: Bytes,
        settings: &PutSettings,
        on_progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        let opts = PutMultipartOpts {
            attributes: self.attributes_for(settings),
            ..Default::default()
        };
        let mut upload = self.store.put_multipart_opts(&path, opts).await?;

        let total = data.len() as u64;
        let chunk_bytes = settings.chunk_bytes.max(1);
        let mut offset = 0usize;

        while offset < data.len() {
            let end = offset.saturating_add(chunk_bytes).min(data.len());
            let part = PutPayload::from_bytes(data.slice(offset..end));
            if let Err(err) = upload.put_part(part).await {
                if let Err(abort_err) = upload.abort().await {
                    debug!(error = %abort_err, location, "Failed to abort multipart upload");
                }
                return Err(err);
            }
            offset = end;
            on_progress(offset as u64, total);
        }

        upload.complete().await?;
        if total == 0 {
            on_progress(0, 0);
        }

        Ok(())
    }

    /// Get a streaming handle for large objects.
    pub async fn get_stream(
        &self,
        location: &str,
    ) -> object_store::Result<BoxStream<'static, object_store::Result<Bytes>>> {
        let path = ObjPath::from(location);
        let result = self.store.get(&path).await?;
        Ok(result.into_stream())
    }

    /// Remove the object at `location`. Missing objects count as removed.
    pub async fn delete(&self, location: &str) -> object_store::Result<()> {
        let path = ObjPath::from(location);
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Check if an object exists at the specified location.
    pub async fn exists(&self, location: &str) -> object_store::Result<bool> {
        let path = ObjPath::from(location);
        self.store
            .head(&path)
            .await
            .map(|_| true)
            .or_else(|e| match e {
                object_store::Error::NotFound { .. } => Ok(false),
                _ => Err(e),
            })
    }

    fn attributes_for(&self, settings: &PutSettings) -> Attributes {
        let mut attributes = Attributes::new();
        if matches!(self.backend_kind, StorageKind::Local) {
            return attributes;
        }
        if let Some(cache_control) = &settings.cache_control {
            attributes.insert(
                Attribute::CacheControl,
                AttributeValue::from(cache_control.clone()),
            );
        }
        if let Some(content_type) = &settings.content_type {
            attributes.insert(
                Attribute::ContentType,
                AttributeValue::from(content_type.clone()),
            );
        }
        attributes
    }
}

/// Reject object keys that could escape the store root.
pub fn is_safe_location(location: &str) -> bool {
    let relative = Path::new(location);
    !location.is_empty()
        && !relative.is_absolute()
        && !relative
            .components()
            .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
}

async fn create_storage_backend(
    cfg: &AppConfig,
) -> object_store::Result<(DynStore, Option<PathBuf>)> {
    match cfg.storage {
        StorageKind::Local => {
            let base = resolve_base_dir(cfg);
            if !base.exists() {
                tokio::fs::create_dir_all(&base).await.map_err(|e| {
                    object_store::Error::Generic {
                        store: "LocalFileSystem",
                        source: e.into(),
                    }
                })?;
            }
            let store = LocalFileSystem::new_with_prefix(base.clone())?;
            Ok((Arc::new(store), Some(base)))
        }
        StorageKind::Memory => {
            let store = InMemory::new();
            Ok((Arc::new(store), None))
        }
    }
}

/// Resolve the absolute base directory used for local storage from config.
///
/// If `data_dir` is relative, it is resolved against the current working directory.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Mutex;

    fn test_config_memory() -> AppConfig {
        AppConfig {
            storage: StorageKind::Memory,
            ..Default::default()
        }
    }

    fn settings(chunk_bytes: usize) -> PutSettings {
        PutSettings {
            chunk_bytes,
            cache_control: Some("max-age=3600".into()),
            content_type: Some("application/pdf".into()),
        }
    }

    async fn read_all(storage: &StorageManager, location: &str) -> Vec<u8> {
        let mut stream = storage.get_stream(location).await.expect("stream");
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.expect("stream chunk"));
        }
        collected
    }

    #[tokio::test]
    async fn put_with_progress_reports_every_chunk() {
        let storage = StorageManager::new(&test_config_memory())
            .await
            .expect("create storage manager");
        let reports = Mutex::new(Vec::new());
        let data = Bytes::from(vec![7u8; 10]);

        storage
            .put_with_progress(
                "uploads/public/1-a.pdf",
                data.clone(),
                &settings(4),
                &|sent, total| reports.lock().expect("reports lock").push((sent, total)),
            )
            .await
            .expect("multipart put");

        assert_eq!(
            *reports.lock().expect("reports lock"),
            vec![(4, 10), (8, 10), (10, 10)]
        );
        let stored = read_all(&storage, "uploads/public/1-a.pdf").await;
        assert_eq!(stored, data.to_vec());
    }

    #[tokio::test]
    async fn put_with_progress_works_on_local_backend() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = AppConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            storage: StorageKind::Local,
            ..Default::default()
        };
        let storage = StorageManager::new(&cfg)
            .await
            .expect("create storage manager");
        assert_eq!(storage.local_base_path(), Some(dir.path()));

        storage
            .put_with_progress(
                "uploads/public/2-b.pdf",
                Bytes::from_static(b"%PDF-1.7 local"),
                &settings(5),
                &|_, _| {},
            )
            .await
            .expect("multipart put");

        assert!(storage
            .exists("uploads/public/2-b.pdf")
            .await
            .expect("exists check"));
        let on_disk = tokio::fs::read(dir.path().join("uploads/public/2-b.pdf"))
            .await
            .expect("file on disk");
        assert_eq!(on_disk, b"%PDF-1.7 local");
    }

    #[tokio::test]
    async fn large_objects_stream_back_and_can_be_deleted() {
        let storage = StorageManager::new(&test_config_memory())
            .await
            .expect("create storage manager");
        let content = vec![42u8; 1024 * 64];

        storage
            .put_with_progress(
                "dir1/file1.bin",
                Bytes::from(content.clone()),
                &settings(1024 * 16),
                &|_, _| {},
            )
            .await
            .expect("multipart put");

        assert_eq!(read_all(&storage, "dir1/file1.bin").await, content);

        storage.delete("dir1/file1.bin").await.expect("delete");
        assert!(!storage.exists("dir1/file1.bin").await.expect("exists check"));
        storage
            .delete("dir1/file1.bin")
            .await
            .expect("deleting a missing object is not an error");
    }

    #[tokio::test]
    async fn missing_objects_are_reported() {
        let storage = StorageManager::with_backend(Arc::new(InMemory::new()), StorageKind::Memory);

        assert!(storage.get_stream("nope.pdf").await.is_err());
        assert!(!storage.exists("nope.pdf").await.expect("exists check"));
        assert_eq!(*storage.backend_kind(), StorageKind::Memory);
    }

    #[test]
    fn unsafe_locations_are_rejected() {
        assert!(is_safe_location("uploads/public/1-a.pdf"));
        assert!(!is_safe_location("../etc/passwd"));
        assert!(!is_safe_location("/etc/passwd"));
        assert!(!is_safe_location(""));
    }
}
