mod config;
mod context;
mod services;
mod session;
mod stages;
mod state;

pub use config::{IngestionConfig, IngestionTuning};
pub use context::SessionHandle;
#[allow(clippy::module_name_repetitions)]
pub use services::{
    ContentStoreClient, IndexingTrigger, MetadataRecorder, PipelineServices, ReadinessCheck,
    StorageContentStore, SurrealMetadataRecorder,
};
pub use session::{Locator, SessionFailure, SessionState, SourceFile, SourceInfo, UploadSession};

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError, storage::types::asset_metadata::AssetMetadata,
    utils::upload_limits::validate_source_file,
};
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use self::{
    context::PipelineContext,
    stages::{await_readiness, record_metadata, trigger_indexing, upload},
    state::idle,
};
use crate::{error::IngestionError, progress::ProgressSynthesizer};

/// What a successful ingestion hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionOutcome {
    pub session: UploadSession,
    pub locator: Locator,
    /// Absent when the best-effort metadata write failed.
    pub metadata: Option<AssetMetadata>,
}

/// A session running in the background.
pub struct SessionTicket {
    pub session_id: String,
    pub updates: watch::Receiver<UploadSession>,
    pub handle: JoinHandle<Result<IngestionOutcome, IngestionError>>,
}

struct ActiveSession {
    id: String,
    cancel: CancellationToken,
}

struct OwnerSlot {
    updates: Arc<watch::Sender<UploadSession>>,
    active: Option<ActiveSession>,
}

/// Runs one ingestion session per owner: upload, metadata, indexing trigger
/// and readiness polling, in that order.
///
/// Starting a new session for an owner cancels the one already running.
pub struct IngestionOrchestrator {
    services: PipelineServices,
    config: IngestionConfig,
    owners: Mutex<HashMap<String, OwnerSlot>>,
}

impl IngestionOrchestrator {
    pub fn new(services: PipelineServices, config: IngestionConfig) -> Self {
        Self {
            services,
            config,
            owners: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Ingest `file` for `owner_id` and wait until its index is ready.
    pub async fn ingest(
        &self,
        owner_id: &str,
        file: SourceFile,
    ) -> Result<IngestionOutcome, IngestionError> {
        let handle = self.begin(owner_id, &file).await?;
        let result = self.drive(&handle, file).await;
        self.release(&handle).await;
        result
    }

    /// Validate and start a session, then drive it on a background task.
    ///
    /// Rejected files fail here without creating a session.
    pub async fn spawn_ingest(
        self: &Arc<Self>,
        owner_id: &str,
        file: SourceFile,
    ) -> Result<SessionTicket, IngestionError> {
        let handle = self.begin(owner_id, &file).await?;
        let updates = handle.subscribe();
        let session_id = handle.id().to_string();

        let orchestrator = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = orchestrator.drive(&handle, file).await;
            orchestrator.release(&handle).await;
            result
        });

        Ok(SessionTicket {
            session_id,
            updates,
            handle: task,
        })
    }

    /// Cancel the owner's running session. Work already finished stays done;
    /// the session resets to `Idle`. Returns whether anything was cancelled.
    pub async fn cancel(&self, owner_id: &str) -> bool {
        let mut owners = self.owners.lock().await;
        let Some(slot) = owners.get_mut(owner_id) else {
            return false;
        };
        let Some(active) = slot.active.take() else {
            return false;
        };

        active.cancel.cancel();
        let reset = slot.updates.send_if_modified(|session| {
            if session.id != active.id || session.state.is_terminal() {
                return false;
            }
            session.mark_cancelled();
            true
        });
        info!(owner_id, session_id = %active.id, reset, "ingestion session cancelled");
        reset
    }

    /// Latest state of the owner's most recent session.
    pub async fn snapshot(&self, owner_id: &str) -> Option<UploadSession> {
        let owners = self.owners.lock().await;
        owners
            .get(owner_id)
            .map(|slot| slot.updates.borrow().clone())
    }

    /// Follow the owner's sessions, including ones started later.
    pub async fn subscribe(&self, owner_id: &str) -> Option<watch::Receiver<UploadSession>> {
        let owners = self.owners.lock().await;
        owners.get(owner_id).map(|slot| slot.updates.subscribe())
    }

    /// One readiness check for the owner, outside of any session.
    pub async fn is_ready(&self, owner_id: &str) -> Result<bool, AppError> {
        self.services.readiness.check(owner_id).await
    }

    async fn begin(&self, owner_id: &str, file: &SourceFile) -> Result<SessionHandle, IngestionError> {
        validate_source_file(
            &self.config.limits,
            file.file_name(),
            file.media_type(),
            usize::try_from(file.size()).unwrap_or(usize::MAX),
        )?;

        let session = UploadSession::new(owner_id, file.info().clone());
        let session_id = session.id.clone();
        let cancel = CancellationToken::new();

        let mut owners = self.owners.lock().await;
        let slot = owners
            .entry(owner_id.to_string())
            .or_insert_with(|| OwnerSlot {
                updates: Arc::new(watch::channel(session.clone()).0),
                active: None,
            });

        if let Some(previous) = slot.active.take() {
            previous.cancel.cancel();
            info!(
                owner_id,
                previous_session = %previous.id,
                session_id = %session_id,
                "superseding running ingestion session"
            );
        }

        slot.updates.send_replace(session);
        slot.active = Some(ActiveSession {
            id: session_id.clone(),
            cancel: cancel.clone(),
        });

        Ok(SessionHandle::new(
            session_id,
            owner_id.to_string(),
            cancel,
            Arc::clone(&slot.updates),
        ))
    }

    async fn release(&self, handle: &SessionHandle) {
        let mut owners = self.owners.lock().await;
        if let Some(slot) = owners.get_mut(handle.owner_id()) {
            if slot
                .active
                .as_ref()
                .is_some_and(|active| active.id == handle.id())
            {
                slot.active = None;
            }
        }
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    #[tracing::instrument(
        skip_all,
        fields(session_id = %handle.id(), owner_id = %handle.owner_id(), file_name = %file.file_name())
    )]
    async fn drive(
        &self,
        handle: &SessionHandle,
        file: SourceFile,
    ) -> Result<IngestionOutcome, IngestionError> {
        let mut ctx =
            PipelineContext::new(handle.clone(), &self.config, &self.services, file.info().clone());

        let machine = idle();
        let pipeline_started = Instant::now();

        let stage_start = Instant::now();
        let machine = upload(machine, &mut ctx, file)
            .await
            .map_err(|err| ctx.fail(err))?;
        let upload_ms = Self::duration_millis(stage_start.elapsed());

        let machine = record_metadata(machine, &mut ctx).map_err(|err| ctx.fail(err))?;

        let stage_start = Instant::now();
        let machine = trigger_indexing(machine, &mut ctx)
            .await
            .map_err(|err| ctx.fail(err))?;
        let trigger_ms = Self::duration_millis(stage_start.elapsed());

        let stage_start = Instant::now();
        let _machine = await_readiness(machine, &mut ctx)
            .await
            .map_err(|err| ctx.fail(err))?;
        let poll_ms = Self::duration_millis(stage_start.elapsed());

        let metadata = ctx.take_metadata().await.map_err(|err| ctx.fail(err))?;
        let reading = ctx.progress.settle(ProgressSynthesizer::complete_indexing);
        ctx.stop_ticker();
        ctx.handle
            .apply(|session| {
                session.state = SessionState::Ready;
                session.raise_progress(reading);
            })
            .map_err(|err| ctx.fail(err))?;

        let locator = ctx.locator().cloned().map_err(|err| ctx.fail(err))?;
        let session = handle.snapshot();
        info!(
            key = %locator.key,
            retries = session.retry_count,
            metadata_recorded = metadata.is_some(),
            total_ms = Self::duration_millis(pipeline_started.elapsed()),
            upload_ms,
            trigger_ms,
            poll_ms,
            "ingestion session ready"
        );
        debug!(warnings = session.warnings.len(), "ingestion session warnings");

        Ok(IngestionOutcome {
            session,
            locator,
            metadata,
        })
    }
}
