use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::Utc;
use common::storage::types::asset_metadata::AssetMetadata;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, timeout, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    config::IngestionConfig,
    services::PipelineServices,
    session::{Locator, SessionFailure, SourceInfo, UploadSession},
};
use crate::{
    error::IngestionError,
    progress::{ProgressReading, ProgressSynthesizer},
};

/// Write access to one session, valid only while that session is current.
///
/// Every mutation goes through the owner's watch channel and is rejected once
/// the session was cancelled or replaced, so late responses cannot touch it.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    owner_id: String,
    cancel: CancellationToken,
    updates: Arc<watch::Sender<UploadSession>>,
}

impl SessionHandle {
    pub fn new(
        id: String,
        owner_id: String,
        cancel: CancellationToken,
        updates: Arc<watch::Sender<UploadSession>>,
    ) -> Self {
        Self {
            id,
            owner_id,
            cancel,
            updates,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadSession> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> UploadSession {
        self.updates.borrow().clone()
    }

    pub fn is_current(&self) -> bool {
        !self.cancel.is_cancelled() && self.updates.borrow().id == self.id
    }

    pub fn ensure_current(&self) -> Result<(), IngestionError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(IngestionError::SessionCancelled)
        }
    }

    /// Mutate the session if it is still current.
    pub fn apply(&self, change: impl FnOnce(&mut UploadSession)) -> Result<(), IngestionError> {
        let applied = self.updates.send_if_modified(|session| {
            if session.id != self.id || self.cancel.is_cancelled() {
                return false;
            }
            change(session);
            session.updated_at = Utc::now();
            true
        });

        if applied {
            Ok(())
        } else {
            Err(IngestionError::SessionCancelled)
        }
    }

    /// Publish a progress reading. Values only ever move up and freeze once
    /// the session is settled.
    pub fn apply_progress(&self, reading: ProgressReading) -> bool {
        self.updates.send_if_modified(|session| {
            if session.id != self.id || self.cancel.is_cancelled() || session.is_settled() {
                return false;
            }
            session.raise_progress(reading)
        })
    }

    /// Await `work` unless the session is cancelled first. Results that
    /// arrive after the session stopped being current are discarded.
    pub async fn guarded<F: Future>(&self, work: F) -> Result<F::Output, IngestionError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(IngestionError::SessionCancelled),
            output = work => {
                self.ensure_current()?;
                Ok(output)
            }
        }
    }
}

/// Shared synthesizer feeding one session's progress fields.
#[derive(Clone)]
pub struct ProgressFeed {
    synthesizer: Arc<Mutex<ProgressSynthesizer>>,
    handle: SessionHandle,
}

impl ProgressFeed {
    pub fn new(handle: SessionHandle, synthesizer: ProgressSynthesizer) -> Self {
        Self {
            synthesizer: Arc::new(Mutex::new(synthesizer)),
            handle,
        }
    }

    pub fn update(&self, change: impl FnOnce(&mut ProgressSynthesizer)) {
        let reading = {
            let mut synthesizer = self
                .synthesizer
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            change(&mut *synthesizer);
            synthesizer.reading()
        };
        self.handle.apply_progress(reading);
    }

    /// Update the synthesizer without publishing, for callers that publish
    /// the reading together with a state change.
    pub fn settle(&self, change: impl FnOnce(&mut ProgressSynthesizer)) -> ProgressReading {
        let mut synthesizer = self
            .synthesizer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        change(&mut *synthesizer);
        synthesizer.reading()
    }
}

/// Animation timer owned by a session; stops when dropped or cancelled.
pub struct ProgressTicker {
    task: JoinHandle<()>,
}

impl ProgressTicker {
    pub fn spawn(feed: ProgressFeed, period: Duration) -> Self {
        let cancel = feed.handle.cancel_token().clone();
        let period = period.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticks.tick() => feed.update(ProgressSynthesizer::tick),
                }
            }
        });

        Self { task }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct PipelineContext<'a> {
    pub handle: SessionHandle,
    pub config: &'a IngestionConfig,
    pub services: &'a PipelineServices,
    pub source: SourceInfo,
    pub locator: Option<Locator>,
    pub metadata_task: Option<JoinHandle<Option<AssetMetadata>>>,
    pub progress: ProgressFeed,
    ticker: Option<ProgressTicker>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        handle: SessionHandle,
        config: &'a IngestionConfig,
        services: &'a PipelineServices,
        source: SourceInfo,
    ) -> Self {
        let progress = ProgressFeed::new(
            handle.clone(),
            ProgressSynthesizer::new(config.tuning.progress.clone()),
        );
        Self {
            handle,
            config,
            services,
            source,
            locator: None,
            metadata_task: None,
            progress,
            ticker: None,
        }
    }

    pub fn locator(&self) -> Result<&Locator, IngestionError> {
        self.locator
            .as_ref()
            .ok_or_else(|| IngestionError::Internal("locator expected to be available".into()))
    }

    pub fn start_ticker(&mut self) {
        if self.ticker.is_none() {
            self.ticker = Some(ProgressTicker::spawn(
                self.progress.clone(),
                self.config.tuning.progress_tick,
            ));
        }
    }

    pub fn stop_ticker(&mut self) {
        self.ticker = None;
    }

    /// Collect the background metadata write, if one was started.
    ///
    /// Waits at most `metadata_grace`; a write still running after that is
    /// left to finish on its own and reported as a warning.
    pub async fn take_metadata(&mut self) -> Result<Option<AssetMetadata>, IngestionError> {
        let Some(mut task) = self.metadata_task.take() else {
            return Ok(None);
        };
        let grace = self.config.tuning.metadata_grace;
        let waited = self.handle.guarded(timeout(grace, &mut task)).await;
        if !task.is_finished() {
            task.abort();
        }
        match waited? {
            Ok(Ok(metadata)) => Ok(metadata),
            Ok(Err(err)) => {
                debug!(session_id = %self.handle.id(), error = %err, "metadata task did not finish");
                Ok(None)
            }
            Err(_) => {
                let pending = IngestionError::MetadataWriteFailed(format!(
                    "still pending after {} ms",
                    grace.as_millis()
                ));
                warn!(
                    session_id = %self.handle.id(),
                    error = %pending,
                    "continuing without asset metadata"
                );
                self.handle
                    .apply(|session| session.warnings.push(pending.to_string()))?;
                Ok(None)
            }
        }
    }

    /// Stop session activity and record a fatal error on the session.
    pub fn fail(&mut self, err: IngestionError) -> IngestionError {
        self.stop_ticker();

        if matches!(err, IngestionError::SessionCancelled) {
            info!(
                session_id = %self.handle.id(),
                owner_id = %self.handle.owner_id(),
                "ingestion session cancelled"
            );
            return err;
        }

        error!(
            session_id = %self.handle.id(),
            owner_id = %self.handle.owner_id(),
            kind = ?err.kind(),
            error = %err,
            "ingestion session failed"
        );
        let failure = SessionFailure::from(&err);
        if self.handle.apply(|session| session.mark_failed(failure)).is_err() {
            debug!(session_id = %self.handle.id(), "failure recorded after session was replaced");
        }
        err
    }
}
