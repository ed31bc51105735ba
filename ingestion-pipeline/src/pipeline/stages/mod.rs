use std::{sync::Arc, time::Instant};

use state_machines::core::GuardError;
use tracing::{debug, info, instrument, warn};

use super::{
    context::PipelineContext,
    session::{SessionState, SourceFile},
    state::{Idle, Polling, Ready, SessionMachine, Stored, Triggering},
};
use crate::{
    error::IngestionError,
    poller::{PollError, PollEvent, ReadinessPoller},
    progress::ProgressSynthesizer,
    retry::{is_transient, RetryError},
};

#[instrument(
    level = "trace",
    skip_all,
    fields(session_id = %ctx.handle.id(), owner_id = %ctx.handle.owner_id())
)]
pub async fn upload(
    machine: SessionMachine<(), Idle>,
    ctx: &mut PipelineContext<'_>,
    file: SourceFile,
) -> Result<SessionMachine<(), Stored>, IngestionError> {
    let machine = machine
        .begin_upload()
        .map_err(|(_, guard)| map_guard_error("begin_upload", &guard))?;
    ctx.handle
        .apply(|session| session.state = SessionState::Uploading)?;
    ctx.start_ticker();

    let feed = ctx.progress.clone();
    let on_progress = move |sent: u64, total: u64| {
        feed.update(|progress| progress.observe_upload(sent, total));
    };

    let started = Instant::now();
    let locator = ctx
        .handle
        .guarded(
            ctx.services
                .store
                .upload(ctx.handle.owner_id(), &file, &on_progress),
        )
        .await?
        .map_err(|err| IngestionError::StoreUnavailable(err.to_string()))?;

    let reading = ctx.progress.settle(ProgressSynthesizer::complete_upload);
    ctx.handle.apply(|session| {
        session.mark_stored(locator.clone());
        session.raise_progress(reading);
    })?;
    info!(
        key = %locator.key,
        bytes = ctx.source.size,
        upload_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "upload stored"
    );
    ctx.locator = Some(locator);

    machine
        .store()
        .map_err(|(_, guard)| map_guard_error("store", &guard))
}

/// Start the metadata write in the background and move on.
///
/// A failed write becomes a warning on the session; it never fails ingestion.
#[instrument(level = "trace", skip_all, fields(session_id = %ctx.handle.id()))]
pub fn record_metadata(
    machine: SessionMachine<(), Stored>,
    ctx: &mut PipelineContext<'_>,
) -> Result<SessionMachine<(), Triggering>, IngestionError> {
    let locator = ctx.locator()?.clone();
    let recorder = Arc::clone(&ctx.services.metadata);
    let handle = ctx.handle.clone();
    let source = ctx.source.clone();

    ctx.metadata_task = Some(tokio::spawn(async move {
        match recorder.record(&locator, handle.owner_id(), &source).await {
            Ok(metadata) => {
                debug!(session_id = %handle.id(), metadata_id = %metadata.id, "asset metadata recorded");
                Some(metadata)
            }
            Err(err) => {
                let failure = IngestionError::MetadataWriteFailed(err.to_string());
                warn!(
                    session_id = %handle.id(),
                    key = %locator.key,
                    error = %failure,
                    "continuing without asset metadata"
                );
                if handle
                    .apply(|session| session.warnings.push(failure.to_string()))
                    .is_err()
                {
                    debug!(session_id = %handle.id(), "metadata warning dropped for stale session");
                }
                None
            }
        }
    }));

    let machine = machine
        .begin_trigger()
        .map_err(|(_, guard)| map_guard_error("begin_trigger", &guard))?;
    ctx.handle
        .apply(|session| session.state = SessionState::Triggering)?;

    Ok(machine)
}

#[instrument(level = "trace", skip_all, fields(session_id = %ctx.handle.id()))]
pub async fn trigger_indexing(
    machine: SessionMachine<(), Triggering>,
    ctx: &mut PipelineContext<'_>,
) -> Result<SessionMachine<(), Polling>, IngestionError> {
    ctx.progress.update(ProgressSynthesizer::begin_indexing);

    let locator = ctx.locator()?.clone();
    let trigger = Arc::clone(&ctx.services.trigger);
    let owner_id = ctx.handle.owner_id().to_string();
    let handle = ctx.handle.clone();

    let outcome = ctx
        .config
        .retry
        .run(
            ctx.handle.cancel_token(),
            |attempt| {
                let trigger = Arc::clone(&trigger);
                let locator = locator.clone();
                let owner_id = owner_id.clone();
                async move {
                    debug!(attempt, key = %locator.key, "triggering indexing");
                    trigger.trigger(&locator, &owner_id).await
                }
            },
            is_transient,
            |retry| {
                warn!(retry, "indexing trigger failed; retrying after delay");
                if handle
                    .apply(|session| session.retry_count = retry)
                    .is_err()
                {
                    debug!("retry count dropped for stale session");
                }
            },
        )
        .await;

    match outcome {
        Ok(()) => {}
        Err(RetryError::Cancelled) => return Err(IngestionError::SessionCancelled),
        Err(
            RetryError::Exhausted {
                attempts,
                last_error,
            }
            | RetryError::Fatal {
                attempts,
                last_error,
            },
        ) => {
            return Err(IngestionError::IndexingTriggerFailed {
                attempts,
                cause: last_error.to_string(),
            })
        }
    }
    ctx.handle.ensure_current()?;

    let machine = machine
        .begin_polling()
        .map_err(|(_, guard)| map_guard_error("begin_polling", &guard))?;
    ctx.handle
        .apply(|session| session.state = SessionState::Polling)?;

    Ok(machine)
}

#[instrument(level = "trace", skip_all, fields(session_id = %ctx.handle.id()))]
pub async fn await_readiness(
    machine: SessionMachine<(), Polling>,
    ctx: &mut PipelineContext<'_>,
) -> Result<SessionMachine<(), Ready>, IngestionError> {
    let poller = ReadinessPoller::new(Arc::clone(&ctx.services.readiness));
    let feed = ctx.progress.clone();

    let result = poller
        .wait_until_ready(
            ctx.handle.owner_id(),
            &ctx.config.poll,
            ctx.handle.cancel_token(),
            |event| {
                if let PollEvent::NotReady { .. } = event {
                    feed.update(ProgressSynthesizer::observe_indexing_step);
                }
            },
        )
        .await;

    let attempts = match result {
        Ok(attempts) => attempts,
        Err(PollError::Cancelled) => return Err(IngestionError::SessionCancelled),
        Err(PollError::TimedOut {
            attempts,
            elapsed,
            last_error,
        }) => {
            return Err(IngestionError::ReadinessTimeout {
                attempts,
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                last_error,
            })
        }
    };
    ctx.handle.ensure_current()?;
    debug!(attempts, "index confirmed ready");

    machine
        .confirm_ready()
        .map_err(|(_, guard)| map_guard_error("confirm_ready", &guard))
}

fn map_guard_error(event: &str, guard: &GuardError) -> IngestionError {
    IngestionError::Internal(format!(
        "invalid ingestion session transition during {event}: {guard:?}"
    ))
}
