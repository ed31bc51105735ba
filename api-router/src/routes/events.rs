use std::{pin::Pin, time::Duration};

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    Extension,
};
use futures::{stream, Stream, StreamExt};
use ingestion_pipeline::{SessionState, UploadSession};

use crate::{api_state::ApiState, middleware_api_auth::Owner};

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, axum::Error>> + Send>>;

fn create_error_stream(message: impl Into<String>) -> EventStream {
    let message = message.into();
    stream::once(async move { Ok(Event::default().event("error").data(message)) }).boxed()
}

fn outcome_event(session: &UploadSession) -> Event {
    let name = if session.cancelled {
        "cancelled"
    } else {
        match session.state {
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
            _ => "settled",
        }
    };
    Event::default().event(name).data(session.id.clone())
}

/// Stream the caller's session as it changes. Every change is sent as a
/// `progress` event carrying the full session; the stream closes once the
/// session settles.
pub async fn ingest_events(
    State(state): State<ApiState>,
    Extension(Owner(owner_id)): Extension<Owner>,
) -> Sse<EventStream> {
    let Some(mut updates) = state.orchestrator.subscribe(&owner_id).await else {
        return Sse::new(create_error_stream("No ingestion session"));
    };

    let sse_stream = async_stream::stream! {
        loop {
            let session = updates.borrow_and_update().clone();

            yield Event::default().event("progress").json_data(&session);

            if session.is_settled() {
                yield Ok(outcome_event(&session));
                yield Ok(Event::default().event("close_stream").data("Stream complete"));
                break;
            }

            if updates.changed().await.is_err() {
                yield Ok(Event::default().event("close_stream").data("Stream complete"));
                break;
            }
        }
    };

    Sse::new(sse_stream.boxed()).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive-ping"),
    )
}
