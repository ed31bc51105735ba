use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use common::utils::upload_limits::resolve_media_type;
use ingestion_pipeline::SourceFile;
use serde_json::json;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::Owner};

#[derive(Debug, TryFromMultipart)]
pub struct IngestParams {
    #[form_data(limit = "unlimited")]
    pub file: FieldData<Bytes>,
}

/// Accept a file and start ingesting it in the background.
///
/// Validation happens before anything is stored; a rejected file leaves the
/// caller's current session untouched.
pub async fn start_ingest(
    State(state): State<ApiState>,
    Extension(Owner(owner_id)): Extension<Owner>,
    TypedMultipart(input): TypedMultipart<IngestParams>,
) -> Result<impl IntoResponse, ApiError> {
    let file_name = input
        .file
        .metadata
        .file_name
        .clone()
        .unwrap_or_default();
    let media_type = resolve_media_type(&file_name, input.file.metadata.content_type.as_deref());

    info!(
        owner_id = %owner_id,
        file_name = %file_name,
        size = input.file.contents.len(),
        "Received ingest request"
    );

    let source = SourceFile::new(file_name, media_type, input.file.contents);
    let ticket = state.orchestrator.spawn_ingest(&owner_id, source).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "session_id": ticket.session_id })),
    ))
}

/// Latest snapshot of the caller's most recent session.
pub async fn ingest_status(
    State(state): State<ApiState>,
    Extension(Owner(owner_id)): Extension<Owner>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .orchestrator
        .snapshot(&owner_id)
        .await
        .ok_or_else(|| ApiError::NotFound("No ingestion session".to_string()))?;

    Ok(Json(session))
}

/// Cancel the caller's running session, if any. Idempotent.
pub async fn cancel_ingest(
    State(state): State<ApiState>,
    Extension(Owner(owner_id)): Extension<Owner>,
) -> impl IntoResponse {
    let cancelled = state.orchestrator.cancel(&owner_id).await;
    info!(owner_id = %owner_id, cancelled, "Cancel requested");

    StatusCode::NO_CONTENT
}
