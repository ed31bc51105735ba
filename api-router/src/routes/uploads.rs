use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use common::{error::AppError, storage::types::asset_metadata::AssetMetadata};
use serde::Serialize;
use tracing::{error, info};

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::Owner};

#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub locator_key: String,
    pub download_url: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<AssetMetadata> for UploadSummary {
    fn from(record: AssetMetadata) -> Self {
        Self {
            id: record.id,
            file_name: record.file_name,
            file_size: record.file_size,
            mime_type: record.mime_type,
            locator_key: record.locator_key,
            download_url: record.download_url,
            uploaded_at: record.created_at,
        }
    }
}

/// Uploads recorded for the caller, newest first.
pub async fn list_uploads(
    State(state): State<ApiState>,
    Extension(Owner(owner_id)): Extension<Owner>,
) -> Result<impl IntoResponse, ApiError> {
    let uploads: Vec<UploadSummary> = AssetMetadata::list_for_owner(&owner_id, &state.db)
        .await?
        .into_iter()
        .map(UploadSummary::from)
        .collect();

    Ok(Json(uploads))
}

/// Remove one of the caller's uploads: the stored object first, then its record.
pub async fn delete_upload(
    State(state): State<ApiState>,
    Extension(Owner(owner_id)): Extension<Owner>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .db
        .get_item::<AssetMetadata>(&id)
        .await
        .map_err(AppError::from)?
        .filter(|record| record.owner_id == owner_id)
        .ok_or_else(|| ApiError::NotFound(format!("upload {id}")))?;

    state
        .storage
        .delete(&record.locator_key)
        .await
        .map_err(|err| {
            error!(upload_id = %id, error = %err, "failed to remove stored object");
            ApiError::from(AppError::from(err))
        })?;

    state
        .db
        .delete_item::<AssetMetadata>(&id)
        .await
        .map_err(AppError::from)?;

    info!(upload_id = %id, key = %record.locator_key, "upload deleted");
    Ok(StatusCode::NO_CONTENT)
}
