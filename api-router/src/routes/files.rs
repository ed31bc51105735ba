use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use common::storage::store::is_safe_location;
use tracing::error;

use crate::{api_state::ApiState, error::ApiError};

/// Serve a stored object by key. Download URLs handed out by the content
/// store point here.
pub async fn serve_file(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    if !is_safe_location(&key) {
        return Err(ApiError::NotFound("File not found".to_string()));
    }

    let stream = match state.storage.get_stream(&key).await {
        Ok(stream) => stream,
        Err(object_store::Error::NotFound { .. }) => {
            return Err(ApiError::NotFound("File not found".to_string()))
        }
        Err(e) => {
            error!("Failed to read stored object '{key}': {e:?}");
            return Err(ApiError::InternalError(
                "Internal server error".to_string(),
            ));
        }
    };

    let content_type = mime_guess::from_path(&key).first_or_octet_stream();
    let cache_control = format!("max-age={}", state.config.upload_cache_control);

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CACHE_CONTROL, cache_control),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
