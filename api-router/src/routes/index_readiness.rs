use axum::{extract::State, response::IntoResponse, Extension, Json};
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError, middleware_api_auth::Owner};

/// Ask the indexing service once whether the caller's index is queryable.
pub async fn index_readiness(
    State(state): State<ApiState>,
    Extension(Owner(owner_id)): Extension<Owner>,
) -> Result<impl IntoResponse, ApiError> {
    let exists = state.orchestrator.is_ready(&owner_id).await?;

    Ok(Json(json!({ "exists": exists })))
}
