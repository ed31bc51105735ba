use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::warn;

use crate::api_state::ApiState;

const STORAGE_HEALTH_KEY: &str = "health/check";

/// Liveness: the process is up and serving requests.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// Readiness: 200 once both the metadata store and the content store
/// answer, else 503 with the failing checks.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let db = state.db.client.query("RETURN true").await.map(|_| ());
    let storage = state.storage.exists(STORAGE_HEALTH_KEY).await.map(|_| ());

    let mut reasons = Vec::new();
    if let Err(e) = &db {
        warn!("Readiness: database check failed: {e}");
        reasons.push(e.to_string());
    }
    if let Err(e) = &storage {
        warn!("Readiness: storage check failed: {e}");
        reasons.push(e.to_string());
    }

    let verdict = |ok: bool| if ok { "ok" } else { "fail" };
    let checks = json!({
        "db": verdict(db.is_ok()),
        "storage": verdict(storage.is_ok()),
    });

    if reasons.is_empty() {
        (
            StatusCode::OK,
            Json(json!({ "status": "ok", "checks": checks })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": checks,
                "reason": reasons.join("; ")
            })),
        )
    }
}
