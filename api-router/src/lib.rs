use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn,
    routing::{delete, get, post},
    Router,
};
use middleware_api_auth::require_owner;
use routes::{
    events::ingest_events,
    files::serve_file,
    index_readiness::index_readiness,
    ingest::{cancel_ingest, ingest_status, start_ingest},
    health::{live, ready},
    uploads::{delete_upload, list_uploads},
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

/// Headroom for multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (health checks and download URLs)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route("/files/{*key}", get(serve_file));

    let body_limit = app_state
        .config
        .ingest_max_file_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    // Owner-scoped endpoints
    let protected = Router::new()
        .route(
            "/ingest",
            post(start_ingest)
                .layer(DefaultBodyLimit::max(body_limit))
                .delete(cancel_ingest),
        )
        .route("/ingest/status", get(ingest_status))
        .route("/ingest/events", get(ingest_events))
        .route("/uploads", get(list_uploads))
        .route("/uploads/{id}", delete(delete_upload))
        .route("/readiness", get(index_readiness))
        .route_layer(from_fn(require_owner));

    public.merge(protected)
}
