use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};

/// Liveness probe. The schema is migrated before the listener binds, so a
/// reachable process is a ready one.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, [(header::CACHE_CONTROL, "no-store")], "ok")
}
