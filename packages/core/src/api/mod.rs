//! HTTP surface: router assembly, `/metrics`, and request metrics middleware.

pub mod health;
pub mod schedules;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::metrics::AppMetrics;
use crate::schedule::ScheduleConflictGuard;
use schedules::{create_schedules_router, SchedulesApiState};

/// Build the complete application router.
pub fn router(guard: Arc<ScheduleConflictGuard>, metrics: Arc<AppMetrics>) -> Router {
    let schedules_state = Arc::new(SchedulesApiState {
        guard,
        metrics: metrics.clone(),
    });

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(render_metrics).with_state(metrics.clone()))
        .merge(create_schedules_router(schedules_state))
        .route_layer(middleware::from_fn_with_state(metrics, track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// `GET /metrics`: Prometheus text exposition.
async fn render_metrics(State(metrics): State<Arc<AppMetrics>>) -> Response {
    match metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics error").into_response()
        }
    }
}

/// Count and time every routed request. Labels use the route template so
/// entry ids do not explode label cardinality.
async fn track_metrics(
    State(metrics): State<Arc<AppMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let response = next.run(request).await;

    metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), path.as_str(), response.status().as_str()])
        .inc();
    metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());

    response
}
