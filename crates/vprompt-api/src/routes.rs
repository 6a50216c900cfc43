//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    create_task, delete_task, get_result, get_task, health, list_tasks, ready, receive_result,
    register_owner,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the gateway router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Task creation and result retrieval are throttled per caller
    let throttled_routes = Router::new()
        .route("/api/tasks", post(create_task))
        .route("/result/:task_id", get(get_result))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let owner_routes = Router::new()
        .route("/api/register", post(register_owner))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/:task_id", get(get_task).delete(delete_task));

    // Worker callbacks; `/process_video_result` is the path workers are configured with
    let worker_routes = Router::new()
        .route("/api/results", post(receive_result))
        .route("/process_video_result", post(receive_result));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(throttled_routes)
        .merge(owner_routes)
        .merge(worker_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Uploads are bounded by the configured limit, not axum's 2MB default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
