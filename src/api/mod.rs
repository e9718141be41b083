pub mod jobs;
pub mod servers;
pub mod zones;

use axum::{Extension, Router, routing::{get, post, put}};
use tower_http::trace::TraceLayer;

use crate::SharedState;

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // configuration
        .route("/api/servers", get(servers::list_servers).post(servers::create_server))
        .route(
            "/api/servers/{id}",
            put(servers::update_server).delete(servers::delete_server),
        )
        .route("/api/zones", get(zones::list_zones).post(zones::create_zone))
        .route("/api/zones/{id}", get(zones::get_zone).put(zones::update_zone))
        // sync jobs
        .route("/api/zones/{id}/sync", post(jobs::trigger_sync))
        .route("/api/zones/{id}/jobs", get(jobs::list_zone_jobs))
        .route("/api/jobs/{id}", get(jobs::get_job))
        .route("/api/jobs/{id}/cancel", post(jobs::cancel_job))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}
