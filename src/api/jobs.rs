//! Sync triggering and job inspection.
use axum::{Extension, Json, extract::Path, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::SharedState;
use crate::db::{job_repo, zone_repo};
use crate::error::{AppError, SyncError};
use crate::jobs::SyncJob;

#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    /// Run at this time instead of immediately.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

// POST /api/zones/{id}/sync, body optional
pub async fn trigger_sync(
    Extension(state): Extension<SharedState>,
    Path(zone_id): Path<i64>,
    req: Option<Json<TriggerRequest>>,
) -> Result<(StatusCode, Json<SyncJob>), AppError> {
    let scheduled_at = req.and_then(|Json(req)| req.scheduled_at);
    let job = state.scheduler.trigger_sync(zone_id, scheduled_at).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

// GET /api/zones/{id}/jobs
pub async fn list_zone_jobs(
    Extension(state): Extension<SharedState>,
    Path(zone_id): Path<i64>,
) -> Result<Json<Vec<SyncJob>>, AppError> {
    zone_repo::find(&state.db, zone_id)
        .await
        .map_err(AppError::internal)?
        .ok_or(SyncError::ZoneNotFound(zone_id))?;
    let jobs = job_repo::list_for_zone(&state.db, zone_id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(jobs))
}

// GET /api/jobs/{id}
pub async fn get_job(
    Extension(state): Extension<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<SyncJob>, AppError> {
    let job = job_repo::find(&state.db, id)
        .await
        .map_err(AppError::internal)?
        .ok_or(AppError::NotFound)?;
    Ok(Json(job))
}

// POST /api/jobs/{id}/cancel
pub async fn cancel_job(
    Extension(state): Extension<SharedState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<SyncJob>), AppError> {
    let job = state.scheduler.cancel(id).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}
