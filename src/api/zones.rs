//! Zone configuration endpoints.
use axum::{Extension, Json, extract::Path, http::StatusCode};
use tracing::{info, warn};

use crate::SharedState;
use crate::db::{server_repo, zone_repo};
use crate::error::AppError;
use crate::validation::validate_zone;
use crate::zone::Zone;

// GET /api/zones
pub async fn list_zones(Extension(state): Extension<SharedState>) -> Result<Json<Vec<Zone>>, AppError> {
    let zones = zone_repo::list(&state.db).await.map_err(AppError::internal)?;
    Ok(Json(zones))
}

// GET /api/zones/{id}
pub async fn get_zone(
    Extension(state): Extension<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Zone>, AppError> {
    let zone = zone_repo::find(&state.db, id)
        .await
        .map_err(AppError::internal)?
        .ok_or(AppError::NotFound)?;
    Ok(Json(zone))
}

// POST /api/zones
pub async fn create_zone(
    Extension(state): Extension<SharedState>,
    Json(mut zone): Json<Zone>,
) -> Result<(StatusCode, Json<Zone>), AppError> {
    zone.id = 0;
    check_zone(&state, &mut zone).await?;
    zone.id = zone_repo::insert(&state.db, &zone)
        .await
        .map_err(AppError::internal)?;
    info!("created zone {zone}");
    sync_after_save(&state, &zone).await;
    Ok((StatusCode::CREATED, Json(zone)))
}

// PUT /api/zones/{id}
pub async fn update_zone(
    Extension(state): Extension<SharedState>,
    Path(id): Path<i64>,
    Json(mut zone): Json<Zone>,
) -> Result<Json<Zone>, AppError> {
    zone.id = id;
    check_zone(&state, &mut zone).await?;
    if !zone_repo::update(&state.db, &zone)
        .await
        .map_err(AppError::internal)?
    {
        return Err(AppError::NotFound);
    }
    info!("updated zone {zone}");
    sync_after_save(&state, &zone).await;
    Ok(Json(zone))
}

async fn check_zone(state: &SharedState, zone: &mut Zone) -> Result<(), AppError> {
    zone.name = zone.name.trim().to_ascii_lowercase();
    zone.api_servers.sort_unstable();
    zone.api_servers.dedup();

    let others = zone_repo::list(&state.db).await.map_err(AppError::internal)?;
    validate_zone(zone, &others)?;
    for server_id in &zone.api_servers {
        if server_repo::find(&state.db, *server_id)
            .await
            .map_err(AppError::internal)?
            .is_none()
        {
            return Err(AppError::bad_request(format!("API server {server_id} does not exist")));
        }
    }
    Ok(())
}

/// Saving a zone never fails because the follow-up sync could not start.
async fn sync_after_save(state: &SharedState, zone: &Zone) {
    if !state.config.sync_on_save || !zone.enabled {
        return;
    }
    match state.scheduler.trigger_sync(zone.id, None).await {
        Ok(job) => info!("queued sync job {} after saving zone {zone}", job.id),
        Err(err) => warn!("zone {zone} saved but not synced: {err}"),
    }
}
