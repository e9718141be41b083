//! PowerDNS API server configuration endpoints.
use axum::{Extension, Json, extract::Path, http::StatusCode};

use crate::SharedState;
use crate::db::server_repo;
use crate::error::AppError;
use crate::validation::validate_server;
use crate::zone::ApiServer;

// GET /api/servers
pub async fn list_servers(
    Extension(state): Extension<SharedState>,
) -> Result<Json<Vec<ApiServer>>, AppError> {
    let servers = server_repo::list(&state.db).await.map_err(AppError::internal)?;
    Ok(Json(servers))
}

// POST /api/servers
pub async fn create_server(
    Extension(state): Extension<SharedState>,
    Json(mut server): Json<ApiServer>,
) -> Result<(StatusCode, Json<ApiServer>), AppError> {
    server.name = server.name.trim().to_string();
    validate_server(&server)?;
    if server_repo::exists_by_name(&state.db, &server.name, None)
        .await
        .map_err(AppError::internal)?
    {
        return Err(AppError::Conflict(format!("API server '{}' already exists", server.name)));
    }
    server.id = server_repo::insert(&state.db, &server)
        .await
        .map_err(AppError::internal)?;
    tracing::info!("created API server {} ({})", server.name, server.api_url);
    Ok((StatusCode::CREATED, Json(server)))
}

// PUT /api/servers/{id}
pub async fn update_server(
    Extension(state): Extension<SharedState>,
    Path(id): Path<i64>,
    Json(mut server): Json<ApiServer>,
) -> Result<Json<ApiServer>, AppError> {
    let stored = server_repo::find(&state.db, id)
        .await
        .map_err(AppError::internal)?
        .ok_or(AppError::NotFound)?;
    server.id = id;
    server.name = server.name.trim().to_string();
    if server.api_token.is_empty() {
        server.api_token = stored.api_token;
    }
    validate_server(&server)?;
    if server_repo::exists_by_name(&state.db, &server.name, Some(id))
        .await
        .map_err(AppError::internal)?
    {
        return Err(AppError::Conflict(format!("API server '{}' already exists", server.name)));
    }
    if !server_repo::update(&state.db, &server)
        .await
        .map_err(AppError::internal)?
    {
        return Err(AppError::NotFound);
    }
    tracing::info!("updated API server {} ({})", server.name, server.api_url);
    Ok(Json(server))
}

// DELETE /api/servers/{id}
pub async fn delete_server(
    Extension(state): Extension<SharedState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !server_repo::delete(&state.db, id)
        .await
        .map_err(AppError::internal)?
    {
        return Err(AppError::NotFound);
    }
    tracing::info!("deleted API server {id}");
    Ok(StatusCode::NO_CONTENT)
}
