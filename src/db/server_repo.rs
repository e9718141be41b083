//! Rows of the `api_servers` table.
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::zone::ApiServer;

const COLUMNS: &str = "id, name, description, enabled, api_url, api_token, server_id";

fn from_row(row: &SqliteRow) -> ApiServer {
    ApiServer {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        enabled: row.get::<i64, _>("enabled") != 0,
        api_url: row.get("api_url"),
        api_token: row.get("api_token"),
        server_id: row.get("server_id"),
    }
}

pub async fn list(db: &SqlitePool) -> sqlx::Result<Vec<ApiServer>> {
    let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM api_servers ORDER BY id"))
        .fetch_all(db)
        .await?;
    Ok(rows.iter().map(from_row).collect())
}

pub async fn find(db: &SqlitePool, id: i64) -> sqlx::Result<Option<ApiServer>> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM api_servers WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row.as_ref().map(from_row))
}

/// Whether a server other than `except` already uses `name`.
pub async fn exists_by_name(db: &SqlitePool, name: &str, except: Option<i64>) -> sqlx::Result<bool> {
    let cnt: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_servers WHERE name = ? AND id IS NOT ?")
        .bind(name)
        .bind(except)
        .fetch_one(db)
        .await?;
    Ok(cnt.0 > 0)
}

/// Servers attached to a zone, enabled or not, in id order.
pub async fn list_for_zone(db: &SqlitePool, zone_id: i64) -> sqlx::Result<Vec<ApiServer>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.name, s.description, s.enabled, s.api_url, s.api_token, s.server_id
        FROM api_servers s
        JOIN zone_api_servers zs ON zs.api_server_id = s.id
        WHERE zs.zone_id = ?
        ORDER BY s.id
        "#,
    )
    .bind(zone_id)
    .fetch_all(db)
    .await?;
    Ok(rows.iter().map(from_row).collect())
}

pub async fn insert(db: &SqlitePool, server: &ApiServer) -> sqlx::Result<i64> {
    let now = Utc::now();
    let res = sqlx::query(
        r#"
        INSERT INTO api_servers (
            name, description, enabled, api_url, api_token, server_id, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&server.name)
    .bind(&server.description)
    .bind(server.enabled as i64)
    .bind(&server.api_url)
    .bind(&server.api_token)
    .bind(&server.server_id)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;
    Ok(res.last_insert_rowid())
}

/// Returns false when no such server.
pub async fn update(db: &SqlitePool, server: &ApiServer) -> sqlx::Result<bool> {
    let res = sqlx::query(
        r#"
        UPDATE api_servers SET
            name = ?, description = ?, enabled = ?, api_url = ?, api_token = ?,
            server_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&server.name)
    .bind(&server.description)
    .bind(server.enabled as i64)
    .bind(&server.api_url)
    .bind(&server.api_token)
    .bind(&server.server_id)
    .bind(Utc::now())
    .bind(server.id)
    .execute(db)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Zone links go with the server.
pub async fn delete(db: &SqlitePool, id: i64) -> sqlx::Result<bool> {
    let res = sqlx::query("DELETE FROM api_servers WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}
