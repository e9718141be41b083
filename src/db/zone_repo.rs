//! Rows of the `zones` table and its server links.
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::db::{from_json, opt_u32, to_json};
use crate::zone::Zone;

const COLUMNS: &str = r#"
    id, name, description, enabled, is_default, priority, default_ttl, check_ownership,
    match_ipaddress_tags, match_interface_tags, match_device_tags,
    match_fhrpgroup_tags, match_device_roles, match_interface_mgmt_only,
    naming, sync_interval_minutes
"#;

fn from_row(row: &SqliteRow) -> sqlx::Result<Zone> {
    Ok(Zone {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        enabled: row.get::<i64, _>("enabled") != 0,
        is_default: row.get::<i64, _>("is_default") != 0,
        priority: row.get("priority"),
        default_ttl: opt_u32(row.get("default_ttl"))?,
        check_ownership: row.get::<i64, _>("check_ownership") != 0,
        match_ipaddress_tags: from_json(row.get("match_ipaddress_tags"))?,
        match_interface_tags: from_json(row.get("match_interface_tags"))?,
        match_device_tags: from_json(row.get("match_device_tags"))?,
        match_fhrpgroup_tags: from_json(row.get("match_fhrpgroup_tags"))?,
        match_device_roles: from_json(row.get("match_device_roles"))?,
        match_interface_mgmt_only: row.get::<i64, _>("match_interface_mgmt_only") != 0,
        naming: from_json(row.get("naming"))?,
        api_servers: Vec::new(),
        sync_interval_minutes: opt_u32(row.get("sync_interval_minutes"))?,
    })
}

async fn server_ids(db: &SqlitePool, zone_id: i64) -> sqlx::Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT api_server_id FROM zone_api_servers WHERE zone_id = ? ORDER BY api_server_id",
    )
    .bind(zone_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn set_server_ids(tx: &mut Transaction<'_, Sqlite>, zone_id: i64, ids: &[i64]) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM zone_api_servers WHERE zone_id = ?")
        .bind(zone_id)
        .execute(&mut **tx)
        .await?;
    for id in ids {
        sqlx::query("INSERT OR IGNORE INTO zone_api_servers (zone_id, api_server_id) VALUES (?, ?)")
            .bind(zone_id)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// All zones with their server ids, in id order.
pub async fn list(db: &SqlitePool) -> sqlx::Result<Vec<Zone>> {
    let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM zones ORDER BY id"))
        .fetch_all(db)
        .await?;
    let mut zones = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut zone = from_row(row)?;
        zone.api_servers = server_ids(db, zone.id).await?;
        zones.push(zone);
    }
    Ok(zones)
}

pub async fn find(db: &SqlitePool, id: i64) -> sqlx::Result<Option<Zone>> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM zones WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut zone = from_row(&row)?;
    zone.api_servers = server_ids(db, zone.id).await?;
    Ok(Some(zone))
}

pub async fn insert(db: &SqlitePool, zone: &Zone) -> sqlx::Result<i64> {
    let now = Utc::now();
    let mut tx = db.begin().await?;
    let res = sqlx::query(
        r#"
        INSERT INTO zones (
            name, description, enabled, is_default, priority, default_ttl, check_ownership,
            match_ipaddress_tags, match_interface_tags, match_device_tags,
            match_fhrpgroup_tags, match_device_roles, match_interface_mgmt_only,
            naming, sync_interval_minutes, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&zone.name)
    .bind(&zone.description)
    .bind(zone.enabled as i64)
    .bind(zone.is_default as i64)
    .bind(zone.priority)
    .bind(zone.default_ttl.map(i64::from))
    .bind(zone.check_ownership as i64)
    .bind(to_json(&zone.match_ipaddress_tags)?)
    .bind(to_json(&zone.match_interface_tags)?)
    .bind(to_json(&zone.match_device_tags)?)
    .bind(to_json(&zone.match_fhrpgroup_tags)?)
    .bind(to_json(&zone.match_device_roles)?)
    .bind(zone.match_interface_mgmt_only as i64)
    .bind(to_json(&zone.naming)?)
    .bind(zone.sync_interval_minutes.map(i64::from))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    let id = res.last_insert_rowid();
    set_server_ids(&mut tx, id, &zone.api_servers).await?;
    tx.commit().await?;
    Ok(id)
}

/// Overwrite a zone's configuration. Returns false when no such zone.
pub async fn update(db: &SqlitePool, zone: &Zone) -> sqlx::Result<bool> {
    let mut tx = db.begin().await?;
    let res = sqlx::query(
        r#"
        UPDATE zones SET
            name = ?, description = ?, enabled = ?, is_default = ?, priority = ?,
            default_ttl = ?, check_ownership = ?, match_ipaddress_tags = ?, match_interface_tags = ?,
            match_device_tags = ?, match_fhrpgroup_tags = ?, match_device_roles = ?,
            match_interface_mgmt_only = ?, naming = ?, sync_interval_minutes = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&zone.name)
    .bind(&zone.description)
    .bind(zone.enabled as i64)
    .bind(zone.is_default as i64)
    .bind(zone.priority)
    .bind(zone.default_ttl.map(i64::from))
    .bind(zone.check_ownership as i64)
    .bind(to_json(&zone.match_ipaddress_tags)?)
    .bind(to_json(&zone.match_interface_tags)?)
    .bind(to_json(&zone.match_device_tags)?)
    .bind(to_json(&zone.match_fhrpgroup_tags)?)
    .bind(to_json(&zone.match_device_roles)?)
    .bind(zone.match_interface_mgmt_only as i64)
    .bind(to_json(&zone.naming)?)
    .bind(zone.sync_interval_minutes.map(i64::from))
    .bind(Utc::now())
    .bind(zone.id)
    .execute(&mut *tx)
    .await?;
    if res.rows_affected() == 0 {
        return Ok(false);
    }
    set_server_ids(&mut tx, zone.id, &zone.api_servers).await?;
    tx.commit().await?;
    Ok(true)
}
