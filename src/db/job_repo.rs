//! Rows of the `jobs` table.
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db::{from_json, opt_u32, parse_column, to_json};
use crate::jobs::{JobStatus, SyncJob};

const COLUMNS: &str =
    "id, zone_id, status, created_at, scheduled_at, started_at, completed_at, interval_minutes, result";

fn from_row(row: &SqliteRow) -> sqlx::Result<SyncJob> {
    Ok(SyncJob {
        id: row.get("id"),
        zone_id: row.get("zone_id"),
        status: parse_column(row.get("status"))?,
        created: row.get::<DateTime<Utc>, _>("created_at"),
        scheduled: row.get("scheduled_at"),
        started: row.get("started_at"),
        completed: row.get("completed_at"),
        interval_minutes: opt_u32(row.get("interval_minutes"))?,
        result: from_json(row.get("result"))?,
    })
}

pub async fn insert(db: &SqlitePool, job: &SyncJob) -> sqlx::Result<i64> {
    let res = sqlx::query(
        r#"
        INSERT INTO jobs (
            zone_id, status, created_at, scheduled_at, started_at, completed_at, interval_minutes, result
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.zone_id)
    .bind(job.status.as_str())
    .bind(job.created)
    .bind(job.scheduled)
    .bind(job.started)
    .bind(job.completed)
    .bind(job.interval_minutes.map(i64::from))
    .bind(to_json(&job.result)?)
    .execute(db)
    .await?;
    Ok(res.last_insert_rowid())
}

/// Persist status, timestamps and result of an existing job.
pub async fn update(db: &SqlitePool, job: &SyncJob) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE jobs SET status = ?, scheduled_at = ?, started_at = ?, completed_at = ?, result = ?
        WHERE id = ?
        "#,
    )
    .bind(job.status.as_str())
    .bind(job.scheduled)
    .bind(job.started)
    .bind(job.completed)
    .bind(to_json(&job.result)?)
    .bind(job.id)
    .execute(db)
    .await?;
    Ok(())
}

/// Like [`update`], but only while the stored job is still waiting to
/// run. Returns false when another writer moved it on first.
pub async fn update_if_waiting(db: &SqlitePool, job: &SyncJob) -> sqlx::Result<bool> {
    let res = sqlx::query(
        r#"
        UPDATE jobs SET status = ?, scheduled_at = ?, started_at = ?, completed_at = ?, result = ?
        WHERE id = ? AND status IN ('pending', 'scheduled')
        "#,
    )
    .bind(job.status.as_str())
    .bind(job.scheduled)
    .bind(job.started)
    .bind(job.completed)
    .bind(to_json(&job.result)?)
    .bind(job.id)
    .execute(db)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn find(db: &SqlitePool, id: i64) -> sqlx::Result<Option<SyncJob>> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// Newest first.
pub async fn list_for_zone(db: &SqlitePool, zone_id: i64) -> sqlx::Result<Vec<SyncJob>> {
    let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE zone_id = ? ORDER BY id DESC"))
        .bind(zone_id)
        .fetch_all(db)
        .await?;
    rows.iter().map(from_row).collect()
}

pub async fn list_by_status(db: &SqlitePool, statuses: &[JobStatus]) -> sqlx::Result<Vec<SyncJob>> {
    let mut jobs = Vec::new();
    for status in statuses {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE status = ? ORDER BY id"))
            .bind(status.as_str())
            .fetch_all(db)
            .await?;
        for row in &rows {
            jobs.push(from_row(row)?);
        }
    }
    jobs.sort_by_key(|j| j.id);
    Ok(jobs)
}

/// Whether the zone already has a job waiting to run.
pub async fn has_pending(db: &SqlitePool, zone_id: i64) -> sqlx::Result<bool> {
    let cnt: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE zone_id = ? AND status IN ('pending', 'scheduled')")
            .bind(zone_id)
            .fetch_one(db)
            .await?;
    Ok(cnt.0 > 0)
}
