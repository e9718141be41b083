pub mod job_repo;
pub mod server_repo;
pub mod zone_repo;

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type Db = SqlitePool;

pub async fn init_db(path: &std::path::Path) -> anyhow::Result<Db> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}

/// Fresh migrated in-memory database. One connection, since every
/// connection to `sqlite::memory:` is its own database.
pub async fn init_memory_db() -> anyhow::Result<Db> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    Ok(pool)
}

fn decode_error(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> sqlx::Error {
    sqlx::Error::Decode(err.into())
}

/// JSON text column into a value.
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> sqlx::Result<T> {
    serde_json::from_str(raw).map_err(decode_error)
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> sqlx::Result<String> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(e.into()))
}

/// Nullable INTEGER column holding a `u32`.
pub(crate) fn opt_u32(value: Option<i64>) -> sqlx::Result<Option<u32>> {
    value.map(u32::try_from).transpose().map_err(decode_error)
}

pub(crate) fn parse_column<T: FromStr>(raw: &str) -> sqlx::Result<T>
where
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    raw.parse().map_err(decode_error)
}
