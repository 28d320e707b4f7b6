pub mod schema;
use std::sync::Arc;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

#[derive(Clone)]
pub struct Db {
    pub pool: Arc<AnyPool>,
}

impl Db {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = AnyPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        schema::migrate(&self.pool).await
    }
}

/* =========================
Storage-boundary conversions
========================= */

pub fn i64_to_i32(v: i64) -> anyhow::Result<i32> {
    if v < i32::MIN as i64 || v > i32::MAX as i64 {
        anyhow::bail!("out of range for i32: {v}");
    }
    Ok(v as i32)
}

pub fn i64_to_u16(v: i64) -> anyhow::Result<u16> {
    if v < 0 || v > u16::MAX as i64 {
        anyhow::bail!("out of range for u16: {v}");
    }
    Ok(v as u16)
}

/// True when the error is a unique-constraint violation.
///
/// The Any driver exposes no portable error code, so this matches on the
/// backend message text (SQLite: "UNIQUE constraint failed", Postgres:
/// "duplicate key value violates unique constraint").
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err.as_database_error() {
        Some(db_err) => {
            let msg = db_err.message();
            msg.contains("UNIQUE constraint failed") || msg.contains("duplicate key value")
        }
        None => false,
    }
}
