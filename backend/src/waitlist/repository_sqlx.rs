use anyhow::Context;
use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::db::is_unique_violation;
use crate::time::ms_to_utc;
use crate::waitlist::model::WaitlistEntry;
use crate::waitlist::repository::{JoinOutcome, WaitlistRepository};

/// SQLx-backed implementation of WaitlistRepository.
pub struct SqlxWaitlistRepository {
    pool: AnyPool,
}

impl SqlxWaitlistRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WaitlistRepository for SqlxWaitlistRepository {
    async fn insert_entry(&self, entry: &WaitlistEntry) -> anyhow::Result<JoinOutcome> {
        let res = sqlx::query(
            r#"
INSERT INTO waitlist_entries(
  id, departure_id, customer_ref, notified_ms, created_ms, updated_ms
)
VALUES (?, ?, ?, NULL, ?, ?);
"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.departure_id.to_string())
        .bind(&entry.customer_ref)
        .bind(entry.created_at.timestamp_millis())
        .bind(entry.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(JoinOutcome::Created(entry.clone())),
            Err(e) if is_unique_violation(&e) => {
                // Lost the uniqueness race; the winner's row is the entry.
                let existing = self
                    .fetch_by_customer(&entry.departure_id, &entry.customer_ref)
                    .await?
                    .context("unique violation but no existing waitlist row")?;
                Ok(JoinOutcome::Existing(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_by_customer(
        &self,
        departure_id: &Uuid,
        customer_ref: &str,
    ) -> anyhow::Result<Option<WaitlistEntry>> {
        let row = sqlx::query(
            r#"
SELECT id, departure_id, customer_ref, notified_ms, created_ms, updated_ms
FROM waitlist_entries
WHERE departure_id = ? AND customer_ref = ?;
"#,
        )
        .bind(departure_id.to_string())
        .bind(customer_ref)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_entry(&r)?)),
            None => Ok(None),
        }
    }

    async fn unnotified_entries(
        &self,
        departure_id: &Uuid,
        limit: usize,
    ) -> anyhow::Result<Vec<WaitlistEntry>> {
        let rows = sqlx::query(
            r#"
SELECT id, departure_id, customer_ref, notified_ms, created_ms, updated_ms
FROM waitlist_entries
WHERE departure_id = ? AND notified_ms IS NULL
ORDER BY created_ms, id
LIMIT ?;
"#,
        )
        .bind(departure_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for r in rows {
            match row_to_entry(&r) {
                Ok(e) => out.push(e),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed waitlist row");
                }
            }
        }

        Ok(out)
    }

    async fn mark_notified(&self, entry_id: &Uuid, now_ms: i64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
UPDATE waitlist_entries
SET notified_ms = ?, updated_ms = ?
WHERE id = ? AND notified_ms IS NULL;
"#,
        )
        .bind(now_ms)
        .bind(now_ms)
        .bind(entry_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn promotable_departures(&self, limit: usize) -> anyhow::Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
SELECT DISTINCT d.id AS departure_id
FROM departures d
JOIN waitlist_entries w ON w.departure_id = d.id
WHERE d.capacity_available > 0 AND w.notified_ms IS NULL
LIMIT ?;
"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for r in rows {
            let id_str: String = r.get("departure_id");
            match Uuid::parse_str(&id_str) {
                Ok(id) => out.push(id),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed departure id");
                }
            }
        }

        Ok(out)
    }
}

/* =========================
Row mapping
========================= */

fn row_to_entry(r: &sqlx::any::AnyRow) -> anyhow::Result<WaitlistEntry> {
    let id_str: String = r.get("id");
    let id = Uuid::parse_str(&id_str).context("invalid waitlist entry id")?;

    let departure_str: String = r.get("departure_id");
    let departure_id = Uuid::parse_str(&departure_str).context("invalid departure_id")?;

    let notified_at = match r.get::<Option<i64>, _>("notified_ms") {
        Some(ms) => Some(ms_to_utc(ms)?),
        None => None,
    };

    Ok(WaitlistEntry {
        id,
        departure_id,
        customer_ref: r.get::<String, _>("customer_ref"),
        notified_at,
        created_at: ms_to_utc(r.get("created_ms"))?,
        updated_at: ms_to_utc(r.get("updated_ms"))?,
    })
}
