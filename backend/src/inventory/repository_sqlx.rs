use anyhow::Context;
use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::db::i64_to_i32;
use crate::inventory::model::InventoryAdjustment;
use crate::inventory::repository::{AdjustOutcome, InventoryRepository};
use crate::time::ms_to_utc;

/// SQLx-backed implementation of InventoryRepository.
pub struct SqlxInventoryRepository {
    pool: AnyPool,
}

impl SqlxInventoryRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryRepository for SqlxInventoryRepository {
    async fn apply_adjustment(
        &self,
        departure_id: &Uuid,
        delta: i32,
        reason: &str,
        actor: &str,
        now_ms: i64,
    ) -> anyhow::Result<AdjustOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
SELECT capacity_total, capacity_available
FROM departures
WHERE id = ?;
"#,
        )
        .bind(departure_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(AdjustOutcome::NotFound);
        };

        let total = i64_to_i32(row.get("capacity_total"))?;
        let available = i64_to_i32(row.get("capacity_available"))?;

        let new_total = total + delta;

        // Reductions may only eat into free seats, never committed ones.
        if new_total < 0 || (delta < 0 && -delta > available) {
            let count_row = sqlx::query(
                r#"
SELECT COUNT(*) AS active_holds
FROM holds
WHERE departure_id = ? AND status = 'ACTIVE' AND expires_at_ms > ?;
"#,
            )
            .bind(departure_id.to_string())
            .bind(now_ms)
            .fetch_one(&mut *tx)
            .await?;

            let active_holds: i64 = count_row.get("active_holds");

            tx.rollback().await?;

            return Ok(AdjustOutcome::Conflict {
                active_holds,
                total,
                available,
            });
        }

        let new_available = (available + delta).clamp(0, new_total);

        sqlx::query(
            r#"
UPDATE departures
SET capacity_total = ?, capacity_available = ?, updated_ms = ?
WHERE id = ?;
"#,
        )
        .bind(new_total as i64)
        .bind(new_available as i64)
        .bind(now_ms)
        .bind(departure_id.to_string())
        .execute(&mut *tx)
        .await?;

        let adjustment = InventoryAdjustment {
            id: Uuid::new_v4(),
            departure_id: *departure_id,
            delta,
            reason: reason.to_string(),
            actor: actor.to_string(),
            capacity_total_before: total,
            capacity_total_after: new_total,
            capacity_available_before: available,
            capacity_available_after: new_available,
            created_at: ms_to_utc(now_ms)?,
        };

        sqlx::query(
            r#"
INSERT INTO inventory_adjustments(
  id, departure_id, delta, reason, actor,
  capacity_total_before, capacity_total_after,
  capacity_available_before, capacity_available_after,
  created_ms
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(adjustment.id.to_string())
        .bind(departure_id.to_string())
        .bind(delta as i64)
        .bind(reason)
        .bind(actor)
        .bind(total as i64)
        .bind(new_total as i64)
        .bind(available as i64)
        .bind(new_available as i64)
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AdjustOutcome::Applied(adjustment))
    }

    async fn adjustments_for_departure(
        &self,
        departure_id: &Uuid,
    ) -> anyhow::Result<Vec<InventoryAdjustment>> {
        let rows = sqlx::query(
            r#"
SELECT id, departure_id, delta, reason, actor,
       capacity_total_before, capacity_total_after,
       capacity_available_before, capacity_available_after,
       created_ms
FROM inventory_adjustments
WHERE departure_id = ?
ORDER BY created_ms DESC, id;
"#,
        )
        .bind(departure_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for r in rows {
            match row_to_adjustment(&r) {
                Ok(a) => out.push(a),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed adjustment row");
                }
            }
        }

        Ok(out)
    }
}

/* =========================
Row mapping
========================= */

fn row_to_adjustment(r: &sqlx::any::AnyRow) -> anyhow::Result<InventoryAdjustment> {
    let id_str: String = r.get("id");
    let id = Uuid::parse_str(&id_str).context("invalid adjustment id")?;

    let departure_str: String = r.get("departure_id");
    let departure_id = Uuid::parse_str(&departure_str).context("invalid departure_id")?;

    Ok(InventoryAdjustment {
        id,
        departure_id,
        delta: i64_to_i32(r.get("delta"))?,
        reason: r.get::<String, _>("reason"),
        actor: r.get::<String, _>("actor"),
        capacity_total_before: i64_to_i32(r.get("capacity_total_before"))?,
        capacity_total_after: i64_to_i32(r.get("capacity_total_after"))?,
        capacity_available_before: i64_to_i32(r.get("capacity_available_before"))?,
        capacity_available_after: i64_to_i32(r.get("capacity_available_after"))?,
        created_at: ms_to_utc(r.get("created_ms"))?,
    })
}
