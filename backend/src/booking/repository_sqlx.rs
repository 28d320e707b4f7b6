use anyhow::Context;
use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::booking::model::{Booking, BookingStatus, Hold, HoldStatus};
use crate::booking::repository::{
    BookingRepository, CancelOutcome, ConfirmOutcome, ReserveOutcome,
};
use crate::db::{i64_to_i32, is_unique_violation};
use crate::time::ms_to_utc;

/// SQLx-backed implementation of BookingRepository.
///
/// Every mutating method owns a full transaction. Capacity updates are
/// guarded by conditional WHERE clauses so the departure invariant holds at
/// the SQL level independent of the in-process departure lock.
pub struct SqlxBookingRepository {
    pool: AnyPool,
}

impl SqlxBookingRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingRepository for SqlxBookingRepository {
    async fn reserve_hold(&self, hold: &Hold) -> anyhow::Result<ReserveOutcome> {
        let mut tx = self.pool.begin().await?;

        let now_ms = hold.created_at.timestamp_millis();

        let res = sqlx::query(
            r#"
UPDATE departures
SET capacity_available = capacity_available - ?,
    updated_ms = ?
WHERE id = ?
  AND capacity_available >= ?;
"#,
        )
        .bind(hold.seats as i64)
        .bind(now_ms)
        .bind(hold.departure_id.to_string())
        .bind(hold.seats as i64)
        .execute(&mut *tx)
        .await?;

        // CAS miss: departure is missing or short on seats.
        if res.rows_affected() != 1 {
            let row = sqlx::query("SELECT capacity_available FROM departures WHERE id = ?")
                .bind(hold.departure_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;

            tx.rollback().await?;

            return Ok(match row {
                None => ReserveOutcome::DepartureNotFound,
                Some(r) => ReserveOutcome::InsufficientCapacity {
                    available: i64_to_i32(r.get("capacity_available"))?,
                },
            });
        }

        sqlx::query(
            r#"
INSERT INTO holds(
  id, departure_id, seats, customer_ref,
  expires_at_ms, status, idempotency_key,
  created_ms, updated_ms
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(hold.id.to_string())
        .bind(hold.departure_id.to_string())
        .bind(hold.seats as i64)
        .bind(&hold.customer_ref)
        .bind(hold.expires_at.timestamp_millis())
        .bind(hold.status.as_str())
        .bind(&hold.idempotency_key)
        .bind(now_ms)
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ReserveOutcome::Reserved)
    }

    async fn fetch_hold(&self, hold_id: &Uuid) -> anyhow::Result<Option<Hold>> {
        let row = sqlx::query(
            r#"
SELECT id, departure_id, seats, customer_ref,
       expires_at_ms, status, idempotency_key,
       created_ms, updated_ms
FROM holds
WHERE id = ?;
"#,
        )
        .bind(hold_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_hold(&r)?)),
            None => Ok(None),
        }
    }

    async fn due_holds(&self, now_ms: i64, limit: usize) -> anyhow::Result<Vec<Hold>> {
        let rows = sqlx::query(
            r#"
SELECT id, departure_id, seats, customer_ref,
       expires_at_ms, status, idempotency_key,
       created_ms, updated_ms
FROM holds
WHERE status = 'ACTIVE' AND expires_at_ms <= ?
ORDER BY expires_at_ms, id
LIMIT ?;
"#,
        )
        .bind(now_ms)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::new();
        for r in rows {
            match row_to_hold(&r) {
                Ok(h) => out.push(h),
                Err(e) => {
                    // poison-row resilience: skip but don’t fail the batch
                    tracing::warn!(error = %e, "skipping malformed hold row");
                }
            }
        }

        Ok(out)
    }

    async fn expire_hold(&self, hold_id: &Uuid, now_ms: i64) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
SELECT departure_id, seats
FROM holds
WHERE id = ? AND status = 'ACTIVE' AND expires_at_ms <= ?;
"#,
        )
        .bind(hold_id.to_string())
        .bind(now_ms)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        let departure_id: String = row.get("departure_id");
        let seats: i64 = row.get("seats");

        let res = sqlx::query(
            r#"
UPDATE holds
SET status = 'EXPIRED', updated_ms = ?
WHERE id = ? AND status = 'ACTIVE';
"#,
        )
        .bind(now_ms)
        .bind(hold_id.to_string())
        .execute(&mut *tx)
        .await?;

        if res.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        restore_capacity(&mut tx, &departure_id, seats, now_ms).await?;

        tx.commit().await?;

        Ok(true)
    }

    async fn create_booking(&self, booking: &Booking) -> anyhow::Result<ConfirmOutcome> {
        let mut tx = self.pool.begin().await?;

        let now_ms = booking.created_at.timestamp_millis();

        let insert = sqlx::query(
            r#"
INSERT INTO bookings(
  id, hold_id, departure_id, code, seats,
  customer_ref, status, created_ms, updated_ms
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(booking.id.to_string())
        .bind(booking.hold_id.to_string())
        .bind(booking.departure_id.to_string())
        .bind(&booking.code)
        .bind(booking.seats as i64)
        .bind(&booking.customer_ref)
        .bind(booking.status.as_str())
        .bind(now_ms)
        .bind(now_ms)
        .execute(&mut *tx)
        .await;

        if let Err(e) = insert {
            tx.rollback().await?;
            if is_unique_violation(&e) {
                return Ok(ConfirmOutcome::DuplicateKey);
            }
            return Err(e.into());
        }

        // The hold must still be ACTIVE; the expiry worker may have raced us
        // and already restored the seats.
        let res = sqlx::query(
            r#"
UPDATE holds
SET status = 'CONFIRMED', updated_ms = ?
WHERE id = ? AND status = 'ACTIVE';
"#,
        )
        .bind(now_ms)
        .bind(booking.hold_id.to_string())
        .execute(&mut *tx)
        .await?;

        if res.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(ConfirmOutcome::HoldNotActive);
        }

        tx.commit().await?;

        Ok(ConfirmOutcome::Created)
    }

    async fn fetch_booking(&self, booking_id: &Uuid) -> anyhow::Result<Option<Booking>> {
        let row = sqlx::query(&booking_select("WHERE id = ?"))
            .bind(booking_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(row_to_booking(&r)?)),
            None => Ok(None),
        }
    }

    async fn fetch_booking_by_hold(&self, hold_id: &Uuid) -> anyhow::Result<Option<Booking>> {
        let row = sqlx::query(&booking_select("WHERE hold_id = ?"))
            .bind(hold_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(row_to_booking(&r)?)),
            None => Ok(None),
        }
    }

    async fn cancel_booking(
        &self,
        booking_id: &Uuid,
        now_ms: i64,
    ) -> anyhow::Result<CancelOutcome> {
        let mut tx = self.pool.begin().await?;

        let res = sqlx::query(
            r#"
UPDATE bookings
SET status = 'CANCELED', updated_ms = ?
WHERE id = ? AND status = 'CONFIRMED';
"#,
        )
        .bind(now_ms)
        .bind(booking_id.to_string())
        .execute(&mut *tx)
        .await?;

        // CAS miss: booking is missing or a concurrent cancel already
        // restored the seats. Either way, capacity must not move again.
        if res.rows_affected() != 1 {
            let row = sqlx::query(&booking_select("WHERE id = ?"))
                .bind(booking_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;

            tx.rollback().await?;

            return Ok(match row {
                None => CancelOutcome::NotFound,
                Some(r) => CancelOutcome::AlreadyCanceled(row_to_booking(&r)?),
            });
        }

        let row = sqlx::query(&booking_select("WHERE id = ?"))
            .bind(booking_id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let booking = row_to_booking(&row)?;

        sqlx::query(
            r#"
UPDATE holds
SET status = 'CANCELED', updated_ms = ?
WHERE id = ?;
"#,
        )
        .bind(now_ms)
        .bind(booking.hold_id.to_string())
        .execute(&mut *tx)
        .await?;

        restore_capacity(
            &mut tx,
            &booking.departure_id.to_string(),
            booking.seats as i64,
            now_ms,
        )
        .await?;

        tx.commit().await?;

        Ok(CancelOutcome::Canceled(booking))
    }
}

/// Returns seats to the departure, capped at `capacity_total` in case the
/// operator reduced the total while the seats were committed.
async fn restore_capacity(
    tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    departure_id: &str,
    seats: i64,
    now_ms: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
UPDATE departures
SET capacity_available =
  CASE WHEN capacity_available + ? > capacity_total THEN capacity_total
       ELSE capacity_available + ? END,
    updated_ms = ?
WHERE id = ?;
"#,
    )
    .bind(seats)
    .bind(seats)
    .bind(now_ms)
    .bind(departure_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn booking_select(where_clause: &str) -> String {
    format!(
        r#"
SELECT id, hold_id, departure_id, code, seats,
       customer_ref, status, created_ms, updated_ms
FROM bookings
{where_clause};
"#
    )
}

/* =========================
Row mapping
========================= */

pub(crate) fn row_to_hold(r: &sqlx::any::AnyRow) -> anyhow::Result<Hold> {
    let id_str: String = r.get("id");
    let id = Uuid::parse_str(&id_str).context("invalid hold id")?;

    let departure_str: String = r.get("departure_id");
    let departure_id = Uuid::parse_str(&departure_str).context("invalid departure_id")?;

    let status_str: String = r.get("status");

    Ok(Hold {
        id,
        departure_id,
        seats: i64_to_i32(r.get("seats"))?,
        customer_ref: r.get::<String, _>("customer_ref"),
        expires_at: ms_to_utc(r.get("expires_at_ms"))?,
        status: HoldStatus::parse(&status_str)?,
        idempotency_key: r.get::<String, _>("idempotency_key"),
        created_at: ms_to_utc(r.get("created_ms"))?,
        updated_at: ms_to_utc(r.get("updated_ms"))?,
    })
}

fn row_to_booking(r: &sqlx::any::AnyRow) -> anyhow::Result<Booking> {
    let id_str: String = r.get("id");
    let id = Uuid::parse_str(&id_str).context("invalid booking id")?;

    let hold_str: String = r.get("hold_id");
    let hold_id = Uuid::parse_str(&hold_str).context("invalid hold_id")?;

    let departure_str: String = r.get("departure_id");
    let departure_id = Uuid::parse_str(&departure_str).context("invalid departure_id")?;

    let status_str: String = r.get("status");

    Ok(Booking {
        id,
        hold_id,
        departure_id,
        code: r.get::<String, _>("code"),
        seats: i64_to_i32(r.get("seats"))?,
        customer_ref: r.get::<String, _>("customer_ref"),
        status: BookingStatus::parse(&status_str)?,
        created_at: ms_to_utc(r.get("created_ms"))?,
        updated_at: ms_to_utc(r.get("updated_ms"))?,
    })
}
