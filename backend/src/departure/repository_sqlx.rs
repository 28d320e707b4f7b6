use anyhow::Context;
use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::db::i64_to_i32;
use crate::departure::model::{Departure, Money, Tour};
use crate::departure::repository::DepartureRepository;
use crate::time::ms_to_utc;

/// SQLx-backed implementation of DepartureRepository.
/// Responsible only for persistence and row mapping.
pub struct SqlxDepartureRepository {
    pool: AnyPool,
}

impl SqlxDepartureRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DepartureRepository for SqlxDepartureRepository {
    async fn insert_tour(&self, tour: &Tour) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO tours(id, name, slug, description, created_ms, updated_ms)
VALUES (?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(tour.id.to_string())
        .bind(&tour.name)
        .bind(&tour.slug)
        .bind(tour.description.as_deref())
        .bind(tour.created_at.timestamp_millis())
        .bind(tour.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_tour(&self, tour_id: &Uuid) -> anyhow::Result<Option<Tour>> {
        let row = sqlx::query(
            r#"
SELECT id, name, slug, description, created_ms, updated_ms
FROM tours
WHERE id = ?;
"#,
        )
        .bind(tour_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_tour(&r)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, departure: &Departure) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO departures(
  id, tour_id, starts_at_ms,
  capacity_total, capacity_available,
  price_amount, price_currency,
  created_ms, updated_ms
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(departure.id.to_string())
        .bind(departure.tour_id.to_string())
        .bind(departure.starts_at.timestamp_millis())
        .bind(departure.capacity_total as i64)
        .bind(departure.capacity_available as i64)
        .bind(departure.price.amount)
        .bind(&departure.price.currency)
        .bind(departure.created_at.timestamp_millis())
        .bind(departure.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_by_id(&self, departure_id: &Uuid) -> anyhow::Result<Option<Departure>> {
        let row = sqlx::query(
            r#"
SELECT
  id, tour_id, starts_at_ms,
  capacity_total, capacity_available,
  price_amount, price_currency,
  created_ms, updated_ms
FROM departures
WHERE id = ?;
"#,
        )
        .bind(departure_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_departure(&r)?)),
            None => Ok(None),
        }
    }
}

/* =========================
Row mapping
========================= */

pub(crate) fn row_to_departure(r: &sqlx::any::AnyRow) -> anyhow::Result<Departure> {
    let id_str: String = r.get("id");
    let id = Uuid::parse_str(&id_str).context("invalid departure id")?;

    let tour_id_str: String = r.get("tour_id");
    let tour_id = Uuid::parse_str(&tour_id_str).context("invalid tour_id")?;

    Ok(Departure {
        id,
        tour_id,
        starts_at: ms_to_utc(r.get("starts_at_ms"))?,
        capacity_total: i64_to_i32(r.get("capacity_total"))?,
        capacity_available: i64_to_i32(r.get("capacity_available"))?,
        price: Money {
            amount: r.get("price_amount"),
            currency: r.get::<String, _>("price_currency"),
        },
        created_at: ms_to_utc(r.get("created_ms"))?,
        updated_at: ms_to_utc(r.get("updated_ms"))?,
    })
}

fn row_to_tour(r: &sqlx::any::AnyRow) -> anyhow::Result<Tour> {
    let id_str: String = r.get("id");
    let id = Uuid::parse_str(&id_str).context("invalid tour id")?;

    Ok(Tour {
        id,
        name: r.get::<String, _>("name"),
        slug: r.get::<String, _>("slug"),
        description: r.get::<Option<String>, _>("description"),
        created_at: ms_to_utc(r.get("created_ms"))?,
        updated_at: ms_to_utc(r.get("updated_ms"))?,
    })
}
