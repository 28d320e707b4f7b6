use anyhow::Context;
use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::db::{i64_to_u16, is_unique_violation};
use crate::idempotency::model::IdempotencyRecord;
use crate::idempotency::repository::IdempotencyRepository;
use crate::time::ms_to_utc;

/// SQLx-backed implementation of IdempotencyRepository.
pub struct SqlxIdempotencyRepository {
    pool: AnyPool,
}

impl SqlxIdempotencyRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyRepository for SqlxIdempotencyRepository {
    async fn fetch_live(
        &self,
        key: &str,
        method: &str,
        now_ms: i64,
    ) -> anyhow::Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            r#"
SELECT id, idempotency_key, method, request_body_hash,
       response_status_code, response_body, response_headers,
       expires_at_ms, created_ms
FROM idempotency_records
WHERE idempotency_key = ? AND method = ? AND expires_at_ms > ?;
"#,
        )
        .bind(key)
        .bind(method)
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_record(&r)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, record: &IdempotencyRecord) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
INSERT INTO idempotency_records(
  id, idempotency_key, method, request_body_hash,
  response_status_code, response_body, response_headers,
  expires_at_ms, created_ms
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(record.id.to_string())
        .bind(&record.key)
        .bind(&record.method)
        .bind(&record.request_body_hash)
        .bind(record.status_code as i64)
        .bind(&record.response_body)
        .bind(record.response_headers.as_deref())
        .bind(record.expires_at.timestamp_millis())
        .bind(record.created_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                tracing::info!(
                    key = %record.key,
                    method = %record.method,
                    "idempotency record already written by concurrent request"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_expired(&self, now_ms: i64, limit: usize) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
DELETE FROM idempotency_records
WHERE id IN (
  SELECT id FROM idempotency_records
  WHERE expires_at_ms <= ?
  LIMIT ?
);
"#,
        )
        .bind(now_ms)
        .bind(limit as i64)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }
}

/* =========================
Row mapping
========================= */

fn row_to_record(r: &sqlx::any::AnyRow) -> anyhow::Result<IdempotencyRecord> {
    let id_str: String = r.get("id");
    let id = Uuid::parse_str(&id_str).context("invalid idempotency record id")?;

    Ok(IdempotencyRecord {
        id,
        key: r.get::<String, _>("idempotency_key"),
        method: r.get::<String, _>("method"),
        request_body_hash: r.get::<String, _>("request_body_hash"),
        status_code: i64_to_u16(r.get("response_status_code"))?,
        response_body: r.get::<String, _>("response_body"),
        response_headers: r.get::<Option<String>, _>("response_headers"),
        expires_at: ms_to_utc(r.get("expires_at_ms"))?,
        created_at: ms_to_utc(r.get("created_ms"))?,
    })
}
