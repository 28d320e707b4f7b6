use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::DomainError;
use crate::idempotency::hash::request_hash;
use crate::idempotency::model::IdempotencyRecord;
use crate::idempotency::repository::IdempotencyRepository;
use crate::metrics::counters::Counters;
use crate::time::Clock;

/// Outcome of consulting the store before executing a mutating operation.
#[derive(Debug)]
pub enum CheckOutcome {
    /// New request; execute the domain operation and store its outcome.
    /// Carries the hash so `store` does not recompute it.
    Miss { request_hash: String },
    /// Same key, same body: the cached response is returned verbatim.
    Hit {
        status: u16,
        body: Value,
        headers: Option<HashMap<String, String>>,
    },
}

/// Durable at-most-once execution keyed by `(idempotency_key, method)` and
/// bound to the canonical request-body hash.
pub struct IdempotencyService {
    repo: Arc<dyn IdempotencyRepository>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    counters: Counters,
}

impl IdempotencyService {
    pub fn new(
        repo: Arc<dyn IdempotencyRepository>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        counters: Counters,
    ) -> Self {
        Self {
            repo,
            clock,
            ttl,
            counters,
        }
    }

    /// Looks up `(key, method)`. A live record with a different body hash is
    /// a hard mismatch (422, not retryable) — the key is bound to its first
    /// request body for the TTL.
    #[instrument(skip(self, body), target = "idempotency", fields(key = %key, method = %method))]
    pub async fn check(
        &self,
        key: &str,
        method: &str,
        body: &Value,
    ) -> Result<CheckOutcome, DomainError> {
        let hash = request_hash(body);

        let record = self
            .repo
            .fetch_live(key, method, self.clock.now_ms())
            .await?;

        let Some(record) = record else {
            return Ok(CheckOutcome::Miss { request_hash: hash });
        };

        if record.request_body_hash != hash {
            self.counters
                .idempotency_mismatches
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                existing_hash = &record.request_body_hash[..8],
                new_hash = &hash[..8],
                "idempotency key reused with different request body"
            );
            return Err(DomainError::IdempotencyMismatch {
                key: key.to_string(),
                method: method.to_string(),
            });
        }

        let body: Value = serde_json::from_str(&record.response_body)
            .context("corrupt cached response body")?;

        let headers = match &record.response_headers {
            Some(raw) => {
                Some(serde_json::from_str(raw).context("corrupt cached response headers")?)
            }
            None => None,
        };

        self.counters
            .idempotent_replays
            .fetch_add(1, Ordering::Relaxed);
        info!(
            status = record.status_code,
            stored_at = %record.created_at,
            "returning cached idempotent response"
        );

        Ok(CheckOutcome::Hit {
            status: record.status_code,
            body,
            headers,
        })
    }

    /// Persists the outcome for future replays. Domain errors are stored the
    /// same way as successes; only infrastructure failures are excluded (by
    /// the dispatcher, which never calls this for them).
    #[instrument(skip(self, request_hash, body, headers), target = "idempotency", fields(key = %key, method = %method, status))]
    pub async fn store(
        &self,
        key: &str,
        method: &str,
        request_hash: String,
        status: u16,
        body: &Value,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<(), DomainError> {
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(self.ttl)
            .context("idempotency TTL out of chrono range")?;

        let response_headers = match headers {
            Some(h) => Some(serde_json::to_string(h).context("serialize response headers")?),
            None => None,
        };

        let record = IdempotencyRecord {
            id: Uuid::new_v4(),
            key: key.to_string(),
            method: method.to_string(),
            request_body_hash: request_hash,
            status_code: status,
            response_body: body.to_string(),
            response_headers,
            expires_at: now + ttl,
            created_at: now,
        };

        self.repo.insert(&record).await?;

        Ok(())
    }

    /// Deletes a batch of expired records. Returns how many were evicted.
    pub async fn sweep(&self, limit: usize) -> Result<u64, DomainError> {
        let deleted = self.repo.delete_expired(self.clock.now_ms(), limit).await?;

        if deleted > 0 {
            self.counters
                .idempotency_swept
                .fetch_add(deleted, Ordering::Relaxed);
            info!(deleted, "swept expired idempotency records");
        }

        Ok(deleted)
    }
}
