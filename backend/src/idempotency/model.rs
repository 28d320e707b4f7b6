use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persisted outcome of one mutating operation, keyed by
/// `(idempotency_key, method)` and bound to the request body hash.
///
/// Rows are immutable once written and evicted after `expires_at`.
#[derive(Clone, Debug)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub key: String,
    pub method: String,
    pub request_body_hash: String,
    pub status_code: u16,
    pub response_body: String,
    pub response_headers: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
