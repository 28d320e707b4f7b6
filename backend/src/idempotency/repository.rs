use anyhow::Result;
use async_trait::async_trait;

use crate::idempotency::model::IdempotencyRecord;

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// The non-expired record for `(key, method)`, if any.
    async fn fetch_live(
        &self,
        key: &str,
        method: &str,
        now_ms: i64,
    ) -> Result<Option<IdempotencyRecord>>;

    /// Inserts the record. A unique `(key, method)` collision is benign —
    /// a concurrent request wrote first and the next check will see it —
    /// so it is absorbed rather than surfaced.
    async fn insert(&self, record: &IdempotencyRecord) -> Result<()>;

    /// Deletes up to `limit` expired records; returns how many went.
    async fn delete_expired(&self, now_ms: i64, limit: usize) -> Result<u64>;
}
