use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::waitlist::model::WaitlistEntry;

/// Result of an idempotent waitlist insert.
#[derive(Debug)]
pub enum JoinOutcome {
    Created(WaitlistEntry),
    /// The `(departure_id, customer_ref)` row already existed; returned with
    /// its original `created_at` so queue position is preserved.
    Existing(WaitlistEntry),
}

#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    /// Inserts `entry`, resolving a uniqueness race by re-reading the row
    /// the concurrent writer created.
    async fn insert_entry(&self, entry: &WaitlistEntry) -> Result<JoinOutcome>;

    async fn fetch_by_customer(
        &self,
        departure_id: &Uuid,
        customer_ref: &str,
    ) -> Result<Option<WaitlistEntry>>;

    /// Unnotified entries for a departure in FIFO order
    /// (`created_at`, tie-broken by `id`).
    async fn unnotified_entries(
        &self,
        departure_id: &Uuid,
        limit: usize,
    ) -> Result<Vec<WaitlistEntry>>;

    async fn mark_notified(&self, entry_id: &Uuid, now_ms: i64) -> Result<()>;

    /// Departures with free seats and at least one unnotified entry — the
    /// promotion worker's work queue.
    async fn promotable_departures(&self, limit: usize) -> Result<Vec<Uuid>>;
}
