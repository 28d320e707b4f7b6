use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::inventory::model::InventoryAdjustment;

/// Result of an atomic capacity adjustment.
#[derive(Debug)]
pub enum AdjustOutcome {
    Applied(InventoryAdjustment),
    /// The delta would cut into committed seats (or drive the total
    /// negative); nothing was written.
    Conflict {
        active_holds: i64,
        total: i32,
        available: i32,
    },
    NotFound,
}

#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Applies `delta` to the departure's totals and appends the audit row,
    /// all in one transaction. Callers hold the departure lock.
    async fn apply_adjustment(
        &self,
        departure_id: &Uuid,
        delta: i32,
        reason: &str,
        actor: &str,
        now_ms: i64,
    ) -> Result<AdjustOutcome>;

    /// Audit trail for a departure, newest first.
    async fn adjustments_for_departure(
        &self,
        departure_id: &Uuid,
    ) -> Result<Vec<InventoryAdjustment>>;
}
