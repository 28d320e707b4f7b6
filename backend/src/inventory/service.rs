use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::departure::lock::DepartureLocks;
use crate::error::DomainError;
use crate::inventory::model::InventoryAdjustment;
use crate::inventory::repository::{AdjustOutcome, InventoryRepository};
use crate::metrics::counters::Counters;
use crate::time::Clock;

/// Operator capacity adjustments with conflict checking and audit trail.
pub struct InventoryService {
    repo: Arc<dyn InventoryRepository>,
    locks: Arc<DepartureLocks>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl InventoryService {
    pub fn new(
        repo: Arc<dyn InventoryRepository>,
        locks: Arc<DepartureLocks>,
        clock: Arc<dyn Clock>,
        counters: Counters,
    ) -> Self {
        Self {
            repo,
            locks,
            clock,
            counters,
        }
    }

    /// Applies `delta` to the departure's total capacity.
    ///
    /// Reducing below the number of committed seats is refused: holds and
    /// bookings already sold can never be stranded by an operator edit.
    #[instrument(
        skip(self, reason, actor),
        target = "inventory",
        fields(departure_id = %departure_id, delta)
    )]
    pub async fn adjust(
        &self,
        departure_id: Uuid,
        delta: i32,
        reason: &str,
        actor: &str,
    ) -> Result<InventoryAdjustment, DomainError> {
        let _guard = self.locks.acquire(departure_id).await;

        let outcome = self
            .repo
            .apply_adjustment(&departure_id, delta, reason, actor, self.clock.now_ms())
            .await?;

        match outcome {
            AdjustOutcome::Applied(adjustment) => {
                self.counters
                    .adjustments_applied
                    .fetch_add(1, Ordering::Relaxed);
                info!(
                    adjustment_id = %adjustment.id,
                    total_after = adjustment.capacity_total_after,
                    available_after = adjustment.capacity_available_after,
                    actor,
                    "inventory adjusted"
                );
                Ok(adjustment)
            }
            AdjustOutcome::Conflict {
                active_holds,
                total,
                available,
            } => {
                self.counters
                    .adjustments_rejected
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    active_holds,
                    total, available, "adjustment refused: would strand committed seats"
                );
                Err(DomainError::CapacityConflict {
                    departure_id,
                    delta,
                    active_holds,
                    available,
                    total,
                })
            }
            AdjustOutcome::NotFound => Err(DomainError::NotFound {
                resource: "departure",
                id: departure_id.to_string(),
            }),
        }
    }
}
