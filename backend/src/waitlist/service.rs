use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::booking::model::Hold;
use crate::booking::repository::{BookingRepository, ReserveOutcome};
use crate::departure::lock::DepartureLocks;
use crate::departure::repository::DepartureRepository;
use crate::error::DomainError;
use crate::metrics::counters::Counters;
use crate::time::Clock;
use crate::waitlist::model::WaitlistEntry;
use crate::waitlist::repository::{JoinOutcome, WaitlistRepository};

/// Promotion holds are short-lived and single-seat: the customer gets five
/// minutes to confirm before the seat goes back into the pool.
const PROMOTION_HOLD_TTL_SECONDS: i64 = 300;
const PROMOTION_HOLD_SEATS: i32 = 1;

/// Result of one promotion pass over a departure's waitlist.
#[derive(Debug, Default)]
pub struct NotifyOutcome {
    pub processed_count: usize,
    pub holds_created: Vec<Hold>,
}

/// FIFO waitlist with idempotent joins and capacity-driven promotion.
pub struct WaitlistService {
    repo: Arc<dyn WaitlistRepository>,
    departures: Arc<dyn DepartureRepository>,
    bookings: Arc<dyn BookingRepository>,
    locks: Arc<DepartureLocks>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl WaitlistService {
    pub fn new(
        repo: Arc<dyn WaitlistRepository>,
        departures: Arc<dyn DepartureRepository>,
        bookings: Arc<dyn BookingRepository>,
        locks: Arc<DepartureLocks>,
        clock: Arc<dyn Clock>,
        counters: Counters,
    ) -> Self {
        Self {
            repo,
            departures,
            bookings,
            locks,
            clock,
            counters,
        }
    }

    /// Joins the departure's waitlist. Idempotent on
    /// `(departure_id, customer_ref)`: a repeat join returns the original
    /// entry with its queue position intact.
    #[instrument(skip(self, customer_ref), target = "waitlist", fields(departure_id = %departure_id))]
    pub async fn join_waitlist(
        &self,
        departure_id: Uuid,
        customer_ref: &str,
    ) -> Result<WaitlistEntry, DomainError> {
        if self.departures.fetch_by_id(&departure_id).await?.is_none() {
            return Err(DomainError::NotFound {
                resource: "departure",
                id: departure_id.to_string(),
            });
        }

        if let Some(existing) = self
            .repo
            .fetch_by_customer(&departure_id, customer_ref)
            .await?
        {
            info!(entry_id = %existing.id, "customer already on waitlist; returning existing entry");
            return Ok(existing);
        }

        let entry = WaitlistEntry::new(departure_id, customer_ref, self.clock.now());

        match self.repo.insert_entry(&entry).await? {
            JoinOutcome::Created(e) => {
                self.counters.waitlist_joins.fetch_add(1, Ordering::Relaxed);
                info!(entry_id = %e.id, "customer joined waitlist");
                Ok(e)
            }
            JoinOutcome::Existing(e) => {
                info!(entry_id = %e.id, "waitlist entry created by concurrent request; returning existing");
                Ok(e)
            }
        }
    }

    /// Converts free seats into short-TTL holds for the longest-waiting
    /// unnotified customers.
    ///
    /// Runs under a single acquisition of the departure lock, so promotion
    /// observes a stable `capacity_available` and hold creation cannot
    /// deadlock on re-entry.
    #[instrument(skip(self), target = "waitlist", fields(departure_id = %departure_id))]
    pub async fn notify_waitlist(
        &self,
        departure_id: Uuid,
    ) -> Result<NotifyOutcome, DomainError> {
        let _guard = self.locks.acquire(departure_id).await;

        let Some(departure) = self.departures.fetch_by_id(&departure_id).await? else {
            return Err(DomainError::NotFound {
                resource: "departure",
                id: departure_id.to_string(),
            });
        };

        if departure.capacity_available <= 0 {
            debug!("no free seats; nothing to promote");
            return Ok(NotifyOutcome::default());
        }

        let entries = self
            .repo
            .unnotified_entries(&departure_id, departure.capacity_available as usize)
            .await?;

        if entries.is_empty() {
            debug!("no unnotified waitlist entries");
            return Ok(NotifyOutcome::default());
        }

        let mut outcome = NotifyOutcome::default();
        let epoch_secs = self.clock.now().timestamp();

        for entry in entries {
            let now = self.clock.now();
            let hold = Hold::new(
                departure_id,
                PROMOTION_HOLD_SEATS,
                entry.customer_ref.as_str(),
                PROMOTION_HOLD_TTL_SECONDS,
                format!("waitlist-{}-{epoch_secs}", entry.id),
                now,
            );

            match self.bookings.reserve_hold(&hold).await {
                Ok(ReserveOutcome::Reserved) => {
                    self.repo
                        .mark_notified(&entry.id, now.timestamp_millis())
                        .await?;
                    self.counters
                        .waitlist_promotions
                        .fetch_add(1, Ordering::Relaxed);
                    info!(
                        entry_id = %entry.id,
                        hold_id = %hold.id,
                        expires_at = %hold.expires_at,
                        "created promotion hold for waitlisted customer"
                    );
                    outcome.holds_created.push(hold);
                    outcome.processed_count += 1;
                }
                Ok(ReserveOutcome::InsufficientCapacity { available }) => {
                    // Seats ran out mid-batch; remaining entries keep their
                    // unnotified position for the next pass.
                    debug!(available, "capacity exhausted during promotion");
                    break;
                }
                Ok(ReserveOutcome::DepartureNotFound) => {
                    warn!("departure disappeared during promotion");
                    break;
                }
                Err(e) => {
                    warn!(
                        entry_id = %entry.id,
                        error = %e,
                        "failed to create promotion hold; entry stays unnotified"
                    );
                    continue;
                }
            }
        }

        if outcome.processed_count > 0 {
            info!(
                processed = outcome.processed_count,
                "waitlist promotion pass completed"
            );
        }

        Ok(outcome)
    }
}
