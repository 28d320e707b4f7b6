use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::booking::code::generate_booking_code;
use crate::booking::model::{Booking, Hold, HoldStatus};
use crate::booking::repository::{
    BookingRepository, CancelOutcome, ConfirmOutcome, ReserveOutcome,
};
use crate::departure::lock::DepartureLocks;
use crate::error::DomainError;
use crate::logger::warn_if_slow;
use crate::metrics::counters::Counters;
use crate::time::Clock;

/// Bounded retries for the booking-code uniqueness collision.
const CODE_RETRY_LIMIT: usize = 5;

/// Hold and booking lifecycle on top of the capacity engine.
///
/// All capacity-mutating paths (hold creation, expiry, cancellation) acquire
/// the per-departure lock for the duration of their transaction; confirming
/// never touches capacity, so it runs lock-free.
pub struct BookingService {
    repo: Arc<dyn BookingRepository>,
    locks: Arc<DepartureLocks>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl BookingService {
    pub fn new(
        repo: Arc<dyn BookingRepository>,
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

    /// Creates an ACTIVE hold, decrementing the departure's free seats.
    #[instrument(
        skip(self, customer_ref, idempotency_key),
        target = "booking",
        fields(departure_id = %departure_id, seats)
    )]
    pub async fn create_hold(
        &self,
        departure_id: Uuid,
        seats: i32,
        customer_ref: &str,
        ttl_seconds: i64,
        idempotency_key: &str,
    ) -> Result<Hold, DomainError> {
        let hold = Hold::new(
            departure_id,
            seats,
            customer_ref,
            ttl_seconds,
            idempotency_key,
            self.clock.now(),
        );

        let _guard = self.locks.acquire(departure_id).await;

        let outcome = warn_if_slow("db_reserve_hold", Duration::from_millis(100), async {
            self.repo.reserve_hold(&hold).await
        })
        .await?;

        match outcome {
            ReserveOutcome::Reserved => {
                self.counters.holds_created.fetch_add(1, Ordering::Relaxed);
                info!(
                    hold_id = %hold.id,
                    seats = hold.seats,
                    expires_at = %hold.expires_at,
                    "hold created"
                );
                Ok(hold)
            }
            ReserveOutcome::InsufficientCapacity { available } => {
                self.counters
                    .holds_rejected_full
                    .fetch_add(1, Ordering::Relaxed);
                warn!(requested = seats, available, "hold rejected: capacity full");
                Err(DomainError::CapacityFull {
                    departure_id,
                    requested: seats,
                    available,
                })
            }
            ReserveOutcome::DepartureNotFound => Err(DomainError::NotFound {
                resource: "departure",
                id: departure_id.to_string(),
            }),
        }
    }

    /// Confirms an active hold into a booking.
    ///
    /// The wall-clock expiry check wins over the stored status: a hold whose
    /// TTL elapsed is refused even if the expiry worker has not swept it yet.
    #[instrument(skip(self), target = "booking", fields(hold_id = %hold_id))]
    pub async fn confirm_booking(&self, hold_id: Uuid) -> Result<Booking, DomainError> {
        let Some(hold) = self.repo.fetch_hold(&hold_id).await? else {
            return Err(DomainError::NotFound {
                resource: "hold",
                id: hold_id.to_string(),
            });
        };

        let now = self.clock.now();
        if hold.is_expired(now) {
            warn!(expired_at = %hold.expires_at, "confirm refused: hold expired");
            return Err(DomainError::HoldExpired {
                hold_id,
                expired_at: hold.expires_at,
            });
        }

        match hold.status {
            HoldStatus::Active => {}
            HoldStatus::Confirmed => {
                // Idempotent replay: the booking already exists.
                return match self.repo.fetch_booking_by_hold(&hold_id).await? {
                    Some(existing) => {
                        info!(booking_id = %existing.id, "returning existing booking for confirmed hold");
                        Ok(existing)
                    }
                    None => Err(anyhow::anyhow!(
                        "hold {hold_id} is CONFIRMED but has no booking"
                    )
                    .into()),
                };
            }
            HoldStatus::Expired | HoldStatus::Canceled => {
                return Err(DomainError::Conflict(format!(
                    "hold {hold_id} is not active (status: {})",
                    hold.status.as_str()
                )));
            }
        }

        for _ in 0..CODE_RETRY_LIMIT {
            let booking = Booking::from_hold(&hold, generate_booking_code(), self.clock.now());

            match self.repo.create_booking(&booking).await? {
                ConfirmOutcome::Created => {
                    self.counters
                        .bookings_confirmed
                        .fetch_add(1, Ordering::Relaxed);
                    info!(
                        booking_id = %booking.id,
                        code = %booking.code,
                        "booking confirmed"
                    );
                    return Ok(booking);
                }
                ConfirmOutcome::DuplicateKey => {
                    // A concurrent confirm may have won the hold; otherwise
                    // the code collided and a fresh one is drawn.
                    if let Some(existing) = self.repo.fetch_booking_by_hold(&hold_id).await? {
                        return Ok(existing);
                    }
                    continue;
                }
                ConfirmOutcome::HoldNotActive => {
                    // The expiry worker transitioned the hold underneath us.
                    return Err(if hold.is_expired(self.clock.now()) {
                        DomainError::HoldExpired {
                            hold_id,
                            expired_at: hold.expires_at,
                        }
                    } else {
                        DomainError::Conflict(format!("hold {hold_id} is no longer active"))
                    });
                }
            }
        }

        Err(anyhow::anyhow!(
            "could not allocate a unique booking code after {CODE_RETRY_LIMIT} attempts"
        )
        .into())
    }

    /// Cancels a booking, restoring its seats. Idempotent.
    #[instrument(skip(self), target = "booking", fields(booking_id = %booking_id))]
    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<Booking, DomainError> {
        let Some(booking) = self.repo.fetch_booking(&booking_id).await? else {
            return Err(DomainError::NotFound {
                resource: "booking",
                id: booking_id.to_string(),
            });
        };

        let _guard = self.locks.acquire(booking.departure_id).await;

        let outcome = self
            .repo
            .cancel_booking(&booking_id, self.clock.now_ms())
            .await?;

        match outcome {
            CancelOutcome::Canceled(b) => {
                self.counters
                    .bookings_canceled
                    .fetch_add(1, Ordering::Relaxed);
                info!(seats_restored = b.seats, "booking canceled");
                Ok(b)
            }
            CancelOutcome::AlreadyCanceled(b) => {
                info!("booking already canceled; returning unchanged");
                Ok(b)
            }
            CancelOutcome::NotFound => Err(DomainError::NotFound {
                resource: "booking",
                id: booking_id.to_string(),
            }),
        }
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, DomainError> {
        match self.repo.fetch_booking(&booking_id).await? {
            Some(b) => Ok(b),
            None => Err(DomainError::NotFound {
                resource: "booking",
                id: booking_id.to_string(),
            }),
        }
    }

    /// Expires due holds, restoring capacity. Each hold is an independent
    /// unit of work: a failure is logged and skipped so peers still expire.
    #[instrument(skip(self), target = "booking")]
    pub async fn expire_holds(&self, batch_size: usize) -> Result<usize, DomainError> {
        let now_ms = self.clock.now_ms();
        let due = self.repo.due_holds(now_ms, batch_size).await?;

        let mut expired = 0usize;
        for hold in due {
            let _guard = self.locks.acquire(hold.departure_id).await;

            match self.repo.expire_hold(&hold.id, now_ms).await {
                Ok(true) => {
                    expired += 1;
                    self.counters.holds_expired.fetch_add(1, Ordering::Relaxed);
                    info!(
                        hold_id = %hold.id,
                        departure_id = %hold.departure_id,
                        seats_restored = hold.seats,
                        "hold expired and capacity restored"
                    );
                }
                Ok(false) => {
                    // Already transitioned by a confirm or a peer sweep.
                }
                Err(e) => {
                    warn!(hold_id = %hold.id, error = %e, "failed to expire hold; skipping");
                }
            }
        }

        Ok(expired)
    }
}
