use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::booking::model::{Booking, Hold};

/// Result of an atomic seat reservation attempt.
#[derive(Debug)]
pub enum ReserveOutcome {
    /// Seats decremented and the hold row inserted.
    Reserved,
    /// Departure exists but has fewer free seats than requested.
    InsufficientCapacity { available: i32 },
    DepartureNotFound,
}

/// Result of inserting a booking for an active hold.
#[derive(Debug)]
pub enum ConfirmOutcome {
    /// Booking inserted and the hold transitioned to CONFIRMED.
    Created,
    /// A unique constraint rejected the insert: either the generated code
    /// collided or a concurrent confirm won the hold. Callers re-check the
    /// hold's booking before retrying with a fresh code.
    DuplicateKey,
    /// The hold left ACTIVE between the caller's check and the transition
    /// (e.g. the expiry worker got there first). Nothing was written.
    HoldNotActive,
}

/// Result of a cancel attempt.
#[derive(Debug)]
pub enum CancelOutcome {
    /// Booking and hold transitioned to CANCELED, seats restored.
    Canceled(Booking),
    /// A previous cancel already ran; returned unchanged.
    AlreadyCanceled(Booking),
    NotFound,
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Atomically decrements departure capacity and inserts `hold` in one
    /// transaction. The conditional capacity update means a departure can
    /// never go negative even without the caller's departure lock.
    async fn reserve_hold(&self, hold: &Hold) -> Result<ReserveOutcome>;

    async fn fetch_hold(&self, hold_id: &Uuid) -> Result<Option<Hold>>;

    /// ACTIVE holds whose TTL elapsed at or before `now_ms`, oldest first.
    async fn due_holds(&self, now_ms: i64, limit: usize) -> Result<Vec<Hold>>;

    /// Transitions one due hold ACTIVE -> EXPIRED and restores its seats,
    /// capped at `capacity_total`. Returns false when the hold was already
    /// transitioned (or is not yet due).
    async fn expire_hold(&self, hold_id: &Uuid, now_ms: i64) -> Result<bool>;

    /// Inserts `booking` and transitions its hold ACTIVE -> CONFIRMED in one
    /// transaction. Capacity is untouched: seats were decremented at hold
    /// creation.
    async fn create_booking(&self, booking: &Booking) -> Result<ConfirmOutcome>;

    async fn fetch_booking(&self, booking_id: &Uuid) -> Result<Option<Booking>>;

    async fn fetch_booking_by_hold(&self, hold_id: &Uuid) -> Result<Option<Booking>>;

    /// Transitions CONFIRMED -> CANCELED (booking and hold) and restores the
    /// booking's seats, capped at `capacity_total`. Idempotent: a repeat
    /// cancel reports `AlreadyCanceled` without touching capacity again.
    async fn cancel_booking(&self, booking_id: &Uuid, now_ms: i64) -> Result<CancelOutcome>;
}
