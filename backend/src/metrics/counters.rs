use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub holds_created: Arc<AtomicU64>,
    pub holds_rejected_full: Arc<AtomicU64>,
    pub holds_expired: Arc<AtomicU64>,

    pub bookings_confirmed: Arc<AtomicU64>,
    pub bookings_canceled: Arc<AtomicU64>,

    pub waitlist_joins: Arc<AtomicU64>,
    pub waitlist_promotions: Arc<AtomicU64>,

    pub adjustments_applied: Arc<AtomicU64>,
    pub adjustments_rejected: Arc<AtomicU64>,

    pub idempotent_replays: Arc<AtomicU64>,
    pub idempotency_mismatches: Arc<AtomicU64>,
    pub idempotency_swept: Arc<AtomicU64>,
}
