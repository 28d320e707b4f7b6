use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A customer queued for promotion when a departure frees seats.
///
/// `(departure_id, customer_ref)` is unique, which makes joining naturally
/// idempotent. Entries are promoted in `(created_at, id)` order and
/// `notified_at` is set exactly once.
#[derive(Clone, Debug, Serialize)]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub departure_id: Uuid,
    pub customer_ref: String,
    pub notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WaitlistEntry {
    pub fn new(departure_id: Uuid, customer_ref: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            departure_id,
            customer_ref: customer_ref.into(),
            notified_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
