use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One operator-driven capacity change, with before/after snapshots.
/// Rows are append-only; the audit trail is never rewritten.
#[derive(Clone, Debug, Serialize)]
pub struct InventoryAdjustment {
    pub id: Uuid,
    pub departure_id: Uuid,
    pub delta: i32,
    pub reason: String,
    pub actor: String,
    pub capacity_total_before: i32,
    pub capacity_total_after: i32,
    pub capacity_available_before: i32,
    pub capacity_available_after: i32,
    pub created_at: DateTime<Utc>,
}
