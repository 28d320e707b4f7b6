use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-departure exclusive locks.
///
/// Every code path that read-modify-writes a departure's capacity acquires
/// this lock first and holds it until its transaction commits or rolls back.
/// Writers for distinct departures never contend.
///
/// The map only grows with the number of distinct departures seen by this
/// process; entries are a single `Arc<Mutex>` each.
#[derive(Default)]
pub struct DepartureLocks {
    inner: parking_lot::Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl DepartureLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the exclusive lock for `departure_id`.
    ///
    /// The returned guard is owned, so it can be held across await points
    /// for the duration of the surrounding transaction. Not re-entrant:
    /// callers that already hold the guard must not call this again for the
    /// same departure.
    pub async fn acquire(&self, departure_id: Uuid) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock();
            map.entry(departure_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        entry.lock_owned().await
    }
}
