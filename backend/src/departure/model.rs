use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Price in minor units with an ISO 4217 currency code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Money {
    pub amount: i64,
    pub currency: String,
}

/// A tour a departure belongs to. Only the fields the engine needs; tour
/// CRUD lives outside this crate.
#[derive(Clone, Debug, Serialize)]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tour {
    pub fn new(name: impl Into<String>, slug: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            slug: slug.into(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A scheduled instance of a tour with finite seat capacity.
///
/// Invariant: `0 <= capacity_available <= capacity_total`. Capacity fields
/// are mutated only inside a transaction holding this departure's lock.
#[derive(Clone, Debug, Serialize)]
pub struct Departure {
    pub id: Uuid,
    pub tour_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub capacity_total: i32,
    pub capacity_available: i32,
    pub price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Departure {
    /// New departure with all capacity available.
    pub fn new(
        tour_id: Uuid,
        starts_at: DateTime<Utc>,
        capacity_total: i32,
        price: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tour_id,
            starts_at,
            capacity_total,
            capacity_available: capacity_total,
            price,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seats currently committed to active holds and confirmed bookings.
    pub fn seats_committed(&self) -> i32 {
        self.capacity_total - self.capacity_available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_departure(total: i32, available: i32) -> Departure {
        let mut d = Departure::new(
            Uuid::new_v4(),
            Utc::now(),
            total,
            Money {
                amount: 129_900,
                currency: "USD".to_string(),
            },
            Utc::now(),
        );
        d.capacity_available = available;
        d
    }

    #[test]
    fn new_departure_starts_fully_available() {
        let d = mk_departure(50, 50);
        assert_eq!(d.capacity_available, d.capacity_total);
        assert_eq!(d.seats_committed(), 0);
    }

    #[test]
    fn seats_committed_tracks_decrements() {
        let d = mk_departure(50, 38);
        assert_eq!(d.seats_committed(), 12);
    }

    #[test]
    fn serializes_price_as_nested_money() {
        let d = mk_departure(10, 10);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["price"]["amount"], 129_900);
        assert_eq!(json["price"]["currency"], "USD");
    }
}
