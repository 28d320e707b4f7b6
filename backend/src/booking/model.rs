use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Hold lifecycle. `Active` is the only non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldStatus {
    Active,
    Expired,
    Confirmed,
    Canceled,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Confirmed => "CONFIRMED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "EXPIRED" => Ok(Self::Expired),
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELED" => Ok(Self::Canceled),
            other => Err(anyhow::anyhow!("unknown hold status: {other}")),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Canceled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELED" => Ok(Self::Canceled),
            other => Err(anyhow::anyhow!("unknown booking status: {other}")),
        }
    }
}

/// A time-limited reservation of seats pending confirmation.
///
/// Seats are decremented from the departure when the hold is created and
/// restored when it expires or is canceled; confirmation does not touch
/// capacity again.
#[derive(Clone, Debug, Serialize)]
pub struct Hold {
    pub id: Uuid,
    pub departure_id: Uuid,
    pub seats: i32,
    pub customer_ref: String,
    pub expires_at: DateTime<Utc>,
    pub status: HoldStatus,
    #[serde(skip_serializing)]
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Hold {
    pub fn new(
        departure_id: Uuid,
        seats: i32,
        customer_ref: impl Into<String>,
        ttl_seconds: i64,
        idempotency_key: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            departure_id,
            seats,
            customer_ref: customer_ref.into(),
            expires_at: now + Duration::seconds(ttl_seconds),
            status: HoldStatus::Active,
            idempotency_key: idempotency_key.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A confirmed, customer-visible reservation arising from a hold.
#[derive(Clone, Debug, Serialize)]
pub struct Booking {
    pub id: Uuid,
    pub hold_id: Uuid,
    pub departure_id: Uuid,
    pub code: String,
    pub seats: i32,
    pub customer_ref: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Booking confirmed from an active hold; seats and customer carry over.
    pub fn from_hold(hold: &Hold, code: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hold_id: hold.id,
            departure_id: hold.departure_id,
            code: code.into(),
            seats: hold.seats,
            customer_ref: hold.customer_ref.clone(),
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_hold(ttl_seconds: i64) -> Hold {
        Hold::new(
            Uuid::new_v4(),
            3,
            "alice",
            ttl_seconds,
            "key-1",
            Utc::now(),
        )
    }

    #[test]
    fn hold_status_round_trips() {
        for status in [
            HoldStatus::Active,
            HoldStatus::Expired,
            HoldStatus::Confirmed,
            HoldStatus::Canceled,
        ] {
            assert_eq!(HoldStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(HoldStatus::parse("PENDING").is_err());
    }

    #[test]
    fn only_active_is_non_terminal() {
        assert!(!HoldStatus::Active.is_terminal());
        assert!(HoldStatus::Expired.is_terminal());
        assert!(HoldStatus::Confirmed.is_terminal());
        assert!(HoldStatus::Canceled.is_terminal());
    }

    #[test]
    fn new_hold_expires_after_ttl() {
        let hold = mk_hold(600);
        assert_eq!(hold.expires_at - hold.created_at, Duration::seconds(600));
        assert!(!hold.is_expired(hold.created_at));
        assert!(hold.is_expired(hold.created_at + Duration::seconds(600)));
    }

    #[test]
    fn booking_inherits_hold_seats_and_customer() {
        let hold = mk_hold(600);
        let booking = Booking::from_hold(&hold, "AB12CD34", Utc::now());
        assert_eq!(booking.hold_id, hold.id);
        assert_eq!(booking.departure_id, hold.departure_id);
        assert_eq!(booking.seats, hold.seats);
        assert_eq!(booking.customer_ref, hold.customer_ref);
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }

    #[test]
    fn statuses_serialize_screaming_snake() {
        let hold = mk_hold(60);
        let json = serde_json::to_value(&hold).unwrap();
        assert_eq!(json["status"], "ACTIVE");
        // The client-supplied key is internal plumbing, not API surface.
        assert!(json.get("idempotency_key").is_none());
    }
}
