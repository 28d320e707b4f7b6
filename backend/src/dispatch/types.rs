use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Violation;

/// Mutating operations bind to an idempotency key; reads do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    BookingHold,
    BookingConfirm,
    BookingCancel,
    BookingGet,
    WaitlistJoin,
    WaitlistNotify,
    InventoryAdjust,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookingHold => "booking/hold",
            Self::BookingConfirm => "booking/confirm",
            Self::BookingCancel => "booking/cancel",
            Self::BookingGet => "booking/get",
            Self::WaitlistJoin => "waitlist/join",
            Self::WaitlistNotify => "waitlist/notify",
            Self::InventoryAdjust => "inventory/adjust",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booking/hold" => Some(Self::BookingHold),
            "booking/confirm" => Some(Self::BookingConfirm),
            "booking/cancel" => Some(Self::BookingCancel),
            "booking/get" => Some(Self::BookingGet),
            "waitlist/join" => Some(Self::WaitlistJoin),
            "waitlist/notify" => Some(Self::WaitlistNotify),
            "inventory/adjust" => Some(Self::InventoryAdjust),
            _ => None,
        }
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::BookingGet)
    }
}

/// What the transport layer hands back to its client: status, JSON body,
/// and any headers a cached replay carried.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub body: Value,
    pub headers: HashMap<String, String>,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            headers: HashMap::new(),
        }
    }
}

/* =========================
Request bodies
========================= */

pub const MAX_SEATS_PER_HOLD: i32 = 10;
pub const MIN_HOLD_TTL_SECONDS: i64 = 60;
pub const MAX_HOLD_TTL_SECONDS: i64 = 3600;
pub const MAX_CUSTOMER_REF_LEN: usize = 128;

#[derive(Debug, Deserialize)]
pub struct CreateHoldRequest {
    pub departure_id: Uuid,
    pub seats: i32,
    pub customer_ref: String,
    pub ttl_seconds: i64,
}

impl CreateHoldRequest {
    pub fn validate(&self) -> Vec<Violation> {
        let mut v = Vec::new();
        if !(1..=MAX_SEATS_PER_HOLD).contains(&self.seats) {
            v.push(Violation {
                field: "seats",
                message: format!("must be between 1 and {MAX_SEATS_PER_HOLD}"),
            });
        }
        if !(MIN_HOLD_TTL_SECONDS..=MAX_HOLD_TTL_SECONDS).contains(&self.ttl_seconds) {
            v.push(Violation {
                field: "ttl_seconds",
                message: format!(
                    "must be between {MIN_HOLD_TTL_SECONDS} and {MAX_HOLD_TTL_SECONDS}"
                ),
            });
        }
        if let Some(violation) = validate_customer_ref(&self.customer_ref) {
            v.push(violation);
        }
        v
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBookingRequest {
    pub hold_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GetBookingRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct JoinWaitlistRequest {
    pub departure_id: Uuid,
    pub customer_ref: String,
}

impl JoinWaitlistRequest {
    pub fn validate(&self) -> Vec<Violation> {
        validate_customer_ref(&self.customer_ref)
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct NotifyWaitlistRequest {
    pub departure_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AdjustInventoryRequest {
    pub departure_id: Uuid,
    pub delta: i32,
    pub reason: String,
    /// Operator identity; the transport layer normally injects this from
    /// auth, which is outside this crate.
    #[serde(default)]
    pub actor: Option<String>,
}

impl AdjustInventoryRequest {
    pub fn validate(&self) -> Vec<Violation> {
        let mut v = Vec::new();
        if self.delta == 0 {
            v.push(Violation {
                field: "delta",
                message: "must not be zero".into(),
            });
        }
        if self.reason.trim().is_empty() {
            v.push(Violation {
                field: "reason",
                message: "must not be empty".into(),
            });
        }
        v
    }
}

fn validate_customer_ref(customer_ref: &str) -> Option<Violation> {
    if customer_ref.is_empty() || customer_ref.len() > MAX_CUSTOMER_REF_LEN {
        Some(Violation {
            field: "customer_ref",
            message: format!("must be 1 to {MAX_CUSTOMER_REF_LEN} characters"),
        })
    } else {
        None
    }
}
