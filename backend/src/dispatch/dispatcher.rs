//! Operation dispatcher: the single entry point the transport layer calls.
//!
//! Responsibilities:
//! - Require and bound the `Idempotency-Key` for every mutating method.
//! - Consult the idempotency store before executing; replay cached outcomes
//!   verbatim (status, body, headers).
//! - Run the domain operation under a hard deadline.
//! - Persist domain outcomes — successes and domain-error problems alike —
//!   so replays are fully deterministic. Infrastructure failures (5xx,
//!   timeouts) are never cached and may re-execute under the same key.
//!
//! Non-responsibilities:
//! - HTTP framing, routing, auth, schema documentation (transport layer).
//! - Domain rules (services own them).

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{error, instrument, warn};

use crate::booking::service::BookingService;
use crate::dispatch::types::{
    AdjustInventoryRequest, CancelBookingRequest, ConfirmBookingRequest, CreateHoldRequest,
    GetBookingRequest, JoinWaitlistRequest, Method, NotifyWaitlistRequest, Response,
};
use crate::error::DomainError;
use crate::idempotency::service::{CheckOutcome, IdempotencyService};
use crate::inventory::service::InventoryService;
use crate::waitlist::service::WaitlistService;

pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

const DEFAULT_ACTOR: &str = "system";

pub struct Dispatcher {
    idempotency: Arc<IdempotencyService>,
    booking: Arc<BookingService>,
    waitlist: Arc<WaitlistService>,
    inventory: Arc<InventoryService>,
    deadline: Duration,
}

impl Dispatcher {
    pub fn new(
        idempotency: Arc<IdempotencyService>,
        booking: Arc<BookingService>,
        waitlist: Arc<WaitlistService>,
        inventory: Arc<InventoryService>,
        deadline: Duration,
    ) -> Self {
        Self {
            idempotency,
            booking,
            waitlist,
            inventory,
            deadline,
        }
    }

    /// Executes one operation and returns the transport-ready response.
    /// Never fails: every error becomes a problem-details response.
    #[instrument(
        skip(self, idempotency_key, body),
        target = "dispatch",
        fields(method = %method.as_str())
    )]
    pub async fn execute(
        &self,
        method: Method,
        idempotency_key: Option<&str>,
        body: Value,
    ) -> Response {
        if !method.is_mutating() {
            let result = self.run_with_deadline(method, None, &body).await;
            return match result {
                Ok(value) => Response::ok(value),
                Err(e) => problem_response(&e),
            };
        }

        let key = match idempotency_key {
            Some(k) if (1..=MAX_IDEMPOTENCY_KEY_LEN).contains(&k.len()) => k,
            Some(_) => {
                return problem_response(&DomainError::BadRequest(format!(
                    "Idempotency-Key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters"
                )));
            }
            None => {
                return problem_response(&DomainError::BadRequest(
                    "Idempotency-Key header is required for mutating operations".into(),
                ));
            }
        };

        let request_hash = match self.idempotency.check(key, method.as_str(), &body).await {
            Ok(CheckOutcome::Hit {
                status,
                body,
                headers,
            }) => {
                return Response {
                    status,
                    body,
                    headers: headers.unwrap_or_default(),
                };
            }
            Ok(CheckOutcome::Miss { request_hash }) => request_hash,
            Err(e) => return problem_response(&e),
        };

        let result = self.run_with_deadline(method, Some(key), &body).await;

        let (response, cacheable) = match result {
            Ok(value) => (Response::ok(value), true),
            Err(e) => (problem_response(&e), e.cacheable()),
        };

        if cacheable {
            if let Err(e) = self
                .idempotency
                .store(
                    key,
                    method.as_str(),
                    request_hash,
                    response.status,
                    &response.body,
                    None,
                )
                .await
            {
                // The domain outcome already committed; losing the cache
                // entry only means a same-key retry may re-execute.
                error!(error = %e, "failed to persist idempotency record");
            }
        }

        response
    }

    async fn run_with_deadline(
        &self,
        method: Method,
        idempotency_key: Option<&str>,
        body: &Value,
    ) -> Result<Value, DomainError> {
        match tokio::time::timeout(self.deadline, self.run(method, idempotency_key, body)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline_ms = self.deadline.as_millis() as u64, "operation deadline exceeded");
                Err(DomainError::DeadlineExceeded)
            }
        }
    }

    async fn run(
        &self,
        method: Method,
        idempotency_key: Option<&str>,
        body: &Value,
    ) -> Result<Value, DomainError> {
        match method {
            Method::BookingHold => {
                let req: CreateHoldRequest = decode(body)?;
                require_valid(req.validate())?;
                // Mutating dispatch guarantees the key is present.
                let key = idempotency_key.unwrap_or_default();
                let hold = self
                    .booking
                    .create_hold(
                        req.departure_id,
                        req.seats,
                        &req.customer_ref,
                        req.ttl_seconds,
                        key,
                    )
                    .await?;
                encode(&hold)
            }
            Method::BookingConfirm => {
                let req: ConfirmBookingRequest = decode(body)?;
                let booking = self.booking.confirm_booking(req.hold_id).await?;
                encode(&booking)
            }
            Method::BookingCancel => {
                let req: CancelBookingRequest = decode(body)?;
                let booking = self.booking.cancel_booking(req.booking_id).await?;
                encode(&booking)
            }
            Method::BookingGet => {
                let req: GetBookingRequest = decode(body)?;
                let booking = self.booking.get_booking(req.booking_id).await?;
                encode(&booking)
            }
            Method::WaitlistJoin => {
                let req: JoinWaitlistRequest = decode(body)?;
                require_valid(req.validate())?;
                let entry = self
                    .waitlist
                    .join_waitlist(req.departure_id, &req.customer_ref)
                    .await?;
                encode(&entry)
            }
            Method::WaitlistNotify => {
                let req: NotifyWaitlistRequest = decode(body)?;
                let outcome = self.waitlist.notify_waitlist(req.departure_id).await?;
                Ok(json!({
                    "processed_count": outcome.processed_count,
                    "holds_created": outcome.holds_created,
                }))
            }
            Method::InventoryAdjust => {
                let req: AdjustInventoryRequest = decode(body)?;
                require_valid(req.validate())?;
                let actor = req.actor.as_deref().unwrap_or(DEFAULT_ACTOR);
                let adjustment = self
                    .inventory
                    .adjust(req.departure_id, req.delta, &req.reason, actor)
                    .await?;
                encode(&adjustment)
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &Value) -> Result<T, DomainError> {
    serde_json::from_value(body.clone()).map_err(|e| DomainError::BadRequest(e.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, DomainError> {
    serde_json::to_value(value).map_err(|e| DomainError::Internal(e.into()))
}

fn require_valid(violations: Vec<crate::error::Violation>) -> Result<(), DomainError> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(DomainError::Validation(violations))
    }
}

fn problem_response(err: &DomainError) -> Response {
    let problem = err.to_problem();
    let status = problem.status;
    let body = serde_json::to_value(&problem).unwrap_or_else(|_| {
        json!({
            "type": "about:blank",
            "title": "Internal Server Error",
            "status": 500,
            "detail": "failed to serialize problem details",
        })
    });

    Response {
        status,
        body,
        headers: Default::default(),
    }
}
