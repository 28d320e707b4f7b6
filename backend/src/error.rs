use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

const PROBLEM_BASE: &str = "https://example.com/problems/";

/// Single field-level validation failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub message: String,
}

/// RFC 9457 problem-details envelope produced for every error response.
#[derive(Clone, Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_uri: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<Violation>>,
}

/// Typed error for every domain operation.
///
/// Domain outcomes (everything except `Internal` and `DeadlineExceeded`) are
/// deterministic: the dispatcher caches their problem-details bodies in the
/// idempotency store so replays observe the identical failure.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error(
        "departure {departure_id} has insufficient capacity (requested {requested}, available {available})"
    )]
    CapacityFull {
        departure_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("hold {hold_id} expired at {expired_at}")]
    HoldExpired {
        hold_id: Uuid,
        expired_at: DateTime<Utc>,
    },

    #[error("{0}")]
    Conflict(String),

    #[error(
        "cannot adjust capacity of departure {departure_id} by {delta}: {active_holds} active holds, {available}/{total} seats free"
    )]
    CapacityConflict {
        departure_id: Uuid,
        delta: i32,
        active_holds: i64,
        available: i32,
        total: i32,
    },

    #[error("idempotency key was already used for {method} with a different request body")]
    IdempotencyMismatch { key: String, method: String },

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("request validation failed")]
    Validation(Vec<Violation>),

    #[error("operation exceeded its deadline")]
    DeadlineExceeded,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::CapacityFull { .. } => 409,
            Self::HoldExpired { .. } => 410,
            Self::Conflict(_) => 409,
            Self::CapacityConflict { .. } => 409,
            Self::IdempotencyMismatch { .. } => 422,
            Self::BadRequest(_) => 400,
            Self::Validation(_) => 422,
            Self::DeadlineExceeded => 504,
            Self::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::CapacityFull { .. } => Some("FULL"),
            Self::HoldExpired { .. } => Some("HOLD_EXPIRED"),
            Self::CapacityConflict { .. } => Some("CAPACITY_CONFLICT"),
            Self::IdempotencyMismatch { .. } => Some("IDEMPOTENCY_KEY_MISMATCH"),
            _ => None,
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Internal(_))
    }

    /// Whether the dispatcher may persist this outcome in the idempotency
    /// store. Infrastructure failures are transient and must re-execute.
    pub fn cacheable(&self) -> bool {
        !matches!(self, Self::DeadlineExceeded | Self::Internal(_))
    }

    fn title(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "Not Found",
            Self::CapacityFull { .. } => "Capacity Full",
            Self::HoldExpired { .. } => "Hold Expired",
            Self::Conflict(_) => "Conflict",
            Self::CapacityConflict { .. } => "Capacity Conflict",
            Self::IdempotencyMismatch { .. } => "Idempotency Key Mismatch",
            Self::BadRequest(_) => "Bad Request",
            Self::Validation(_) => "Validation Failed",
            Self::DeadlineExceeded => "Deadline Exceeded",
            Self::Internal(_) => "Internal Server Error",
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not-found",
            Self::CapacityFull { .. } => "capacity-full",
            Self::HoldExpired { .. } => "hold-expired",
            Self::Conflict(_) => "conflict",
            Self::CapacityConflict { .. } => "capacity-conflict",
            Self::IdempotencyMismatch { .. } => "idempotency-key-mismatch",
            Self::BadRequest(_) => "bad-request",
            Self::Validation(_) => "validation-failed",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::Internal(_) => "internal",
        }
    }

    pub fn to_problem(&self) -> ProblemDetails {
        let detail = match self {
            Self::HoldExpired {
                hold_id,
                expired_at,
            } => format!(
                "hold {hold_id} expired at {}",
                expired_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            // Internal error chains stay in the logs, not in responses.
            Self::Internal(_) => "unexpected internal error".to_string(),
            other => other.to_string(),
        };

        ProblemDetails {
            type_uri: format!("{PROBLEM_BASE}{}", self.slug()),
            title: self.title().to_string(),
            status: self.status(),
            detail,
            code: self.code(),
            retryable: Some(self.retryable()),
            violations: match self {
                Self::Validation(v) => Some(v.clone()),
                _ => None,
            },
        }
    }
}
