use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    // =========================
    // Request handling
    // =========================
    /// Hard deadline applied to every dispatched domain operation.
    ///
    /// On expiry the in-flight transaction is rolled back and the caller
    /// receives a retryable timeout problem. Timeouts are never cached in
    /// the idempotency store.
    pub request_deadline: Duration,

    /// TTL for idempotency records. A replay after this window re-executes
    /// the operation instead of returning the cached outcome.
    pub idempotency_ttl: Duration,

    // =========================
    // Background workers
    // =========================
    /// Cadence of the hold-expiry sweep.
    pub expiry_interval: Duration,

    /// Maximum holds expired per sweep iteration.
    ///
    /// Bounds the work (and lock churn) of a single iteration; leftovers are
    /// picked up on the next tick.
    pub expiry_batch_size: usize,

    /// Maximum expired idempotency records deleted per sweep iteration.
    pub idempotency_sweep_batch_size: usize,

    /// Cadence of the waitlist-promotion sweep.
    pub promotion_interval: Duration,

    /// Maximum departures examined for promotion per sweep iteration.
    pub promotion_batch_size: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://reservations_dev.db".to_string());

        Self {
            database_url,

            request_deadline: Duration::from_millis(env_u64("REQUEST_DEADLINE_MS", 5_000)),
            idempotency_ttl: Duration::from_secs(env_u64("IDEMPOTENCY_TTL_SECONDS", 24 * 3600)),

            // Worker defaults: expiry every 60s, promotion every 30s.
            expiry_interval: Duration::from_secs(env_u64("HOLD_EXPIRY_INTERVAL_SECONDS", 60)),
            expiry_batch_size: 100,
            idempotency_sweep_batch_size: 1_000,
            promotion_interval: Duration::from_secs(env_u64("PROMOTION_INTERVAL_SECONDS", 30)),
            promotion_batch_size: 100,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
