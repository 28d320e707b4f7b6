use chrono::{DateTime, TimeZone, Utc};

/// Wall-clock source for the domain layer.
///
/// Services never call `Utc::now()` directly; they go through a `Clock` so
/// that expiry and TTL behavior is testable without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and deterministic replays.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: parking_lot::Mutex<i64>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now_ms: parking_lot::Mutex::new(start.timestamp_millis()),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now_ms.lock() = to.timestamp_millis();
    }

    pub fn advance(&self, d: chrono::Duration) {
        *self.now_ms.lock() += d.num_milliseconds();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        ms_to_utc(*self.now_ms.lock()).expect("manual clock out of range")
    }
}

/// Epoch milliseconds to `DateTime<Utc>`, rejecting out-of-range values.
pub fn ms_to_utc(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {ms}"))
}
