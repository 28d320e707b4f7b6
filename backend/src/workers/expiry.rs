use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::booking::service::BookingService;
use crate::idempotency::service::IdempotencyService;
use crate::workers::run_interval;

/// Periodic sweep that expires past-TTL holds (restoring their seats) and
/// evicts expired idempotency records. Each sweep owns its transactions and
/// bypasses the dispatcher's idempotency layer.
pub struct ExpiryWorker {
    booking: Arc<BookingService>,
    idempotency: Arc<IdempotencyService>,
    interval: Duration,
    hold_batch_size: usize,
    sweep_batch_size: usize,
}

impl ExpiryWorker {
    pub fn new(
        booking: Arc<BookingService>,
        idempotency: Arc<IdempotencyService>,
        interval: Duration,
        hold_batch_size: usize,
        sweep_batch_size: usize,
    ) -> Self {
        Self {
            booking,
            idempotency,
            interval,
            hold_batch_size,
            sweep_batch_size,
        }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let Self {
            booking,
            idempotency,
            interval,
            hold_batch_size,
            sweep_batch_size,
        } = self;

        run_interval("hold_expiry", interval, shutdown, move || {
            let booking = Arc::clone(&booking);
            let idempotency = Arc::clone(&idempotency);

            async move {
                let expired = booking
                    .expire_holds(hold_batch_size)
                    .await
                    .map_err(anyhow::Error::new)?;
                if expired > 0 {
                    info!(expired, "hold expiry sweep restored capacity");
                }

                idempotency
                    .sweep(sweep_batch_size)
                    .await
                    .map_err(anyhow::Error::new)?;

                Ok(())
            }
        })
        .await;
    }
}
