use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::waitlist::repository::WaitlistRepository;
use crate::waitlist::service::WaitlistService;
use crate::workers::run_interval;

/// Periodic sweep that promotes waitlisted customers on departures with
/// free seats. One departure failing is logged and skipped; the rest of the
/// batch still runs.
pub struct PromotionWorker {
    waitlist: Arc<WaitlistService>,
    repo: Arc<dyn WaitlistRepository>,
    interval: Duration,
    departure_batch_size: usize,
}

impl PromotionWorker {
    pub fn new(
        waitlist: Arc<WaitlistService>,
        repo: Arc<dyn WaitlistRepository>,
        interval: Duration,
        departure_batch_size: usize,
    ) -> Self {
        Self {
            waitlist,
            repo,
            interval,
            departure_batch_size,
        }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let Self {
            waitlist,
            repo,
            interval,
            departure_batch_size,
        } = self;

        run_interval("waitlist_promotion", interval, shutdown, move || {
            let waitlist = Arc::clone(&waitlist);
            let repo = Arc::clone(&repo);

            async move {
                let departures = repo.promotable_departures(departure_batch_size).await?;

                let mut total = 0usize;
                for departure_id in departures {
                    match waitlist.notify_waitlist(departure_id).await {
                        Ok(outcome) => total += outcome.processed_count,
                        Err(e) => {
                            error!(
                                departure_id = %departure_id,
                                error = %e,
                                "waitlist promotion failed for departure"
                            );
                        }
                    }
                }

                if total > 0 {
                    info!(promoted = total, "waitlist promotion sweep completed");
                }

                Ok(())
            }
        })
        .await;
    }
}
