pub mod expiry;
pub mod promotion;

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Cooperative worker loop: run one bounded iteration per tick until the
/// shutdown signal flips.
///
/// An iteration error is logged and the loop keeps going — the next tick
/// retries. In-flight iterations always run to completion; the signal is
/// observed between iterations, never mid-transaction. Locks are never held
/// across the sleep.
pub async fn run_interval<F, Fut>(
    name: &'static str,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut iteration: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        worker = name,
        interval_ms = interval.as_millis() as u64,
        "worker started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = iteration().await {
                    tracing::error!(worker = name, error = ?e, "worker iteration failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(worker = name, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing_test::traced_test;

    #[tokio::test]
    async fn iterations_run_until_shutdown() {
        let count = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = watch::channel(false);

        let count2 = Arc::clone(&count);
        let handle = tokio::spawn(run_interval(
            "test",
            Duration::from_millis(5),
            stop_rx,
            move || {
                let count = Arc::clone(&count2);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(40)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[traced_test]
    #[tokio::test]
    async fn iteration_errors_are_logged_and_do_not_kill_the_loop() {
        let count = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = watch::channel(false);

        let count2 = Arc::clone(&count);
        let handle = tokio::spawn(run_interval(
            "flaky",
            Duration::from_millis(5),
            stop_rx,
            move || {
                let count = Arc::clone(&count2);
                async move {
                    let n = count.fetch_add(1, Ordering::SeqCst);
                    if n % 2 == 0 {
                        anyhow::bail!("transient failure");
                    }
                    Ok(())
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(40)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(count.load(Ordering::SeqCst) >= 3);
        assert!(logs_contain("worker iteration failed"));
        assert!(logs_contain("worker stopped"));
    }

    #[tokio::test]
    async fn dropped_sender_also_stops_the_loop() {
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_interval(
            "orphaned",
            Duration::from_millis(5),
            stop_rx,
            || async { Ok(()) },
        ));

        drop(stop_tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop when the shutdown channel closes")
            .unwrap();
    }
}
