use std::sync::Arc;

use backend::{
    booking::repository::BookingRepository,
    booking::repository_sqlx::SqlxBookingRepository,
    booking::service::BookingService,
    config::AppConfig,
    db::Db,
    departure::lock::DepartureLocks,
    departure::repository::DepartureRepository,
    departure::repository_sqlx::SqlxDepartureRepository,
    dispatch::dispatcher::Dispatcher,
    idempotency::repository::IdempotencyRepository,
    idempotency::repository_sqlx::SqlxIdempotencyRepository,
    idempotency::service::IdempotencyService,
    inventory::repository::InventoryRepository,
    inventory::repository_sqlx::SqlxInventoryRepository,
    inventory::service::InventoryService,
    logger::init_tracing,
    metrics::counters::Counters,
    time::{Clock, SystemClock},
    waitlist::repository::WaitlistRepository,
    waitlist::repository_sqlx::SqlxWaitlistRepository,
    waitlist::service::WaitlistService,
    workers::{expiry::ExpiryWorker, promotion::PromotionWorker},
};
use tokio::sync::watch;

/// Initializes the database pool and runs the idempotent schema migration.
async fn init_db(cfg: &AppConfig) -> anyhow::Result<Db> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting reservation engine...");

    let cfg = AppConfig::from_env();
    let db = init_db(&cfg).await?;
    let pool = (*db.pool).clone();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let locks = Arc::new(DepartureLocks::new());
    let counters = Counters::default();

    let departure_repo: Arc<dyn DepartureRepository> =
        Arc::new(SqlxDepartureRepository::new(pool.clone()));
    let booking_repo: Arc<dyn BookingRepository> =
        Arc::new(SqlxBookingRepository::new(pool.clone()));
    let waitlist_repo: Arc<dyn WaitlistRepository> =
        Arc::new(SqlxWaitlistRepository::new(pool.clone()));
    let inventory_repo: Arc<dyn InventoryRepository> =
        Arc::new(SqlxInventoryRepository::new(pool.clone()));
    let idempotency_repo: Arc<dyn IdempotencyRepository> =
        Arc::new(SqlxIdempotencyRepository::new(pool.clone()));

    let booking = Arc::new(BookingService::new(
        Arc::clone(&booking_repo),
        Arc::clone(&locks),
        Arc::clone(&clock),
        counters.clone(),
    ));
    let waitlist = Arc::new(WaitlistService::new(
        Arc::clone(&waitlist_repo),
        Arc::clone(&departure_repo),
        Arc::clone(&booking_repo),
        Arc::clone(&locks),
        Arc::clone(&clock),
        counters.clone(),
    ));
    let inventory = Arc::new(InventoryService::new(
        Arc::clone(&inventory_repo),
        Arc::clone(&locks),
        Arc::clone(&clock),
        counters.clone(),
    ));
    let idempotency = Arc::new(IdempotencyService::new(
        Arc::clone(&idempotency_repo),
        Arc::clone(&clock),
        cfg.idempotency_ttl,
        counters.clone(),
    ));

    // The transport adapter (a separate deployment unit) drives
    // `dispatcher.execute(method, idempotency_key, body)`.
    let _dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&idempotency),
        Arc::clone(&booking),
        Arc::clone(&waitlist),
        Arc::clone(&inventory),
        cfg.request_deadline,
    ));

    let (stop_tx, stop_rx) = watch::channel(false);

    let expiry = ExpiryWorker::new(
        Arc::clone(&booking),
        Arc::clone(&idempotency),
        cfg.expiry_interval,
        cfg.expiry_batch_size,
        cfg.idempotency_sweep_batch_size,
    );
    let expiry_handle = tokio::spawn(expiry.run(stop_rx.clone()));

    let promotion = PromotionWorker::new(
        Arc::clone(&waitlist),
        Arc::clone(&waitlist_repo),
        cfg.promotion_interval,
        cfg.promotion_batch_size,
    );
    let promotion_handle = tokio::spawn(promotion.run(stop_rx));

    tracing::info!("Reservation engine started; waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    let _ = stop_tx.send(true);
    let _ = expiry_handle.await;
    let _ = promotion_handle.await;

    Ok(())
}
