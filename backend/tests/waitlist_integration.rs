use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use uuid::Uuid;

use backend::booking::repository::BookingRepository;
use backend::booking::repository_sqlx::SqlxBookingRepository;
use backend::booking::service::BookingService;
use backend::departure::lock::DepartureLocks;
use backend::departure::model::{Departure, Money, Tour};
use backend::departure::repository::DepartureRepository;
use backend::departure::repository_sqlx::SqlxDepartureRepository;
use backend::error::DomainError;
use backend::inventory::repository_sqlx::SqlxInventoryRepository;
use backend::inventory::service::InventoryService;
use backend::metrics::counters::Counters;
use backend::time::{Clock, ManualClock};
use backend::waitlist::model::WaitlistEntry;
use backend::waitlist::repository::{JoinOutcome, WaitlistRepository};
use backend::waitlist::repository_sqlx::SqlxWaitlistRepository;
use backend::waitlist::service::WaitlistService;
use backend::workers::promotion::PromotionWorker;

async fn setup_pool() -> AnyPool {
    sqlx::any::install_default_drivers();

    let db_name = Uuid::new_v4().to_string();
    let conn_str = format!("sqlite:file:{db_name}?mode=memory&cache=shared");

    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&conn_str)
        .await
        .unwrap();

    backend::db::schema::migrate(&pool).await.unwrap();

    pool
}

struct Harness {
    clock: Arc<ManualClock>,
    departures: Arc<dyn DepartureRepository>,
    waitlist_repo: Arc<dyn WaitlistRepository>,
    booking: Arc<BookingService>,
    waitlist: Arc<WaitlistService>,
    inventory: Arc<InventoryService>,
}

async fn harness() -> Harness {
    let pool = setup_pool().await;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let locks = Arc::new(DepartureLocks::new());
    let counters = Counters::default();

    let departures: Arc<dyn DepartureRepository> =
        Arc::new(SqlxDepartureRepository::new(pool.clone()));
    let booking_repo: Arc<dyn BookingRepository> =
        Arc::new(SqlxBookingRepository::new(pool.clone()));
    let waitlist_repo: Arc<dyn WaitlistRepository> =
        Arc::new(SqlxWaitlistRepository::new(pool.clone()));

    let booking = Arc::new(BookingService::new(
        Arc::clone(&booking_repo),
        Arc::clone(&locks),
        clock.clone() as Arc<dyn Clock>,
        counters.clone(),
    ));
    let waitlist = Arc::new(WaitlistService::new(
        Arc::clone(&waitlist_repo),
        Arc::clone(&departures),
        Arc::clone(&booking_repo),
        Arc::clone(&locks),
        clock.clone() as Arc<dyn Clock>,
        counters.clone(),
    ));
    let inventory = Arc::new(InventoryService::new(
        Arc::new(SqlxInventoryRepository::new(pool.clone())),
        Arc::clone(&locks),
        clock.clone() as Arc<dyn Clock>,
        counters,
    ));

    Harness {
        clock,
        departures,
        waitlist_repo,
        booking,
        waitlist,
        inventory,
    }
}

async fn seed_departure(h: &Harness, capacity: i32) -> Uuid {
    let now = h.clock.now();
    let tour = Tour::new("Night Kayak", format!("night-kayak-{}", Uuid::new_v4()), now);
    h.departures.insert_tour(&tour).await.unwrap();

    let departure = Departure::new(
        tour.id,
        now + chrono::Duration::days(7),
        capacity,
        Money {
            amount: 45_000,
            currency: "USD".to_string(),
        },
        now,
    );
    h.departures.insert(&departure).await.unwrap();
    departure.id
}

/// Joins customers in order, advancing the clock between joins so each
/// entry gets a distinct `created_at`.
async fn join_in_order(h: &Harness, departure_id: Uuid, customers: &[&str]) -> Vec<WaitlistEntry> {
    let mut entries = Vec::new();
    for customer in customers {
        entries.push(
            h.waitlist
                .join_waitlist(departure_id, customer)
                .await
                .unwrap(),
        );
        h.clock.advance(chrono::Duration::seconds(1));
    }
    entries
}

#[tokio::test]
async fn freed_capacity_promotes_the_longest_waiting_customers() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 0).await;

    join_in_order(&h, departure_id, &["w1", "w2", "w3"]).await;

    h.inventory
        .adjust(departure_id, 2, "released allotment", "ops")
        .await
        .unwrap();

    let outcome = h.waitlist.notify_waitlist(departure_id).await.unwrap();

    assert_eq!(outcome.processed_count, 2);
    assert_eq!(outcome.holds_created.len(), 2);

    // FIFO: w1 and w2 got the seats, in that order.
    assert_eq!(outcome.holds_created[0].customer_ref, "w1");
    assert_eq!(outcome.holds_created[1].customer_ref, "w2");

    for hold in &outcome.holds_created {
        assert_eq!(hold.seats, 1);
        assert_eq!(
            hold.expires_at - hold.created_at,
            chrono::Duration::seconds(300)
        );
        assert!(hold.idempotency_key.starts_with("waitlist-"));
    }

    // w3 keeps its place in the queue.
    let w3 = h
        .waitlist_repo
        .fetch_by_customer(&departure_id, "w3")
        .await
        .unwrap()
        .unwrap();
    assert!(w3.notified_at.is_none());

    // The promotion holds consumed the freed seats.
    let d = h
        .departures
        .fetch_by_id(&departure_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(d.capacity_available, 0);
}

#[tokio::test]
async fn promotion_is_fifo_across_repeated_passes() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 0).await;

    join_in_order(&h, departure_id, &["a", "b", "c", "d", "e"]).await;

    h.inventory
        .adjust(departure_id, 3, "released", "ops")
        .await
        .unwrap();
    let first = h.waitlist.notify_waitlist(departure_id).await.unwrap();
    let promoted: Vec<&str> = first
        .holds_created
        .iter()
        .map(|hold| hold.customer_ref.as_str())
        .collect();
    assert_eq!(promoted, vec!["a", "b", "c"]);

    // Another seat frees later: the next pass picks up exactly where the
    // queue left off.
    h.inventory
        .adjust(departure_id, 1, "no-show", "ops")
        .await
        .unwrap();
    let second = h.waitlist.notify_waitlist(departure_id).await.unwrap();
    assert_eq!(second.processed_count, 1);
    assert_eq!(second.holds_created[0].customer_ref, "d");
}

#[tokio::test]
async fn joining_twice_returns_the_original_entry() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 5).await;

    let first = h.waitlist.join_waitlist(departure_id, "carol").await.unwrap();
    h.clock.advance(chrono::Duration::seconds(30));
    let second = h.waitlist.join_waitlist(departure_id, "carol").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.created_at, second.created_at);
}

#[tokio::test]
async fn duplicate_insert_resolves_to_existing_row() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 5).await;

    let entry = WaitlistEntry::new(departure_id, "dave", h.clock.now());
    let first = h.waitlist_repo.insert_entry(&entry).await.unwrap();
    assert!(matches!(first, JoinOutcome::Created(_)));

    // A concurrent writer inserting the same (departure, customer) pair
    // lands on the unique constraint and gets the winner's row back.
    let duplicate = WaitlistEntry::new(departure_id, "dave", h.clock.now());
    match h.waitlist_repo.insert_entry(&duplicate).await.unwrap() {
        JoinOutcome::Existing(existing) => assert_eq!(existing.id, entry.id),
        other => panic!("expected existing row, got {other:?}"),
    }
}

#[tokio::test]
async fn join_requires_an_existing_departure() {
    let h = harness().await;
    seed_departure(&h, 5).await;

    let err = h
        .waitlist
        .join_waitlist(Uuid::new_v4(), "erin")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));
}

#[tokio::test]
async fn notify_with_no_capacity_or_no_queue_is_a_noop() {
    let h = harness().await;

    // Free seats but empty queue.
    let with_capacity = seed_departure(&h, 3).await;
    let outcome = h.waitlist.notify_waitlist(with_capacity).await.unwrap();
    assert_eq!(outcome.processed_count, 0);
    assert!(outcome.holds_created.is_empty());

    // Queue but no free seats.
    let full = seed_departure(&h, 0).await;
    join_in_order(&h, full, &["w1"]).await;
    let outcome = h.waitlist.notify_waitlist(full).await.unwrap();
    assert_eq!(outcome.processed_count, 0);
}

#[tokio::test]
async fn notified_entries_are_not_promoted_again() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 0).await;

    join_in_order(&h, departure_id, &["w1", "w2"]).await;

    h.inventory
        .adjust(departure_id, 1, "released", "ops")
        .await
        .unwrap();
    let first = h.waitlist.notify_waitlist(departure_id).await.unwrap();
    assert_eq!(first.holds_created[0].customer_ref, "w1");

    // w1's promotion hold expires unclaimed; the seat frees again.
    h.clock.advance(chrono::Duration::seconds(301));
    h.booking.expire_holds(100).await.unwrap();

    // w1 was already notified once, so the seat goes to w2.
    let second = h.waitlist.notify_waitlist(departure_id).await.unwrap();
    assert_eq!(second.processed_count, 1);
    assert_eq!(second.holds_created[0].customer_ref, "w2");
}

#[tokio::test]
async fn notify_unknown_departure_is_not_found() {
    let h = harness().await;
    seed_departure(&h, 3).await;

    let err = h
        .waitlist
        .notify_waitlist(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));
}

#[tokio::test]
async fn promoted_customer_can_confirm_their_hold() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 0).await;

    join_in_order(&h, departure_id, &["w1"]).await;
    h.inventory
        .adjust(departure_id, 1, "released", "ops")
        .await
        .unwrap();

    let outcome = h.waitlist.notify_waitlist(departure_id).await.unwrap();
    let hold = &outcome.holds_created[0];

    let booking = h.booking.confirm_booking(hold.id).await.unwrap();
    assert_eq!(booking.customer_ref, "w1");
    assert_eq!(booking.seats, 1);
}

#[tokio::test]
async fn promotion_worker_drains_eligible_departures() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 0).await;

    join_in_order(&h, departure_id, &["w1", "w2"]).await;
    h.inventory
        .adjust(departure_id, 2, "released", "ops")
        .await
        .unwrap();

    let worker = PromotionWorker::new(
        Arc::clone(&h.waitlist),
        Arc::clone(&h.waitlist_repo),
        Duration::from_millis(10),
        100,
    );

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(worker.run(stop_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop_tx.send(true).unwrap();
    handle.await.unwrap();

    let w1 = h
        .waitlist_repo
        .fetch_by_customer(&departure_id, "w1")
        .await
        .unwrap()
        .unwrap();
    let w2 = h
        .waitlist_repo
        .fetch_by_customer(&departure_id, "w2")
        .await
        .unwrap()
        .unwrap();
    assert!(w1.notified_at.is_some());
    assert!(w2.notified_at.is_some());

    let d = h
        .departures
        .fetch_by_id(&departure_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(d.capacity_available, 0);
}
