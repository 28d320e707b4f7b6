use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
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
use backend::dispatch::dispatcher::Dispatcher;
use backend::dispatch::types::Method;
use backend::idempotency::repository_sqlx::SqlxIdempotencyRepository;
use backend::idempotency::service::IdempotencyService;
use backend::inventory::repository_sqlx::SqlxInventoryRepository;
use backend::inventory::service::InventoryService;
use backend::metrics::counters::Counters;
use backend::time::{Clock, ManualClock};
use backend::waitlist::repository_sqlx::SqlxWaitlistRepository;
use backend::waitlist::service::WaitlistService;

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
    pool: AnyPool,
    clock: Arc<ManualClock>,
    counters: Counters,
    departures: Arc<dyn DepartureRepository>,
    dispatcher: Dispatcher,
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

    let booking = Arc::new(BookingService::new(
        Arc::clone(&booking_repo),
        Arc::clone(&locks),
        clock.clone() as Arc<dyn Clock>,
        counters.clone(),
    ));
    let waitlist = Arc::new(WaitlistService::new(
        Arc::new(SqlxWaitlistRepository::new(pool.clone())),
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
        counters.clone(),
    ));
    let idempotency = Arc::new(IdempotencyService::new(
        Arc::new(SqlxIdempotencyRepository::new(pool.clone())),
        clock.clone() as Arc<dyn Clock>,
        Duration::from_secs(24 * 3600),
        counters.clone(),
    ));

    let dispatcher = Dispatcher::new(
        idempotency,
        booking,
        waitlist,
        inventory,
        Duration::from_secs(5),
    );

    Harness {
        pool,
        clock,
        counters,
        departures,
        dispatcher,
    }
}

async fn seed_departure(h: &Harness, capacity: i32) -> Uuid {
    let now = h.clock.now();
    let tour = Tour::new("Glacier Hike", format!("glacier-hike-{}", Uuid::new_v4()), now);
    h.departures.insert_tour(&tour).await.unwrap();

    let departure = Departure::new(
        tour.id,
        now + chrono::Duration::days(14),
        capacity,
        Money {
            amount: 79_900,
            currency: "USD".to_string(),
        },
        now,
    );
    h.departures.insert(&departure).await.unwrap();
    departure.id
}

async fn available(h: &Harness, departure_id: Uuid) -> i32 {
    h.departures
        .fetch_by_id(&departure_id)
        .await
        .unwrap()
        .unwrap()
        .capacity_available
}

fn hold_body(departure_id: Uuid, seats: i32) -> Value {
    json!({
        "departure_id": departure_id,
        "seats": seats,
        "customer_ref": "bob",
        "ttl_seconds": 600,
    })
}

#[tokio::test]
async fn replayed_hold_decrements_capacity_once() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 20).await;

    let body = hold_body(departure_id, 5);

    let first = h
        .dispatcher
        .execute(Method::BookingHold, Some("X"), body.clone())
        .await;
    assert_eq!(first.status, 200);

    let second = h
        .dispatcher
        .execute(Method::BookingHold, Some("X"), body)
        .await;
    assert_eq!(second.status, 200);
    assert_eq!(first.body, second.body);
    assert_eq!(first.body["id"], second.body["id"]);

    assert_eq!(available(&h, departure_id).await, 15);
    assert_eq!(h.counters.idempotent_replays.load(Ordering::Relaxed), 1);
    assert_eq!(h.counters.holds_created.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn domain_errors_are_replayed_verbatim() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 2).await;

    let body = hold_body(departure_id, 5);

    let first = h
        .dispatcher
        .execute(Method::BookingHold, Some("K"), body.clone())
        .await;
    assert_eq!(first.status, 409);
    assert_eq!(first.body["code"], "FULL");
    assert_eq!(first.body["retryable"], false);

    let second = h
        .dispatcher
        .execute(Method::BookingHold, Some("K"), body)
        .await;
    assert_eq!(second.status, 409);
    assert_eq!(first.body, second.body);

    // The replay came from the store, not a re-execution.
    assert_eq!(h.counters.idempotent_replays.load(Ordering::Relaxed), 1);
    assert_eq!(h.counters.holds_rejected_full.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn mismatched_body_is_rejected_without_mutation() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 20).await;

    let first = h
        .dispatcher
        .execute(Method::BookingHold, Some("X"), hold_body(departure_id, 5))
        .await;
    assert_eq!(first.status, 200);

    let second = h
        .dispatcher
        .execute(Method::BookingHold, Some("X"), hold_body(departure_id, 6))
        .await;
    assert_eq!(second.status, 422);
    assert_eq!(second.body["code"], "IDEMPOTENCY_KEY_MISMATCH");
    assert_eq!(second.body["retryable"], false);

    // Only the first hold exists; the mismatch did not execute.
    assert_eq!(available(&h, departure_id).await, 15);
    let holds: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM holds")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(holds, 1);
}

#[tokio::test]
async fn key_order_in_body_does_not_break_replay() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 20).await;

    let a: Value = serde_json::from_str(&format!(
        r#"{{"departure_id":"{departure_id}","seats":5,"customer_ref":"bob","ttl_seconds":600}}"#
    ))
    .unwrap();
    let b: Value = serde_json::from_str(&format!(
        r#"{{"ttl_seconds":600,"customer_ref":"bob","seats":5,"departure_id":"{departure_id}"}}"#
    ))
    .unwrap();

    let first = h.dispatcher.execute(Method::BookingHold, Some("X"), a).await;
    let second = h.dispatcher.execute(Method::BookingHold, Some("X"), b).await;

    assert_eq!(first.status, 200);
    assert_eq!(second.status, 200);
    assert_eq!(first.body["id"], second.body["id"]);
}

#[tokio::test]
async fn missing_or_oversized_key_is_rejected() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 20).await;

    let none = h
        .dispatcher
        .execute(Method::BookingHold, None, hold_body(departure_id, 1))
        .await;
    assert_eq!(none.status, 400);

    let oversized = "k".repeat(256);
    let too_long = h
        .dispatcher
        .execute(
            Method::BookingHold,
            Some(&oversized),
            hold_body(departure_id, 1),
        )
        .await;
    assert_eq!(too_long.status, 400);

    assert_eq!(available(&h, departure_id).await, 20);
}

#[tokio::test]
async fn validation_violations_are_reported_per_field() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 20).await;

    let resp = h
        .dispatcher
        .execute(
            Method::BookingHold,
            Some("V"),
            json!({
                "departure_id": departure_id,
                "seats": 0,
                "customer_ref": "bob",
                "ttl_seconds": 10,
            }),
        )
        .await;

    assert_eq!(resp.status, 422);
    let violations = resp.body["violations"].as_array().unwrap();
    let fields: Vec<&str> = violations
        .iter()
        .map(|v| v["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["seats", "ttl_seconds"]);
}

#[tokio::test]
async fn undecodable_body_is_a_400() {
    let h = harness().await;
    seed_departure(&h, 20).await;

    let resp = h
        .dispatcher
        .execute(
            Method::BookingHold,
            Some("B"),
            json!({
                "departure_id": "not-a-uuid",
                "seats": 1,
                "customer_ref": "bob",
                "ttl_seconds": 600,
            }),
        )
        .await;

    assert_eq!(resp.status, 400);
    assert_eq!(resp.body["title"], "Bad Request");
}

#[tokio::test]
async fn unknown_departure_is_a_cached_404() {
    let h = harness().await;
    seed_departure(&h, 20).await;

    let body = hold_body(Uuid::new_v4(), 1);

    let first = h
        .dispatcher
        .execute(Method::BookingHold, Some("N"), body.clone())
        .await;
    assert_eq!(first.status, 404);

    let second = h
        .dispatcher
        .execute(Method::BookingHold, Some("N"), body)
        .await;
    assert_eq!(second.status, 404);
    assert_eq!(first.body, second.body);
    assert_eq!(h.counters.idempotent_replays.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn full_lifecycle_through_the_dispatcher() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 10).await;

    let hold_resp = h
        .dispatcher
        .execute(Method::BookingHold, Some("h-1"), hold_body(departure_id, 2))
        .await;
    assert_eq!(hold_resp.status, 200);
    assert_eq!(hold_resp.body["status"], "ACTIVE");
    // ISO 8601 UTC with Z suffix.
    assert!(
        hold_resp.body["expires_at"]
            .as_str()
            .unwrap()
            .ends_with('Z')
    );

    let hold_id = hold_resp.body["id"].as_str().unwrap();

    let confirm_resp = h
        .dispatcher
        .execute(
            Method::BookingConfirm,
            Some("c-1"),
            json!({"hold_id": hold_id}),
        )
        .await;
    assert_eq!(confirm_resp.status, 200);
    assert_eq!(confirm_resp.body["status"], "CONFIRMED");
    let code = confirm_resp.body["code"].as_str().unwrap();
    assert_eq!(code.len(), 8);
    assert!(
        code.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    );

    let booking_id = confirm_resp.body["id"].as_str().unwrap();

    // Reads bypass idempotency entirely: no key required.
    let get_resp = h
        .dispatcher
        .execute(Method::BookingGet, None, json!({"booking_id": booking_id}))
        .await;
    assert_eq!(get_resp.status, 200);
    assert_eq!(get_resp.body["id"], booking_id);

    let cancel_resp = h
        .dispatcher
        .execute(
            Method::BookingCancel,
            Some("x-1"),
            json!({"booking_id": booking_id}),
        )
        .await;
    assert_eq!(cancel_resp.status, 200);
    assert_eq!(cancel_resp.body["status"], "CANCELED");

    assert_eq!(available(&h, departure_id).await, 10);
}

#[tokio::test]
async fn adjust_defaults_the_actor_and_records_audit_fields() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 10).await;

    let resp = h
        .dispatcher
        .execute(
            Method::InventoryAdjust,
            Some("adj-1"),
            json!({
                "departure_id": departure_id,
                "delta": 5,
                "reason": "larger bus assigned",
            }),
        )
        .await;

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body["actor"], "system");
    assert_eq!(resp.body["capacity_total_before"], 10);
    assert_eq!(resp.body["capacity_total_after"], 15);

    let zero = h
        .dispatcher
        .execute(
            Method::InventoryAdjust,
            Some("adj-2"),
            json!({
                "departure_id": departure_id,
                "delta": 0,
                "reason": "noop",
            }),
        )
        .await;
    assert_eq!(zero.status, 422);
}

#[tokio::test]
async fn replay_survives_clock_advance_within_ttl() {
    let h = harness().await;
    let departure_id = seed_departure(&h, 20).await;

    let body = hold_body(departure_id, 2);
    let first = h
        .dispatcher
        .execute(Method::BookingHold, Some("T"), body.clone())
        .await;
    assert_eq!(first.status, 200);

    h.clock.advance(chrono::Duration::hours(23));
    let replay = h
        .dispatcher
        .execute(Method::BookingHold, Some("T"), body.clone())
        .await;
    assert_eq!(replay.body["id"], first.body["id"]);

    // Past the TTL the key is forgotten and the call executes fresh.
    h.clock.advance(chrono::Duration::hours(2));
    let fresh = h
        .dispatcher
        .execute(Method::BookingHold, Some("T"), body)
        .await;
    assert_eq!(fresh.status, 200);
    assert_ne!(fresh.body["id"], first.body["id"]);
    assert_eq!(available(&h, departure_id).await, 16);
}
