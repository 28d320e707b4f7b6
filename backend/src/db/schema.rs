use sqlx::AnyPool;

/// Creates the seven core tables in dependency order, plus indexes.
///
/// Statements are idempotent so the migration can run on every boot.
/// Timestamps are epoch-millisecond BIGINT columns; the Any driver has no
/// portable datetime codec.
pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Tours
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS tours (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  slug TEXT NOT NULL UNIQUE,
  description TEXT,
  created_ms BIGINT NOT NULL,
  updated_ms BIGINT NOT NULL,

  CHECK (length(slug) > 0)
);
"#,
    )
    .execute(pool)
    .await?;

    // Departures
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS departures (
  id TEXT PRIMARY KEY,
  tour_id TEXT NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
  starts_at_ms BIGINT NOT NULL,

  capacity_total INTEGER NOT NULL,
  capacity_available INTEGER NOT NULL,

  price_amount BIGINT NOT NULL,
  price_currency TEXT NOT NULL,

  created_ms BIGINT NOT NULL,
  updated_ms BIGINT NOT NULL,

  CHECK (capacity_total >= 0),
  CHECK (capacity_available >= 0),
  CHECK (capacity_available <= capacity_total),
  CHECK (price_amount >= 0),
  CHECK (length(price_currency) = 3)
);
"#,
    )
    .execute(pool)
    .await?;

    // Holds
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS holds (
  id TEXT PRIMARY KEY,
  departure_id TEXT NOT NULL REFERENCES departures(id) ON DELETE CASCADE,
  seats INTEGER NOT NULL,
  customer_ref TEXT NOT NULL,
  expires_at_ms BIGINT NOT NULL,
  status TEXT NOT NULL,
  idempotency_key TEXT NOT NULL,
  created_ms BIGINT NOT NULL,
  updated_ms BIGINT NOT NULL,

  CHECK (seats > 0),
  CHECK (seats <= 10),
  CHECK (length(customer_ref) > 0),
  CHECK (length(idempotency_key) > 0)
);
"#,
    )
    .execute(pool)
    .await?;

    // Bookings
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS bookings (
  id TEXT PRIMARY KEY,
  hold_id TEXT NOT NULL UNIQUE REFERENCES holds(id) ON DELETE CASCADE,
  departure_id TEXT NOT NULL REFERENCES departures(id) ON DELETE CASCADE,
  code TEXT NOT NULL UNIQUE,
  seats INTEGER NOT NULL,
  customer_ref TEXT NOT NULL,
  status TEXT NOT NULL,
  created_ms BIGINT NOT NULL,
  updated_ms BIGINT NOT NULL,

  CHECK (seats > 0),
  CHECK (length(customer_ref) > 0),
  CHECK (length(code) > 0)
);
"#,
    )
    .execute(pool)
    .await?;

    // Waitlist entries
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS waitlist_entries (
  id TEXT PRIMARY KEY,
  departure_id TEXT NOT NULL REFERENCES departures(id) ON DELETE CASCADE,
  customer_ref TEXT NOT NULL,
  notified_ms BIGINT,
  created_ms BIGINT NOT NULL,
  updated_ms BIGINT NOT NULL,

  CHECK (length(customer_ref) > 0),
  UNIQUE (departure_id, customer_ref)
);
"#,
    )
    .execute(pool)
    .await?;

    // Inventory adjustments (append-only audit log)
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS inventory_adjustments (
  id TEXT PRIMARY KEY,
  departure_id TEXT NOT NULL REFERENCES departures(id) ON DELETE CASCADE,
  delta INTEGER NOT NULL,
  reason TEXT NOT NULL,
  actor TEXT NOT NULL,
  capacity_total_before INTEGER NOT NULL,
  capacity_total_after INTEGER NOT NULL,
  capacity_available_before INTEGER NOT NULL,
  capacity_available_after INTEGER NOT NULL,
  created_ms BIGINT NOT NULL,

  CHECK (delta <> 0),
  CHECK (length(reason) > 0),
  CHECK (length(actor) > 0),
  CHECK (capacity_total_before >= 0),
  CHECK (capacity_total_after >= 0),
  CHECK (capacity_available_before >= 0),
  CHECK (capacity_available_after >= 0),
  CHECK (capacity_available_before <= capacity_total_before),
  CHECK (capacity_available_after <= capacity_total_after),
  CHECK (capacity_total_after = capacity_total_before + delta)
);
"#,
    )
    .execute(pool)
    .await?;

    // Idempotency records
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS idempotency_records (
  id TEXT PRIMARY KEY,
  idempotency_key TEXT NOT NULL,
  method TEXT NOT NULL,
  request_body_hash TEXT NOT NULL,
  response_status_code INTEGER NOT NULL,
  response_body TEXT NOT NULL,
  response_headers TEXT,
  expires_at_ms BIGINT NOT NULL,
  created_ms BIGINT NOT NULL,

  CHECK (length(idempotency_key) > 0),
  CHECK (length(method) > 0),
  CHECK (length(request_body_hash) = 64),
  CHECK (response_status_code >= 100),
  CHECK (response_status_code <= 599),
  UNIQUE (idempotency_key, method)
);
"#,
    )
    .execute(pool)
    .await?;

    for stmt in [
        "CREATE INDEX IF NOT EXISTS idx_departures_tour ON departures(tour_id);",
        "CREATE INDEX IF NOT EXISTS idx_departures_starts_at ON departures(starts_at_ms);",
        "CREATE INDEX IF NOT EXISTS idx_holds_departure ON holds(departure_id);",
        "CREATE INDEX IF NOT EXISTS idx_holds_status ON holds(status);",
        "CREATE INDEX IF NOT EXISTS idx_holds_expires_at ON holds(expires_at_ms);",
        "CREATE INDEX IF NOT EXISTS idx_holds_idempotency_key ON holds(idempotency_key);",
        "CREATE INDEX IF NOT EXISTS idx_holds_customer_ref ON holds(customer_ref);",
        "CREATE INDEX IF NOT EXISTS idx_bookings_departure ON bookings(departure_id);",
        "CREATE INDEX IF NOT EXISTS idx_bookings_customer_ref ON bookings(customer_ref);",
        "CREATE INDEX IF NOT EXISTS idx_waitlist_departure ON waitlist_entries(departure_id);",
        "CREATE INDEX IF NOT EXISTS idx_waitlist_created ON waitlist_entries(created_ms);",
        "CREATE INDEX IF NOT EXISTS idx_adjustments_departure ON inventory_adjustments(departure_id);",
        "CREATE INDEX IF NOT EXISTS idx_idempotency_expires_at ON idempotency_records(expires_at_ms);",
    ] {
        sqlx::query(stmt).execute(pool).await?;
    }

    Ok(())
}
