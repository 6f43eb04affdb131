//! SQLite ticket store for the gatecheck station.
//!
//! This crate provides [`SqliteTicketStore`], the station's local database. It
//! implements the `TicketStore` trait from `gatecheck-core` with runtime
//! checked, parameterized `sqlx` queries and embedded migrations.
//!
//! # Schema
//!
//! ```sql
//! tickets  (id PK, import_id, tier_id, tier_code, ticket_number, ticket_code, ...)
//! checkins (id PK AUTOINCREMENT, ticket_id, date, wristband UNIQUE,
//!           ticket_number, ticket_code, tier_code)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gatecheck_sqlite::SqliteTicketStore;
//!
//! let store = SqliteTicketStore::connect("sqlite://gatecheck.db").await?;
//! let totals = store.totals().await?;
//! ```

#![forbid(unsafe_code)]

use gatecheck_core::code::TicketCode;
use gatecheck_core::search::SearchQuery;
use gatecheck_core::store::{FlushScope, StoreFuture, TicketStore, TicketStoreError, UpsertReport};
use gatecheck_core::ticket::{NewCheckIn, Ticket, TicketId, Totals, WristbandId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tokio::sync::Mutex;

const TICKET_COLUMNS: &str = "id, import_id, tier_id, tier_code, ticket_number, ticket_code, \
    tier_label, purchase_date, purchase_email, purchase_name, assigned_email, \
    waiver_first_name, waiver_last_name, waiver_state, waiver_emergency";

/// Authoritative row for the triple bound to `?1, ?2, ?3`.
///
/// The row referenced by the triple's first check-in sorts first; without
/// one, the highest id wins.
const FIND_BY_TRIPLE: &str = "
    SELECT t.* FROM tickets t
    WHERE t.tier_code = ?1 AND t.ticket_number = ?2 AND t.ticket_code = ?3
    ORDER BY COALESCE(t.id = (
        SELECT c.ticket_id FROM checkins c
        WHERE c.tier_code = t.tier_code
          AND c.ticket_number = t.ticket_number
          AND c.ticket_code = t.ticket_code
        ORDER BY c.id
        LIMIT 1
    ), 0) DESC, t.id DESC
    LIMIT 1";

/// Authoritative row of every triple with a row matching the `LIKE` pattern `?1`.
const SEARCH: &str = "
    SELECT t.* FROM tickets t
    WHERE t.id IN (
        SELECT (
            SELECT a.id FROM tickets a
            WHERE a.tier_code = m.tier_code
              AND a.ticket_number = m.ticket_number
              AND a.ticket_code = m.ticket_code
            ORDER BY COALESCE(a.id = (
                SELECT c.ticket_id FROM checkins c
                WHERE c.tier_code = a.tier_code
                  AND c.ticket_number = a.ticket_number
                  AND c.ticket_code = a.ticket_code
                ORDER BY c.id
                LIMIT 1
            ), 0) DESC, a.id DESC
            LIMIT 1
        )
        FROM tickets m
        WHERE m.purchase_email LIKE ?1
           OR m.purchase_name LIKE ?1
           OR m.assigned_email LIKE ?1
           OR m.waiver_first_name LIKE ?1
           OR m.waiver_last_name LIKE ?1
    )
    ORDER BY t.waiver_last_name, t.waiver_first_name, t.id";

/// Check-ins sharing the triple of ticket `?1`.
const TRIPLE_CHECKINS: &str = "
    FROM checkins c
    JOIN tickets t
      ON c.tier_code = t.tier_code
     AND c.ticket_number = t.ticket_number
     AND c.ticket_code = t.ticket_code
    WHERE t.id = ?1";

/// Raw `tickets` row.
#[derive(Debug, sqlx::FromRow)]
struct TicketRow {
    id: i64,
    import_id: String,
    tier_id: Option<i64>,
    tier_code: i64,
    ticket_number: i64,
    ticket_code: i64,
    tier_label: String,
    purchase_date: String,
    purchase_email: String,
    purchase_name: String,
    assigned_email: Option<String>,
    waiver_first_name: String,
    waiver_last_name: String,
    waiver_state: String,
    waiver_emergency: String,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = TicketStoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str| {
            TicketStoreError::CorruptRow(format!("ticket {} has invalid {field}", row.id))
        };
        let tier_code = u8::try_from(row.tier_code).map_err(|_| corrupt("tier_code"))?;
        let ticket_number = u32::try_from(row.ticket_number).map_err(|_| corrupt("ticket_number"))?;
        let ticket_code = u16::try_from(row.ticket_code).map_err(|_| corrupt("ticket_code"))?;
        TicketCode::new(tier_code, ticket_number, ticket_code)
            .map_err(|e| TicketStoreError::CorruptRow(format!("ticket {}: {e}", row.id)))?;

        Ok(Self {
            id: TicketId(row.id),
            import_id: row.import_id,
            tier_id: row.tier_id,
            tier_code,
            ticket_number,
            ticket_code,
            tier_label: row.tier_label,
            purchase_date: row.purchase_date,
            purchase_email: row.purchase_email,
            purchase_name: row.purchase_name,
            assigned_email: row.assigned_email,
            waiver_first_name: row.waiver_first_name,
            waiver_last_name: row.waiver_last_name,
            waiver_state: row.waiver_state,
            waiver_emergency: row.waiver_emergency,
        })
    }
}

fn database(context: &str) -> impl Fn(sqlx::Error) -> TicketStoreError + '_ {
    move |e| TicketStoreError::Database(format!("{context}: {e}"))
}

/// SQLite-backed [`TicketStore`].
///
/// Reads go straight to the pool. Writes that open a transaction take the
/// store's write gate first, so a sync merge and a check-in commit never
/// interleave.
pub struct SqliteTicketStore {
    pool: SqlitePool,
    write_gate: Mutex<()>,
}

impl SqliteTicketStore {
    /// Wrap an existing pool. Migrations are not run.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_gate: Mutex::new(()),
        }
    }

    /// Open (creating if missing) the database at `database_url` and migrate it.
    ///
    /// # Errors
    ///
    /// Returns [`TicketStoreError::Database`] if the URL is invalid, the file
    /// cannot be opened, or a migration fails.
    pub async fn connect(database_url: &str) -> Result<Self, TicketStoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(database("Invalid database URL"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(database("Failed to connect"))?;

        let store = Self::new(pool);
        store.migrate().await?;
        tracing::info!(database_url, "ticket store opened");
        Ok(store)
    }

    /// A migrated private in-memory database.
    ///
    /// Uses a single connection that is never recycled, since every SQLite
    /// `:memory:` connection is its own database.
    ///
    /// # Errors
    ///
    /// Returns [`TicketStoreError::Database`] if the database cannot be created.
    pub async fn in_memory() -> Result<Self, TicketStoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(database("Failed to open in-memory database"))?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`TicketStoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), TicketStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| TicketStoreError::Database(format!("Migration failed: {e}")))
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_checkin(&self, checkin: NewCheckIn) -> Result<(), TicketStoreError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(database("Failed to begin"))?;

        sqlx::query(
            "INSERT INTO checkins (ticket_id, date, wristband, ticket_number, ticket_code, tier_code)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(checkin.ticket_id.0)
        .bind(checkin.date)
        .bind(checkin.wristband.0)
        .bind(i64::from(checkin.code.ticket_number))
        .bind(i64::from(checkin.code.ticket_code))
        .bind(i64::from(checkin.code.tier_code))
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                TicketStoreError::WristbandTaken(checkin.wristband)
            }
            other => TicketStoreError::Database(format!("Failed to record check-in: {other}")),
        })?;

        tx.commit().await.map_err(database("Failed to commit check-in"))?;
        tracing::debug!(ticket_id = %checkin.ticket_id, wristband = %checkin.wristband, "check-in stored");
        Ok(())
    }

    async fn merge(&self, tickets: Vec<Ticket>) -> Result<UpsertReport, TicketStoreError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(database("Failed to begin"))?;
        let mut report = UpsertReport::default();

        for ticket in tickets {
            let existing: Option<TicketRow> =
                sqlx::query_as(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?"))
                    .bind(ticket.id.0)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(database("Failed to load ticket"))?;

            if let Some(row) = existing {
                if Ticket::try_from(row)? == ticket {
                    report.unchanged += 1;
                    continue;
                }
                // Dropping the transaction rolls back the whole batch.
                tracing::warn!(id = %ticket.id, "remote ticket diverges from local row");
                return Err(TicketStoreError::DuplicateId { id: ticket.id });
            }

            sqlx::query(&format!(
                "INSERT INTO tickets ({TICKET_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(ticket.id.0)
            .bind(&ticket.import_id)
            .bind(ticket.tier_id)
            .bind(i64::from(ticket.tier_code))
            .bind(i64::from(ticket.ticket_number))
            .bind(i64::from(ticket.ticket_code))
            .bind(&ticket.tier_label)
            .bind(&ticket.purchase_date)
            .bind(&ticket.purchase_email)
            .bind(&ticket.purchase_name)
            .bind(&ticket.assigned_email)
            .bind(&ticket.waiver_first_name)
            .bind(&ticket.waiver_last_name)
            .bind(&ticket.waiver_state)
            .bind(&ticket.waiver_emergency)
            .execute(&mut *tx)
            .await
            .map_err(database("Failed to insert ticket"))?;
            report.inserted += 1;
        }

        tx.commit().await.map_err(database("Failed to commit merge"))?;
        tracing::debug!(inserted = report.inserted, unchanged = report.unchanged, "remote tickets merged");
        Ok(report)
    }

    async fn delete(&self, scope: FlushScope) -> Result<u64, TicketStoreError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(database("Failed to begin"))?;
        let mut removed = 0;

        if matches!(scope, FlushScope::Tickets | FlushScope::All) {
            removed += sqlx::query("DELETE FROM tickets")
                .execute(&mut *tx)
                .await
                .map_err(database("Failed to flush tickets"))?
                .rows_affected();
        }
        if matches!(scope, FlushScope::CheckIns | FlushScope::All) {
            removed += sqlx::query("DELETE FROM checkins")
                .execute(&mut *tx)
                .await
                .map_err(database("Failed to flush check-ins"))?
                .rows_affected();
        }

        tx.commit().await.map_err(database("Failed to commit flush"))?;
        tracing::warn!(?scope, removed, "store flushed");
        Ok(removed)
    }
}

impl TicketStore for SqliteTicketStore {
    fn find_by_triple(&self, code: TicketCode) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            let row: Option<TicketRow> = sqlx::query_as(FIND_BY_TRIPLE)
                .bind(i64::from(code.tier_code))
                .bind(i64::from(code.ticket_number))
                .bind(i64::from(code.ticket_code))
                .fetch_optional(&self.pool)
                .await
                .map_err(database("Failed to find ticket"))?;
            row.map(Ticket::try_from).transpose()
        })
    }

    fn find_by_id(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            let row: Option<TicketRow> =
                sqlx::query_as(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?"))
                    .bind(id.0)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(database("Failed to load ticket"))?;
            row.map(Ticket::try_from).transpose()
        })
    }

    fn search(&self, query: SearchQuery) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move {
            let rows: Vec<TicketRow> = sqlx::query_as(SEARCH)
                .bind(query.like_pattern())
                .fetch_all(&self.pool)
                .await
                .map_err(database("Failed to search tickets"))?;
            rows.into_iter().map(Ticket::try_from).collect()
        })
    }

    fn checkin_count(&self, ticket_id: TicketId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {TRIPLE_CHECKINS}"))
                .bind(ticket_id.0)
                .fetch_one(&self.pool)
                .await
                .map_err(database("Failed to count check-ins"))?;
            Ok(count.unsigned_abs())
        })
    }

    fn latest_wristband(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<WristbandId>> {
        Box::pin(async move {
            let wristband: Option<i64> = sqlx::query_scalar(&format!(
                "SELECT c.wristband {TRIPLE_CHECKINS} ORDER BY c.date DESC, c.id DESC LIMIT 1"
            ))
            .bind(ticket_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(database("Failed to load latest wristband"))?;
            Ok(wristband.map(WristbandId))
        })
    }

    fn wristband_exists(&self, wristband: WristbandId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let found: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM checkins WHERE wristband = ?)")
                    .bind(wristband.0)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(database("Failed to check wristband"))?;
            Ok(found != 0)
        })
    }

    fn record_checkin(&self, checkin: NewCheckIn) -> StoreFuture<'_, ()> {
        Box::pin(self.insert_checkin(checkin))
    }

    fn totals(&self) -> StoreFuture<'_, Totals> {
        Box::pin(async move {
            let (sold, used): (i64, i64) = sqlx::query_as(
                "SELECT
                    (SELECT COUNT(*) FROM (
                        SELECT DISTINCT tier_code, ticket_number, ticket_code FROM tickets
                    )),
                    (SELECT COUNT(DISTINCT ticket_id) FROM checkins)",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(database("Failed to load totals"))?;
            Ok(Totals {
                sold: sold.unsigned_abs(),
                used: used.unsigned_abs(),
            })
        })
    }

    fn cursor(&self) -> StoreFuture<'_, i64> {
        Box::pin(async move {
            sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM tickets")
                .fetch_one(&self.pool)
                .await
                .map_err(database("Failed to load cursor"))
        })
    }

    fn upsert_from_remote(&self, tickets: Vec<Ticket>) -> StoreFuture<'_, UpsertReport> {
        Box::pin(self.merge(tickets))
    }

    fn flush(&self, scope: FlushScope) -> StoreFuture<'_, u64> {
        Box::pin(self.delete(scope))
    }
}
