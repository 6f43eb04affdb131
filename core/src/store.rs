//! Ticket store trait and related types.
//!
//! The ticket store owns two collections: the ticket catalog and the
//! append-only check-in log. Every read and write the station performs goes
//! through [`TicketStore`].
//!
//! # Authoritative rows
//!
//! A remote re-issue (for example a transferred ticket) inserts a new row
//! carrying the same [`TicketCode`] triple with a higher id. Lookups by triple
//! therefore resolve to one *authoritative* row:
//!
//! 1. if any check-in exists for the triple, the row referenced by the
//!    **first** such check-in (when that row still exists);
//! 2. otherwise the row with the highest id.
//!
//! Once checked in, a ticket keeps its identity even if it is re-issued later.
//!
//! # Implementations
//!
//! - `SqliteTicketStore` (in `gatecheck-sqlite`): the station's local database
//! - `InMemoryTicketStore` (in `gatecheck-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! store can be shared as `Arc<dyn TicketStore>` and captured by effects.

use crate::code::TicketCode;
use crate::search::SearchQuery;
use crate::ticket::{NewCheckIn, Ticket, TicketId, Totals, WristbandId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`TicketStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TicketStoreError>> + Send + 'a>>;

/// Errors that can occur during ticket store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketStoreError {
    /// Database connection or query failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A remote record reuses a local id with different content.
    ///
    /// Treated as data corruption: the whole merge is rolled back and the
    /// mismatch has to be investigated by hand.
    #[error("Ticket id {id} already exists locally with different content")]
    DuplicateId {
        /// The colliding id.
        id: TicketId,
    },

    /// The wristband id is already present in the check-in log.
    #[error("Wristband ID \"{0}\" already entered")]
    WristbandTaken(WristbandId),

    /// A stored row could not be mapped back into the domain model.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Outcome of merging a batch of remote tickets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Rows that were new and got inserted.
    pub inserted: usize,
    /// Rows already present with identical content.
    pub unchanged: usize,
}

/// What an administrative flush removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushScope {
    /// The ticket catalog only.
    Tickets,
    /// The check-in log only.
    CheckIns,
    /// Both collections.
    All,
}

/// Storage for the ticket catalog and the check-in log.
///
/// # Write serialization
///
/// Implementations must serialize operations that open a write transaction
/// ([`record_checkin`](Self::record_checkin),
/// [`upsert_from_remote`](Self::upsert_from_remote), [`flush`](Self::flush)) so
/// a sync merge never interleaves with a check-in commit.
pub trait TicketStore: Send + Sync {
    /// Resolve a triple to its authoritative row.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    /// - `CorruptRow`: stored row could not be decoded
    fn find_by_triple(&self, code: TicketCode) -> StoreFuture<'_, Option<Ticket>>;

    /// Load a ticket row by its local id.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    /// - `CorruptRow`: stored row could not be decoded
    fn find_by_id(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>>;

    /// Case-insensitive substring search over buyer and waiver identity fields.
    ///
    /// Each triple with at least one matching row contributes exactly its
    /// authoritative row. Results are ordered by waiver last name, then first
    /// name.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    fn search(&self, query: SearchQuery) -> StoreFuture<'_, Vec<Ticket>>;

    /// Number of check-ins recorded for the triple of `ticket_id`.
    ///
    /// Counts across every row sharing the triple, so a re-issued ticket
    /// inherits its predecessor's history.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    fn checkin_count(&self, ticket_id: TicketId) -> StoreFuture<'_, u64>;

    /// Most recently issued wristband for the triple of `ticket_id`.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    fn latest_wristband(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<WristbandId>>;

    /// Whether `wristband` appears anywhere in the check-in log.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    fn wristband_exists(&self, wristband: WristbandId) -> StoreFuture<'_, bool>;

    /// Append one check-in.
    ///
    /// # Errors
    ///
    /// - `WristbandTaken`: storage-level uniqueness rejected the wristband
    /// - `Database`: write failed
    fn record_checkin(&self, checkin: NewCheckIn) -> StoreFuture<'_, ()>;

    /// Sold and used counters.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    fn totals(&self) -> StoreFuture<'_, Totals>;

    /// Sync cursor: the highest local ticket id, or 0 when empty.
    ///
    /// # Errors
    ///
    /// - `Database`: query failed
    fn cursor(&self) -> StoreFuture<'_, i64>;

    /// Insert remote tickets keyed by their remote id, atomically.
    ///
    /// Identical rows are skipped; a divergent row fails the whole batch.
    ///
    /// # Errors
    ///
    /// - `DuplicateId`: an id exists locally with different content
    /// - `Database`: write failed (nothing is applied)
    fn upsert_from_remote(&self, tickets: Vec<Ticket>) -> StoreFuture<'_, UpsertReport>;

    /// Administrative bulk delete. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// - `Database`: write failed
    fn flush(&self, scope: FlushScope) -> StoreFuture<'_, u64>;
}
