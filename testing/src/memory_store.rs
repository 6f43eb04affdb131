//! In-memory ticket store for fast, deterministic testing.
//!
//! [`InMemoryTicketStore`] implements the full [`TicketStore`] contract
//! (authoritative rows, triple-wide history, atomic merges, wristband
//! uniqueness) over plain collections, so engine tests never need a database.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use gatecheck_core::code::TicketCode;
use gatecheck_core::search::SearchQuery;
use gatecheck_core::store::{FlushScope, StoreFuture, TicketStore, TicketStoreError, UpsertReport};
use gatecheck_core::ticket::{CheckIn, NewCheckIn, Ticket, TicketId, Totals, WristbandId};
use std::collections::{BTreeMap, BTreeSet};
use std::future::ready;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Tables {
    tickets: BTreeMap<TicketId, Ticket>,
    checkins: Vec<CheckIn>,
    next_checkin_id: i64,
    failure: Option<TicketStoreError>,
}

impl Tables {
    fn rows_for(&self, code: TicketCode) -> impl Iterator<Item = &Ticket> {
        self.tickets.values().filter(move |t| t.code() == code)
    }

    fn checkins_for(&self, code: TicketCode) -> impl Iterator<Item = &CheckIn> {
        self.checkins.iter().filter(move |c| c.code == code)
    }

    fn authoritative(&self, code: TicketCode) -> Option<Ticket> {
        let first_checked_in = self
            .checkins_for(code)
            .min_by_key(|c| c.id)
            .and_then(|c| self.tickets.get(&c.ticket_id));

        first_checked_in
            .or_else(|| self.rows_for(code).max_by_key(|t| t.id))
            .cloned()
    }

    fn code_of(&self, id: TicketId) -> Option<TicketCode> {
        self.tickets.get(&id).map(Ticket::code)
    }

    fn check(&self) -> Result<(), TicketStoreError> {
        self.failure.clone().map_or(Ok(()), Err)
    }
}

/// In-memory [`TicketStore`].
///
/// Clones share the same tables, so a test can keep a handle for assertions
/// after giving one to the engine.
///
/// # Example
///
/// ```
/// use gatecheck_testing::{fixtures, InMemoryTicketStore};
///
/// let store = InMemoryTicketStore::with_tickets([fixtures::ticket(1, "2003456789").build()]);
/// assert_eq!(store.ticket_count(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryTicketStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryTicketStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `tickets`
    #[must_use]
    pub fn with_tickets(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.write().unwrap();
            for ticket in tickets {
                tables.tickets.insert(ticket.id, ticket);
            }
        }
        store
    }

    /// Make every subsequent operation fail with `error` (or succeed again with `None`)
    pub fn set_failure(&self, error: Option<TicketStoreError>) {
        self.tables.write().unwrap().failure = error;
    }

    /// Number of ticket rows
    #[must_use]
    pub fn ticket_count(&self) -> usize {
        self.tables.read().unwrap().tickets.len()
    }

    /// Snapshot of the check-in log in insertion order
    #[must_use]
    pub fn checkins(&self) -> Vec<CheckIn> {
        self.tables.read().unwrap().checkins.clone()
    }

    /// Snapshot of all ticket rows ordered by id
    #[must_use]
    pub fn tickets(&self) -> Vec<Ticket> {
        self.tables.read().unwrap().tickets.values().cloned().collect()
    }
}

impl TicketStore for InMemoryTicketStore {
    fn find_by_triple(&self, code: TicketCode) -> StoreFuture<'_, Option<Ticket>> {
        let tables = self.tables.read().unwrap();
        Box::pin(ready(tables.check().map(|()| tables.authoritative(code))))
    }

    fn find_by_id(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        let tables = self.tables.read().unwrap();
        Box::pin(ready(tables.check().map(|()| tables.tickets.get(&id).cloned())))
    }

    fn search(&self, query: SearchQuery) -> StoreFuture<'_, Vec<Ticket>> {
        let tables = self.tables.read().unwrap();
        let result = tables.check().map(|()| {
            let triples: BTreeSet<TicketCode> = tables
                .tickets
                .values()
                .filter(|t| {
                    [
                        t.purchase_email.as_str(),
                        t.purchase_name.as_str(),
                        t.assigned_email.as_deref().unwrap_or_default(),
                        t.waiver_first_name.as_str(),
                        t.waiver_last_name.as_str(),
                    ]
                    .into_iter()
                    .any(|field| query.matches(field))
                })
                .map(Ticket::code)
                .collect();

            let mut rows: Vec<Ticket> = triples
                .into_iter()
                .filter_map(|code| tables.authoritative(code))
                .collect();
            rows.sort_by(|a, b| {
                (&a.waiver_last_name, &a.waiver_first_name, a.id)
                    .cmp(&(&b.waiver_last_name, &b.waiver_first_name, b.id))
            });
            rows
        });
        Box::pin(ready(result))
    }

    fn checkin_count(&self, ticket_id: TicketId) -> StoreFuture<'_, u64> {
        let tables = self.tables.read().unwrap();
        let result = tables.check().map(|()| {
            tables
                .code_of(ticket_id)
                .map_or(0, |code| tables.checkins_for(code).count() as u64)
        });
        Box::pin(ready(result))
    }

    fn latest_wristband(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<WristbandId>> {
        let tables = self.tables.read().unwrap();
        let result = tables.check().map(|()| {
            tables.code_of(ticket_id).and_then(|code| {
                tables
                    .checkins_for(code)
                    .max_by_key(|c| (c.date, c.id))
                    .map(|c| c.wristband)
            })
        });
        Box::pin(ready(result))
    }

    fn wristband_exists(&self, wristband: WristbandId) -> StoreFuture<'_, bool> {
        let tables = self.tables.read().unwrap();
        let result = tables
            .check()
            .map(|()| tables.checkins.iter().any(|c| c.wristband == wristband));
        Box::pin(ready(result))
    }

    fn record_checkin(&self, checkin: NewCheckIn) -> StoreFuture<'_, ()> {
        let mut tables = self.tables.write().unwrap();
        let result = tables.check().and_then(|()| {
            if tables.checkins.iter().any(|c| c.wristband == checkin.wristband) {
                return Err(TicketStoreError::WristbandTaken(checkin.wristband));
            }
            tables.next_checkin_id += 1;
            let id = tables.next_checkin_id;
            tables.checkins.push(CheckIn {
                id,
                ticket_id: checkin.ticket_id,
                date: checkin.date,
                wristband: checkin.wristband,
                code: checkin.code,
            });
            Ok(())
        });
        Box::pin(ready(result))
    }

    fn totals(&self) -> StoreFuture<'_, Totals> {
        let tables = self.tables.read().unwrap();
        let result = tables.check().map(|()| Totals {
            sold: tables
                .tickets
                .values()
                .map(Ticket::code)
                .collect::<BTreeSet<_>>()
                .len() as u64,
            used: tables
                .checkins
                .iter()
                .map(|c| c.ticket_id)
                .collect::<BTreeSet<_>>()
                .len() as u64,
        });
        Box::pin(ready(result))
    }

    fn cursor(&self) -> StoreFuture<'_, i64> {
        let tables = self.tables.read().unwrap();
        let result = tables
            .check()
            .map(|()| tables.tickets.keys().next_back().map_or(0, |id| id.0));
        Box::pin(ready(result))
    }

    fn upsert_from_remote(&self, tickets: Vec<Ticket>) -> StoreFuture<'_, UpsertReport> {
        let mut tables = self.tables.write().unwrap();
        let result = tables.check().and_then(|()| {
            // Stage against a copy so a divergent row leaves nothing applied.
            let mut staged = tables.tickets.clone();
            let mut report = UpsertReport::default();
            for ticket in tickets {
                match staged.get(&ticket.id) {
                    Some(existing) if *existing == ticket => report.unchanged += 1,
                    Some(_) => return Err(TicketStoreError::DuplicateId { id: ticket.id }),
                    None => {
                        staged.insert(ticket.id, ticket);
                        report.inserted += 1;
                    }
                }
            }
            tables.tickets = staged;
            Ok(report)
        });
        Box::pin(ready(result))
    }

    fn flush(&self, scope: FlushScope) -> StoreFuture<'_, u64> {
        let mut tables = self.tables.write().unwrap();
        let result = tables.check().map(|()| {
            let mut removed = 0;
            if matches!(scope, FlushScope::Tickets | FlushScope::All) {
                removed += tables.tickets.len() as u64;
                tables.tickets.clear();
            }
            if matches!(scope, FlushScope::CheckIns | FlushScope::All) {
                removed += tables.checkins.len() as u64;
                tables.checkins.clear();
            }
            removed
        });
        Box::pin(ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fixtures::ticket, properties, test_clock};
    use gatecheck_core::environment::Clock;
    use proptest::prelude::*;

    const CODE: &str = "2003456789";

    fn checkin(t: &Ticket, wristband: i64) -> NewCheckIn {
        NewCheckIn {
            ticket_id: t.id,
            wristband: WristbandId(wristband),
            code: t.code(),
            date: test_clock().now(),
        }
    }

    #[tokio::test]
    async fn latest_reissue_wins_without_history() {
        let store = InMemoryTicketStore::with_tickets([ticket(5, CODE).build(), ticket(9, CODE).build()]);
        let found = store.find_by_triple(CODE.parse().unwrap()).await.unwrap();
        assert_eq!(found.unwrap().id, TicketId(9));
    }

    #[tokio::test]
    async fn checked_in_row_stays_authoritative_after_reissue() {
        let first = ticket(5, CODE).build();
        let store = InMemoryTicketStore::with_tickets([first.clone()]);
        store.record_checkin(checkin(&first, 100)).await.unwrap();

        store
            .upsert_from_remote(vec![ticket(9, CODE).build()])
            .await
            .unwrap();

        let found = store.find_by_triple(first.code()).await.unwrap().unwrap();
        assert_eq!(found.id, TicketId(5));
        assert_eq!(store.checkin_count(TicketId(9)).await.unwrap(), 1);
        assert_eq!(
            store.latest_wristband(TicketId(9)).await.unwrap(),
            Some(WristbandId(100))
        );
    }

    #[tokio::test]
    async fn duplicate_wristband_is_refused() {
        let t = ticket(1, CODE).build();
        let store = InMemoryTicketStore::with_tickets([t.clone()]);
        store.record_checkin(checkin(&t, 100)).await.unwrap();
        assert_eq!(
            store.record_checkin(checkin(&t, 100)).await,
            Err(TicketStoreError::WristbandTaken(WristbandId(100)))
        );
        assert_eq!(store.checkins().len(), 1);
    }

    #[tokio::test]
    async fn divergent_merge_applies_nothing() {
        let store = InMemoryTicketStore::with_tickets([ticket(1, CODE).build()]);
        let batch = vec![
            ticket(2, "1000010001").build(),
            ticket(1, CODE).waiver("Changed", "Name").build(),
        ];
        assert_eq!(
            store.upsert_from_remote(batch).await,
            Err(TicketStoreError::DuplicateId { id: TicketId(1) })
        );
        assert_eq!(store.ticket_count(), 1);
        assert_eq!(store.cursor().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_returns_one_row_per_triple() {
        let store = InMemoryTicketStore::with_tickets([
            ticket(1, CODE).waiver("Ada", "Lovelace").build(),
            ticket(4, CODE).waiver("Ada", "Lovelace").build(),
            ticket(2, "1000010001").waiver("Ada", "Byron").build(),
        ]);
        let rows = store.search(SearchQuery::parse("ada").unwrap()).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_everywhere() {
        let store = InMemoryTicketStore::new();
        store.set_failure(Some(TicketStoreError::Database("offline".into())));
        assert!(store.totals().await.is_err());
        assert!(store.cursor().await.is_err());
        store.set_failure(None);
        assert_eq!(store.totals().await.unwrap(), Totals::default());
    }

    proptest! {
        #[test]
        fn max_id_is_authoritative_without_checkins(code in properties::ticket_code(), ids in proptest::collection::btree_set(1i64..1_000, 1..6)) {
            let encoded = code.to_string();
            let store = InMemoryTicketStore::with_tickets(ids.iter().map(|id| ticket(*id, &encoded).build()));
            let tables = store.tables.read().unwrap();
            let found = tables.authoritative(code).unwrap();
            prop_assert_eq!(Some(&found.id.0), ids.iter().next_back());
        }
    }
}
