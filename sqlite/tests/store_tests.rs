//! Integration tests for the SQLite ticket store.
//!
//! Every test runs against a private in-memory database, except the file
//! round trip at the end.

#![allow(clippy::unwrap_used)] // Test code

use chrono::{Duration, TimeZone, Utc};
use gatecheck_core::search::SearchQuery;
use gatecheck_core::store::{FlushScope, TicketStore, TicketStoreError, UpsertReport};
use gatecheck_core::ticket::{NewCheckIn, Ticket, TicketId, Totals, WristbandId};
use gatecheck_sqlite::SqliteTicketStore;
use gatecheck_testing::fixtures::ticket;
use gatecheck_testing::properties;
use proptest::prelude::*;

const CODE: &str = "2003456789";

async fn store_with(tickets: Vec<Ticket>) -> SqliteTicketStore {
    let store = SqliteTicketStore::in_memory().await.unwrap();
    store.upsert_from_remote(tickets).await.unwrap();
    store
}

fn checkin(t: &Ticket, wristband: i64, minute: i64) -> NewCheckIn {
    NewCheckIn {
        ticket_id: t.id,
        wristband: WristbandId(wristband),
        code: t.code(),
        date: Utc.with_ymd_and_hms(2025, 6, 21, 18, 0, 0).unwrap() + Duration::minutes(minute),
    }
}

#[tokio::test]
async fn empty_store_has_zero_cursor_and_totals() {
    let store = SqliteTicketStore::in_memory().await.unwrap();
    assert_eq!(store.cursor().await.unwrap(), 0);
    assert_eq!(store.totals().await.unwrap(), Totals::default());
    assert!(store.find_by_triple(CODE.parse().unwrap()).await.unwrap().is_none());
}

#[tokio::test]
async fn ticket_round_trips_through_storage() {
    let original = ticket(7, CODE)
        .waiver("Ada", "Lovelace")
        .assigned_to("ada@example.com")
        .build();
    let store = store_with(vec![original.clone()]).await;

    assert_eq!(store.find_by_id(TicketId(7)).await.unwrap(), Some(original));
    assert!(store.find_by_id(TicketId(8)).await.unwrap().is_none());
}

#[tokio::test]
async fn highest_id_wins_without_checkins() {
    let store = store_with(vec![ticket(5, CODE).build(), ticket(9, CODE).build()]).await;
    let found = store.find_by_triple(CODE.parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(found.id, TicketId(9));
}

#[tokio::test]
async fn checked_in_row_survives_reissue() {
    let first = ticket(5, CODE).build();
    let store = store_with(vec![first.clone()]).await;
    store.record_checkin(checkin(&first, 100, 0)).await.unwrap();

    store.upsert_from_remote(vec![ticket(9, CODE).build()]).await.unwrap();

    let found = store.find_by_triple(first.code()).await.unwrap().unwrap();
    assert_eq!(found.id, TicketId(5));

    // History follows the triple, not the row.
    assert_eq!(store.checkin_count(TicketId(9)).await.unwrap(), 1);
    assert_eq!(
        store.latest_wristband(TicketId(9)).await.unwrap(),
        Some(WristbandId(100))
    );
}

#[tokio::test]
async fn first_checkin_decides_even_after_later_checkins() {
    let old = ticket(5, CODE).build();
    let reissue = ticket(9, CODE).build();
    let store = store_with(vec![old.clone(), reissue.clone()]).await;

    store.record_checkin(checkin(&old, 100, 0)).await.unwrap();
    store.record_checkin(checkin(&reissue, 101, 5)).await.unwrap();

    let found = store.find_by_triple(old.code()).await.unwrap().unwrap();
    assert_eq!(found.id, TicketId(5));
    assert_eq!(store.checkin_count(TicketId(5)).await.unwrap(), 2);
}

#[tokio::test]
async fn latest_wristband_prefers_newest_date() {
    let t = ticket(1, CODE).build();
    let store = store_with(vec![t.clone()]).await;

    store.record_checkin(checkin(&t, 300, 10)).await.unwrap();
    store.record_checkin(checkin(&t, 200, 0)).await.unwrap();
    assert_eq!(
        store.latest_wristband(t.id).await.unwrap(),
        Some(WristbandId(300))
    );

    // Same timestamp: insertion order breaks the tie.
    store.record_checkin(checkin(&t, 400, 10)).await.unwrap();
    assert_eq!(
        store.latest_wristband(t.id).await.unwrap(),
        Some(WristbandId(400))
    );
}

#[tokio::test]
async fn unknown_ticket_has_no_history() {
    let store = SqliteTicketStore::in_memory().await.unwrap();
    assert_eq!(store.checkin_count(TicketId(42)).await.unwrap(), 0);
    assert!(store.latest_wristband(TicketId(42)).await.unwrap().is_none());
}

#[tokio::test]
async fn storage_rejects_duplicate_wristband() {
    let a = ticket(1, CODE).build();
    let b = ticket(2, "1000010001").build();
    let store = store_with(vec![a.clone(), b.clone()]).await;

    store.record_checkin(checkin(&a, 100, 0)).await.unwrap();
    assert!(store.wristband_exists(WristbandId(100)).await.unwrap());
    assert!(!store.wristband_exists(WristbandId(101)).await.unwrap());

    assert_eq!(
        store.record_checkin(checkin(&b, 100, 1)).await,
        Err(TicketStoreError::WristbandTaken(WristbandId(100)))
    );
    assert_eq!(store.checkin_count(b.id).await.unwrap(), 0);
}

#[tokio::test]
async fn totals_count_triples_and_checked_in_rows() {
    let a = ticket(1, CODE).build();
    let store = store_with(vec![
        a.clone(),
        ticket(2, CODE).build(),
        ticket(3, "1000010001").build(),
    ])
    .await;
    store.record_checkin(checkin(&a, 100, 0)).await.unwrap();
    store.record_checkin(checkin(&a, 101, 1)).await.unwrap();

    assert_eq!(store.totals().await.unwrap(), Totals { sold: 2, used: 1 });
}

#[tokio::test]
async fn merge_is_idempotent() {
    let batch = vec![ticket(1, CODE).build(), ticket(2, "1000010001").build()];
    let store = SqliteTicketStore::in_memory().await.unwrap();

    let first = store.upsert_from_remote(batch.clone()).await.unwrap();
    let second = store.upsert_from_remote(batch).await.unwrap();

    assert_eq!(first, UpsertReport { inserted: 2, unchanged: 0 });
    assert_eq!(second, UpsertReport { inserted: 0, unchanged: 2 });
    assert_eq!(store.cursor().await.unwrap(), 2);
}

#[tokio::test]
async fn divergent_merge_rolls_back_everything() {
    let store = store_with(vec![ticket(1, CODE).build()]).await;

    let result = store
        .upsert_from_remote(vec![
            ticket(2, "1000010001").build(),
            ticket(1, CODE).waiver("Someone", "Else").build(),
        ])
        .await;

    assert_eq!(result, Err(TicketStoreError::DuplicateId { id: TicketId(1) }));
    assert!(store.find_by_id(TicketId(2)).await.unwrap().is_none());
    assert_eq!(store.cursor().await.unwrap(), 1);
}

#[tokio::test]
async fn search_matches_identity_fields_case_insensitively() {
    let store = store_with(vec![
        ticket(1, CODE).waiver("Ada", "Lovelace").build(),
        ticket(2, "1000010001")
            .purchaser("Charles Babbage", "charles@engine.org")
            .build(),
        ticket(3, "1000020002").assigned_to("grace@navy.mil").build(),
    ])
    .await;

    let search = |q: &str| {
        let store = &store;
        let query = SearchQuery::parse(q).unwrap();
        async move {
            store
                .search(query)
                .await
                .unwrap()
                .into_iter()
                .map(|t| t.id.0)
                .collect::<Vec<_>>()
        }
    };

    assert_eq!(search("LOVELACE").await, vec![1]);
    assert_eq!(search("engine.org").await, vec![2]);
    assert_eq!(search("Babbage").await, vec![2]);
    assert_eq!(search("grace@").await, vec![3]);
    assert!(search("nobody").await.is_empty());
}

#[tokio::test]
async fn search_returns_authoritative_row_once_per_triple() {
    let checked_in = ticket(5, CODE).waiver("Ada", "Lovelace").build();
    let store = store_with(vec![
        checked_in.clone(),
        ticket(9, CODE).waiver("Ada", "Lovelace").build(),
        ticket(2, "1000010001").waiver("Ada", "Byron").build(),
    ])
    .await;
    store.record_checkin(checkin(&checked_in, 100, 0)).await.unwrap();

    let rows = store.search(SearchQuery::parse("ada").unwrap()).await.unwrap();
    let ids: Vec<_> = rows.iter().map(|t| t.id.0).collect();
    assert_eq!(ids, vec![2, 5]);
}

#[test]
fn pattern_characters_never_reach_the_store() {
    for input in ["a;b", "50%", "x' OR '1'='1", "a_b"] {
        assert!(SearchQuery::parse(input).is_none(), "{input}");
    }
}

#[tokio::test]
async fn flush_scopes() {
    let t = ticket(1, CODE).build();
    let store = store_with(vec![t.clone(), ticket(2, "1000010001").build()]).await;
    store.record_checkin(checkin(&t, 100, 0)).await.unwrap();

    assert_eq!(store.flush(FlushScope::CheckIns).await.unwrap(), 1);
    assert_eq!(store.totals().await.unwrap(), Totals { sold: 2, used: 0 });

    store.record_checkin(checkin(&t, 100, 1)).await.unwrap();
    assert_eq!(store.flush(FlushScope::Tickets).await.unwrap(), 2);
    assert_eq!(store.cursor().await.unwrap(), 0);
    assert!(store.wristband_exists(WristbandId(100)).await.unwrap());

    assert_eq!(store.flush(FlushScope::All).await.unwrap(), 1);
    assert!(!store.wristband_exists(WristbandId(100)).await.unwrap());
}

#[tokio::test]
async fn concurrent_writes_are_serialized() {
    let t = ticket(1, CODE).build();
    let store = std::sync::Arc::new(store_with(vec![t.clone()]).await);

    let writers: Vec<_> = (0..10)
        .map(|i| {
            let store = std::sync::Arc::clone(&store);
            let t = t.clone();
            tokio::spawn(async move { store.record_checkin(checkin(&t, 100 + i, i)).await })
        })
        .collect();
    let merge = {
        let store = std::sync::Arc::clone(&store);
        tokio::spawn(async move {
            store
                .upsert_from_remote(vec![ticket(2, "1000010001").build()])
                .await
        })
    };

    for writer in writers {
        writer.await.unwrap().unwrap();
    }
    merge.await.unwrap().unwrap();
    assert_eq!(store.checkin_count(t.id).await.unwrap(), 10);
    assert_eq!(store.cursor().await.unwrap(), 2);
}

#[tokio::test]
async fn file_database_persists_across_connections() {
    let path = std::env::temp_dir().join(format!(
        "gatecheck-test-{}-{}.db",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let url = format!("sqlite://{}", path.display());

    {
        let store = SqliteTicketStore::connect(&url).await.unwrap();
        store.upsert_from_remote(vec![ticket(3, CODE).build()]).await.unwrap();
        store.pool().close().await;
    }

    let reopened = SqliteTicketStore::connect(&url).await.unwrap();
    assert_eq!(reopened.cursor().await.unwrap(), 3);
    reopened.pool().close().await;
    let _ = std::fs::remove_file(&path);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn any_stored_triple_resolves(code in properties::ticket_code()) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let found = runtime.block_on(async {
            let store = store_with(vec![ticket(1, &code.to_string()).build()]).await;
            store.find_by_triple(code).await.unwrap()
        });
        prop_assert_eq!(found.map(|t| t.code()), Some(code));
    }
}
