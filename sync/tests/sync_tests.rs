//! Sync protocol tests against a fake authority served by wiremock.

#![allow(clippy::unwrap_used)] // Test code

use gatecheck_core::store::{TicketStore, TicketStoreError};
use gatecheck_core::ticket::TicketId;
use gatecheck_sync::{HttpTransport, KeyMaterial, SyncClient, SyncError, SyncReport};
use gatecheck_testing::fixtures::ticket;
use gatecheck_testing::authority::seal_as_authority;
use gatecheck_testing::{AuthorityKeys, FakeAuthority, InMemoryTicketStore};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    server: MockServer,
    authority: FakeAuthority,
    store: InMemoryTicketStore,
    client: Arc<SyncClient>,
}

async fn harness(authority: FakeAuthority, keys: &AuthorityKeys, store: InMemoryTicketStore) -> Harness {
    gatecheck_testing::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(authority.clone())
        .mount(&server)
        .await;

    let client = station(&server, keys, store.clone());
    Harness {
        server,
        authority,
        store,
        client,
    }
}

fn station(server: &MockServer, keys: &AuthorityKeys, store: InMemoryTicketStore) -> Arc<SyncClient> {
    let material =
        KeyMaterial::from_base64(&keys.client_secret_base64(), &keys.server_public_base64()).unwrap();
    let transport =
        HttpTransport::insecure(&format!("{}/sync", server.uri()), Duration::from_secs(5)).unwrap();
    Arc::new(SyncClient::new(
        "gate-a",
        &material,
        Arc::new(transport),
        Arc::new(store),
    ))
}

#[tokio::test]
async fn first_sync_pulls_the_whole_catalog() {
    let keys = AuthorityKeys::generate();
    let authority = FakeAuthority::new(keys.clone()).with_tickets([
        ticket(1, "2003456789").build(),
        ticket(2, "1000010001").build(),
    ]);
    let h = harness(authority, &keys, InMemoryTicketStore::new()).await;

    let report = h.client.sync().await.unwrap();

    assert_eq!(
        report,
        SyncReport {
            cursor: 0,
            fetched: 2,
            inserted: 2,
            unchanged: 0
        }
    );
    assert_eq!(h.store.ticket_count(), 2);
    let received = h.authority.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].client_id, "gate-a");
    assert_eq!(received[0].command, "update");
}

#[tokio::test]
async fn second_sync_without_new_data_is_a_no_op() {
    let keys = AuthorityKeys::generate();
    let authority = FakeAuthority::new(keys.clone()).with_tickets([ticket(1, "2003456789").build()]);
    let h = harness(authority, &keys, InMemoryTicketStore::new()).await;

    h.client.sync().await.unwrap();
    let before = h.store.tickets();
    let report = h.client.sync().await.unwrap();

    assert_eq!(report.cursor, 1);
    assert_eq!(report.fetched, 0);
    assert_eq!(h.store.tickets(), before);
    let cursors: Vec<_> = h.authority.received().iter().map(|r| r.cursor).collect();
    assert_eq!(cursors, vec![0, 1]);
}

#[tokio::test]
async fn null_response_means_up_to_date() {
    let keys = AuthorityKeys::generate();
    let h = harness(
        FakeAuthority::new(keys.clone()).null_when_empty(),
        &keys,
        InMemoryTicketStore::new(),
    )
    .await;

    let report = h.client.sync().await.unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(h.store.ticket_count(), 0);
}

#[tokio::test]
async fn resumes_from_local_cursor() {
    let keys = AuthorityKeys::generate();
    let store = InMemoryTicketStore::with_tickets([ticket(1, "2003456789").build()]);
    let authority = FakeAuthority::new(keys.clone()).with_tickets([ticket(1, "2003456789").build()]);
    let h = harness(authority, &keys, store).await;

    h.authority.publish([ticket(7, "2003456789").build()]);
    let report = h.client.sync().await.unwrap();

    assert_eq!(report.cursor, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(h.store.cursor().await.unwrap(), 7);
    // The re-issue is now authoritative for the triple.
    let found = h.store.find_by_triple("2003456789".parse().unwrap()).await.unwrap();
    assert_eq!(found.unwrap().id, TicketId(7));
}

#[tokio::test]
async fn replayed_rows_are_skipped() {
    let keys = AuthorityKeys::generate();
    let catalog = [ticket(1, "2003456789").build(), ticket(2, "1000010001").build()];
    let store = InMemoryTicketStore::with_tickets(catalog.clone());
    let authority = FakeAuthority::new(keys.clone())
        .with_tickets(catalog)
        .ignoring_cursor();
    let h = harness(authority, &keys, store).await;

    let report = h.client.sync().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.inserted, 0);
}

#[tokio::test]
async fn divergent_remote_row_fails_without_applying() {
    let keys = AuthorityKeys::generate();
    let local = ticket(1, "2003456789").waiver("Ada", "Lovelace").build();
    let store = InMemoryTicketStore::with_tickets([local.clone()]);
    let authority = FakeAuthority::new(keys.clone())
        .with_tickets([
            ticket(1, "2003456789").waiver("Mallory", "Changed").build(),
            ticket(2, "1000010001").build(),
        ])
        .ignoring_cursor();
    let h = harness(authority, &keys, store).await;

    let err = h.client.sync().await.unwrap_err();

    assert_eq!(
        err,
        SyncError::Merge(TicketStoreError::DuplicateId { id: TicketId(1) })
    );
    assert_eq!(h.store.tickets(), vec![local]);
}

#[tokio::test]
async fn transport_failure_leaves_store_untouched() {
    let keys = AuthorityKeys::generate();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    let store = InMemoryTicketStore::with_tickets([ticket(1, "2003456789").build()]);
    let client = station(&server, &keys, store.clone());

    let err = client.sync().await.unwrap_err();

    assert_eq!(
        err,
        SyncError::Status {
            status: 503,
            body: "maintenance".to_string()
        }
    );
    assert_eq!(store.ticket_count(), 1);
}

#[tokio::test]
async fn unreachable_authority_is_a_transport_error() {
    let keys = AuthorityKeys::generate();
    let server = MockServer::start().await;
    let client = station(&server, &keys, InMemoryTicketStore::new());
    drop(server);

    assert!(matches!(client.sync().await, Err(SyncError::Transport(_))));
}

#[tokio::test]
async fn authority_without_station_key_refuses_request() {
    let keys = AuthorityKeys::generate();
    let other = AuthorityKeys::generate();
    let server = MockServer::start().await;
    // The authority knows a different station key, so it cannot open the
    // request and answers 400.
    Mock::given(method("POST"))
        .respond_with(FakeAuthority::new(other))
        .mount(&server)
        .await;
    let client = station(&server, &keys, InMemoryTicketStore::new());

    assert!(matches!(
        client.sync().await,
        Err(SyncError::Status { status: 400, .. })
    ));
}

#[tokio::test]
async fn undecryptable_body_is_refused() {
    let keys = AuthorityKeys::generate();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"))
        .mount(&server)
        .await;
    let store = InMemoryTicketStore::new();
    let client = station(&server, &keys, store.clone());

    assert_eq!(client.sync().await, Err(SyncError::Decryption));
    assert_eq!(store.ticket_count(), 0);
}

#[tokio::test]
async fn null_text_fields_are_merged_as_empty() {
    let keys = AuthorityKeys::generate();
    let payload = br#"[{"id":7,"import_id":"a7","tier_id":null,"tier_code":2,"ticket_number":345,
        "ticket_code":6789,"tier_label":"GA","purchase_date":null,"purchase_email":"buyer@example.com",
        "purchase_name":null,"assigned_email":null,"waiver_first_name":null,
        "waiver_last_name":null,"waiver_state":null,"waiver_emergency":null}]"#;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(seal_as_authority(&keys, payload)))
        .mount(&server)
        .await;
    let store = InMemoryTicketStore::new();
    let client = station(&server, &keys, store.clone());

    let report = client.sync().await.unwrap();

    assert_eq!(report.inserted, 1);
    let merged = store.find_by_id(TicketId(7)).await.unwrap().unwrap();
    assert_eq!(merged.waiver_first_name, "");
    assert_eq!(merged.purchase_email, "buyer@example.com");
    assert_eq!(store.cursor().await.unwrap(), 7);
}

#[tokio::test]
async fn request_is_form_encoded_and_opaque() {
    let keys = AuthorityKeys::generate();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("i=gate-a"))
        .and(body_string_contains("&r="))
        .respond_with(FakeAuthority::new(keys.clone()))
        .expect(1)
        .mount(&server)
        .await;
    let client = station(&server, &keys, InMemoryTicketStore::new());

    client.sync().await.unwrap();
    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(!body.contains("update"), "command must not travel in clear");
}

#[tokio::test]
async fn concurrent_sync_is_skipped_not_queued() {
    let keys = AuthorityKeys::generate();
    let authority = FakeAuthority::new(keys.clone())
        .with_tickets([ticket(1, "2003456789").build()])
        .with_delay(Duration::from_millis(300));
    let h = harness(authority, &keys, InMemoryTicketStore::new()).await;

    let (first, second) = tokio::join!(h.client.sync(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.client.sync().await
    });

    assert_eq!(first.unwrap().inserted, 1);
    assert_eq!(second, Err(SyncError::AlreadyRunning));
    assert_eq!(h.authority.received().len(), 1);

    // The flag is released once the first cycle ends.
    assert!(h.client.sync().await.is_ok());
}

#[tokio::test]
async fn periodic_refresher_keeps_pulling() {
    let keys = AuthorityKeys::generate();
    let authority = FakeAuthority::new(keys.clone());
    let h = harness(authority, &keys, InMemoryTicketStore::new()).await;

    let refresher = Arc::clone(&h.client).spawn_periodic(Duration::from_secs(1));
    tokio::time::sleep(Duration::from_millis(300)).await;
    h.authority.publish([ticket(3, "2003456789").build()]);
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    refresher.abort();

    assert!(h.authority.received().len() >= 2);
    assert_eq!(h.store.ticket_count(), 1);
    drop(h.server);
}

#[tokio::test]
async fn store_failure_surfaces_as_merge_error() {
    let keys = AuthorityKeys::generate();
    let store = InMemoryTicketStore::new();
    let h = harness(FakeAuthority::new(keys.clone()), &keys, store).await;
    h.store
        .set_failure(Some(TicketStoreError::Database("disk full".into())));

    assert!(matches!(h.client.sync().await, Err(SyncError::Merge(_))));
    assert!(h.authority.received().is_empty());
}
