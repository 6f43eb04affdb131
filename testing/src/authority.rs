//! A fake ticket authority for wiremock.
//!
//! [`FakeAuthority`] plays the server side of the sync exchange for real: it
//! decrypts the station's request with the server secret key, reads the
//! cursor, and answers with the tickets above it, sealed for the station.
//! Mount it on a `MockServer` and point an insecure transport at it.
//!
//! ```ignore
//! let keys = AuthorityKeys::generate();
//! let authority = FakeAuthority::new(keys.clone()).with_tickets([fixtures::ticket(1, "2003456789").build()]);
//! Mock::given(method("POST")).respond_with(authority.clone()).mount(&server).await;
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use base64::{Engine as _, engine::general_purpose::STANDARD};
use crypto_box::aead::{Aead, AeadCore, Nonce, OsRng};
use crypto_box::{SalsaBox, SecretKey};
use gatecheck_core::ticket::Ticket;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::{Request, Respond, ResponseTemplate};

const NONCE_LEN: usize = 24;

/// Both static keypairs of a sync deployment.
#[derive(Clone)]
pub struct AuthorityKeys {
    /// The station's secret key.
    pub client_secret: SecretKey,
    /// The authority's secret key.
    pub server_secret: SecretKey,
}

impl AuthorityKeys {
    /// Fresh random keypairs.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            client_secret: SecretKey::generate(&mut OsRng),
            server_secret: SecretKey::generate(&mut OsRng),
        }
    }

    /// The station secret key as configured (`GATECHECK_CLIENT_SECRET_KEY`).
    #[must_use]
    pub fn client_secret_base64(&self) -> String {
        STANDARD.encode(self.client_secret.to_bytes())
    }

    /// The server public key as configured (`GATECHECK_SERVER_PUBLIC_KEY`).
    #[must_use]
    pub fn server_public_base64(&self) -> String {
        STANDARD.encode(self.server_secret.public_key().as_bytes())
    }

    fn server_box(&self) -> SalsaBox {
        SalsaBox::new(&self.client_secret.public_key(), &self.server_secret)
    }
}

/// A request the authority managed to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRequest {
    /// Plaintext `i` field.
    pub client_id: String,
    /// Decrypted `command` value.
    pub command: String,
    /// Decrypted cursor.
    pub cursor: i64,
}

#[derive(Deserialize)]
struct UpdateCommand {
    command: String,
    id: i64,
}

/// Server side of the sync protocol, as a wiremock responder.
///
/// Clones share the ticket catalog and the request log, so tests can add
/// tickets between syncs and inspect what was asked for.
#[derive(Clone)]
pub struct FakeAuthority {
    keys: AuthorityKeys,
    tickets: Arc<Mutex<Vec<Ticket>>>,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    null_when_empty: bool,
    delay: Option<Duration>,
    ignore_cursor: bool,
}

impl FakeAuthority {
    /// An authority with an empty catalog.
    #[must_use]
    pub fn new(keys: AuthorityKeys) -> Self {
        Self {
            keys,
            tickets: Arc::default(),
            received: Arc::default(),
            null_when_empty: false,
            delay: None,
            ignore_cursor: false,
        }
    }

    /// Seed the catalog.
    #[must_use]
    pub fn with_tickets(self, tickets: impl IntoIterator<Item = Ticket>) -> Self {
        self.publish(tickets);
        self
    }

    /// Answer `null` instead of `[]` when nothing is newer than the cursor.
    #[must_use]
    pub const fn null_when_empty(mut self) -> Self {
        self.null_when_empty = true;
        self
    }

    /// Hold every successful response for `delay`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return the whole catalog regardless of the cursor, like a replayed response.
    #[must_use]
    pub const fn ignoring_cursor(mut self) -> Self {
        self.ignore_cursor = true;
        self
    }

    /// Add tickets to the catalog.
    pub fn publish(&self, tickets: impl IntoIterator<Item = Ticket>) {
        self.tickets.lock().unwrap().extend(tickets);
    }

    /// Every request opened so far, oldest first.
    #[must_use]
    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }

    fn open(&self, request: &Request) -> Option<ReceivedRequest> {
        let mut client_id = None;
        let mut sealed = None;
        for (key, value) in url::form_urlencoded::parse(&request.body) {
            match key.as_ref() {
                "i" => client_id = Some(value.into_owned()),
                "r" => sealed = Some(value.into_owned()),
                _ => {}
            }
        }

        let bytes = STANDARD.decode(sealed?.trim()).ok()?;
        if bytes.len() < NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .keys
            .server_box()
            .decrypt(Nonce::<SalsaBox>::from_slice(nonce), ciphertext)
            .ok()?;
        let command: UpdateCommand = serde_json::from_slice(&plaintext).ok()?;

        Some(ReceivedRequest {
            client_id: client_id?,
            command: command.command,
            cursor: command.id,
        })
    }

}

impl Respond for FakeAuthority {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Some(received) = self.open(request) else {
            return ResponseTemplate::new(400);
        };
        if received.command != "update" {
            return ResponseTemplate::new(400);
        }

        let newer: Vec<Ticket> = self
            .tickets
            .lock()
            .unwrap()
            .iter()
            .filter(|t| self.ignore_cursor || t.id.0 > received.cursor)
            .cloned()
            .collect();
        self.received.lock().unwrap().push(received);

        let body = if newer.is_empty() && self.null_when_empty {
            serde_json::Value::Null
        } else {
            serde_json::to_value(&newer).unwrap()
        };

        let response =
            ResponseTemplate::new(200).set_body_string(seal_as_authority(&self.keys, body.to_string().as_bytes()));
        match self.delay {
            Some(delay) => response.set_delay(delay),
            None => response,
        }
    }
}

/// Seal a response body the way the authority does, for hand-written payloads.
#[must_use]
pub fn seal_as_authority(keys: &AuthorityKeys, plaintext: &[u8]) -> String {
    let nonce = SalsaBox::generate_nonce(&mut OsRng);
    let ciphertext = keys.server_box().encrypt(&nonce, plaintext).unwrap();
    let mut wire = nonce.to_vec();
    wire.extend_from_slice(&ciphertext);
    STANDARD.encode(wire)
}

/// Seal `plaintext` the way a station does, for tests that build requests by hand.
#[must_use]
pub fn seal_as_station(keys: &AuthorityKeys, plaintext: &[u8]) -> String {
    let sealer = SalsaBox::new(&keys.server_secret.public_key(), &keys.client_secret);
    let nonce = SalsaBox::generate_nonce(&mut OsRng);
    let ciphertext = sealer.encrypt(&nonce, plaintext).unwrap();
    let mut wire = nonce.to_vec();
    wire.extend_from_slice(&ciphertext);
    STANDARD.encode(wire)
}

/// The public half of a secret key, base64 encoded.
#[must_use]
pub fn public_base64(secret: &SecretKey) -> String {
    STANDARD.encode(secret.public_key().as_bytes())
}
