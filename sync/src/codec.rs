//! Wire codec for the sync exchange.
//!
//! Both directions use the same box: X25519 key agreement between the
//! station's static secret key and the authority's static public key, then
//! XSalsa20-Poly1305. A sealed message on the wire is
//!
//! ```text
//! base64( nonce[24] || ciphertext )
//! ```
//!
//! The keys never change between sessions, so there is no forward secrecy:
//! anyone who later obtains either secret key can open recorded traffic.
//! Moving to ephemeral keys needs a protocol version both ends agree on.

use crate::error::SyncError;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use crypto_box::aead::{Aead, AeadCore, Nonce, OsRng};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use gatecheck_core::code::TicketCode;
use gatecheck_core::ticket::Ticket;
use serde::Serialize;
use std::fmt;

/// Nonce length of `XSalsa20`.
const NONCE_LEN: usize = 24;

/// Static key pair halves a station needs.
#[derive(Clone)]
pub struct KeyMaterial {
    client_secret: SecretKey,
    server_public: PublicKey,
}

impl KeyMaterial {
    /// Wrap already parsed keys.
    #[must_use]
    pub const fn new(client_secret: SecretKey, server_public: PublicKey) -> Self {
        Self {
            client_secret,
            server_public,
        }
    }

    /// Parse both keys from base64 (32 raw bytes each).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidKey`] naming the key that is not valid base64
    /// or not 32 bytes long.
    pub fn from_base64(client_secret: &str, server_public: &str) -> Result<Self, SyncError> {
        let client_secret = SecretKey::from(key_bytes("client secret", client_secret)?);
        let server_public = PublicKey::from(key_bytes("server public", server_public)?);
        Ok(Self::new(client_secret, server_public))
    }

    /// The station's public key, as the authority must know it.
    #[must_use]
    pub fn client_public(&self) -> PublicKey {
        self.client_secret.public_key()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("client_secret", &"<redacted>")
            .field("server_public", &STANDARD.encode(self.server_public.as_bytes()))
            .finish()
    }
}

fn key_bytes(name: &'static str, encoded: &str) -> Result<[u8; 32], SyncError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SyncError::InvalidKey {
            name,
            reason: e.to_string(),
        })?;
    let len = bytes.len();
    <[u8; 32]>::try_from(bytes).map_err(|_| SyncError::InvalidKey {
        name,
        reason: format!("expected 32 bytes, got {len}"),
    })
}

/// Seals and opens sync messages for one station.
pub struct SealedBox {
    salsa: SalsaBox,
}

impl SealedBox {
    /// Derive the shared box from the station's keys.
    #[must_use]
    pub fn new(keys: &KeyMaterial) -> Self {
        Self {
            salsa: SalsaBox::new(&keys.server_public, &keys.client_secret),
        }
    }

    /// Encrypt under a fresh random nonce and encode for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Encoding`] if encryption fails.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, SyncError> {
        let nonce = SalsaBox::generate_nonce(&mut OsRng);
        let ciphertext = self
            .salsa
            .encrypt(&nonce, plaintext)
            .map_err(|_| SyncError::Encoding("encryption failed".to_string()))?;

        let mut wire = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        wire.extend_from_slice(&nonce);
        wire.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(wire))
    }

    /// Decode and decrypt a wire message. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Encoding`] if the body is not base64
    /// - [`SyncError::Decryption`] if it is too short or fails authentication
    pub fn open(&self, body: &str) -> Result<Vec<u8>, SyncError> {
        let wire = STANDARD
            .decode(body.trim())
            .map_err(|e| SyncError::Encoding(format!("response is not base64: {e}")))?;
        if wire.len() < NONCE_LEN {
            return Err(SyncError::Decryption);
        }

        let (nonce, ciphertext) = wire.split_at(NONCE_LEN);
        self.salsa
            .decrypt(Nonce::<SalsaBox>::from_slice(nonce), ciphertext)
            .map_err(|_| SyncError::Decryption)
    }
}

/// Plaintext request asking for tickets above `id`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpdateRequest {
    /// Always `"update"`.
    pub command: &'static str,
    /// Highest ticket id the station already has.
    pub id: i64,
}

impl UpdateRequest {
    /// Request everything newer than `cursor`.
    #[must_use]
    pub const fn after(cursor: i64) -> Self {
        Self {
            command: "update",
            id: cursor,
        }
    }
}

/// Parse a decrypted response into tickets.
///
/// `[]` and `null` both mean "up to date". Every ticket's triple must fit its
/// digit budget, otherwise the whole response is refused.
///
/// # Errors
///
/// Returns [`SyncError::Payload`] for malformed JSON or an out-of-range triple.
pub fn decode_tickets(plaintext: &[u8]) -> Result<Vec<Ticket>, SyncError> {
    let tickets: Option<Vec<Ticket>> =
        serde_json::from_slice(plaintext).map_err(|e| SyncError::Payload(e.to_string()))?;
    let tickets = tickets.unwrap_or_default();

    for ticket in &tickets {
        TicketCode::new(ticket.tier_code, ticket.ticket_number, ticket.ticket_code)
            .map_err(|e| SyncError::Payload(format!("ticket {}: {e}", ticket.id)))?;
    }
    Ok(tickets)
}
