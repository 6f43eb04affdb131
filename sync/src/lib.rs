//! # gatecheck sync
//!
//! Incremental, encrypted pull of the ticket catalog from the remote ticket
//! authority.
//!
//! One sync cycle:
//!
//! 1. cursor = highest local ticket id (0 when empty)
//! 2. seal `{"command":"update","id":cursor}` for the authority
//! 3. POST it as form fields `i` (client id) and `r` (sealed request)
//! 4. open the response: a JSON list of tickets, `[]`/`null` when up to date
//! 5. merge the tickets into the local store in one transaction
//!
//! The cursor is derived from the store each time, so a cycle interrupted at
//! any point resumes cleanly: identical rows are skipped by the merge, and a
//! divergent row fails the cycle loudly without applying anything.

pub mod client;
pub mod codec;
pub mod error;
pub mod transport;

pub use client::{SyncClient, SyncReport};
pub use codec::KeyMaterial;
pub use error::SyncError;
pub use transport::{HttpTransport, SyncTransport};
