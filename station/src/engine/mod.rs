//! The check-in engine.
//!
//! A reducer over [`CheckInState`] run by the runtime store. Operator prompts
//! are phases the reducer waits in; [`CheckInEngine`] turns each operator
//! answer into an action and hands back the next [`Prompt`].
//!
//! ```text
//! Idle ──code──▶ Resolving ──not found──▶ Idle (Rejected)
//!                   │
//!                   ├─used before──▶ ConfirmDuplicate ──no──▶ Idle (Rejected)
//!                   │                      │ yes
//!                   ▼                      ▼
//!              ConfirmReview ◀─────────────┘
//!                   │ accept            cancel ─▶ Idle (Cancelled, code kept)
//!                   ▼
//!          AwaitingWristband ◀──taken / invalid──┐
//!                   │ id                          │
//!                   ▼                             │
//!          CheckingWristband ─────────────────────┘
//!                   │ free
//!                   ▼
//!              Committing ──▶ Idle (Accepted)
//! ```
//!
//! `REFRESH` does not enter a phase: the sync runs as a background effect
//! and its result arrives on [`CheckInEngine::notices`] while check-ins go on.

mod actions;
mod facade;
mod reducer;
mod state;


pub use actions::{CheckInAction, Resolution};
pub use facade::{CheckInEngine, Notices, Prompt};
pub use reducer::{ACCEPTED, ALREADY_USED, CheckInReducer, NOT_FOUND, REFRESH_COMMAND};
pub use state::{CheckInState, Outcome, Phase, Review, StatusClass};
