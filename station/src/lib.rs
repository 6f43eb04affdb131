//! # gatecheck station
//!
//! The admission station: the check-in engine, its application context,
//! configuration and the operator console behind the `gatecheck` binary.
//!
//! ```text
//! console ──▶ CheckInEngine ──▶ TicketStore (SQLite)
//!    ▲             │                  ▲
//!    │             └── REFRESH ──▶ SyncClient ◀── periodic refresher
//!    └──── notices ◀── (background) ──┘
//! ```
//!
//! The engine and the refresher share one store handle; the store's write
//! gate keeps a check-in commit from interleaving with a sync merge.

pub mod config;
pub mod console;
pub mod context;
pub mod engine;

pub use config::{Config, ConfigError, SyncConfig};
pub use context::{AppContext, StartupError};
pub use engine::{CheckInEngine, Notices, Outcome, Prompt, Review, StatusClass};
