//! # gatecheck testing
//!
//! Testing utilities and helpers for the gatecheck station.
//!
//! This crate provides:
//! - [`FixedClock`]: deterministic time for check-in timestamps
//! - [`ReducerTest`]: Given-When-Then assertions for reducers
//! - [`InMemoryTicketStore`]: a `TicketStore` without a database
//! - [`fixtures`]: ticket builders
//! - [`FakeAuthority`]: a wiremock responder that speaks the sync protocol
//!
//! ## Example
//!
//! ```ignore
//! use gatecheck_testing::{fixtures, test_clock, InMemoryTicketStore};
//!
//! #[tokio::test]
//! async fn accepts_known_ticket() {
//!     let tickets = InMemoryTicketStore::with_tickets([fixtures::ticket(1, "2003456789").build()]);
//!     let engine = CheckInEngine::new(AppContext::new(test_clock(), Arc::new(tickets), None));
//!
//!     let prompt = engine.submit("2003456789").await.unwrap();
//!     assert!(matches!(prompt, Prompt::Review(_)));
//! }
//! ```

use chrono::{DateTime, Utc};
use gatecheck_core::environment::Clock;

pub mod authority;
pub mod memory_store;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use gatecheck_testing::mocks::FixedClock;
    /// use gatecheck_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-06-21 18:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which never happens.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-06-21T18:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Ticket builders for tests
pub mod fixtures {
    use gatecheck_core::code::decode;
    use gatecheck_core::ticket::{Ticket, TicketId};

    /// Builder over a fully populated [`Ticket`].
    #[derive(Debug, Clone)]
    pub struct TicketBuilder {
        ticket: Ticket,
    }

    /// Start a ticket with `id` and the 10-digit `code`.
    ///
    /// Identity fields get stable placeholder values derived from the id.
    ///
    /// # Panics
    ///
    /// Panics if `code` is not a valid ticket code.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn ticket(id: i64, code: &str) -> TicketBuilder {
        let triple = decode(code).expect("fixture ticket code must be 10 digits");
        TicketBuilder {
            ticket: Ticket {
                id: TicketId(id),
                import_id: format!("imp-{id}"),
                tier_id: Some(i64::from(triple.tier_code)),
                tier_code: triple.tier_code,
                ticket_number: triple.ticket_number,
                ticket_code: triple.ticket_code,
                tier_label: format!("Tier {}", triple.tier_code),
                purchase_date: "2025-05-01 12:00:00".to_string(),
                purchase_email: format!("buyer{id}@example.com"),
                purchase_name: format!("Buyer {id}"),
                assigned_email: None,
                waiver_first_name: "Pat".to_string(),
                waiver_last_name: format!("Guest{id}"),
                waiver_state: "OR".to_string(),
                waiver_emergency: "Sam 555-0100".to_string(),
            },
        }
    }

    impl TicketBuilder {
        /// Set the waiver name.
        #[must_use]
        pub fn waiver(mut self, first: &str, last: &str) -> Self {
            self.ticket.waiver_first_name = first.to_string();
            self.ticket.waiver_last_name = last.to_string();
            self
        }

        /// Set buyer name and email.
        #[must_use]
        pub fn purchaser(mut self, name: &str, email: &str) -> Self {
            self.ticket.purchase_name = name.to_string();
            self.ticket.purchase_email = email.to_string();
            self
        }

        /// Set the attendee email of a transferred ticket.
        #[must_use]
        pub fn assigned_to(mut self, email: &str) -> Self {
            self.ticket.assigned_email = Some(email.to_string());
            self
        }

        /// Finish the ticket.
        #[must_use]
        pub fn build(self) -> Ticket {
            self.ticket
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use gatecheck_core::code::{MAX_CODE, MAX_NUMBER, MAX_TIER, TicketCode};
    use proptest::prelude::*;

    /// Any valid triple.
    pub fn ticket_code() -> impl Strategy<Value = TicketCode> {
        (0..=MAX_TIER, 0..=MAX_NUMBER, 0..=MAX_CODE).prop_map(
            |(tier_code, ticket_number, ticket_code)| TicketCode {
                tier_code,
                ticket_number,
                ticket_code,
            },
        )
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gatecheck=debug")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use authority::{AuthorityKeys, FakeAuthority};
pub use memory_store::InMemoryTicketStore;
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
