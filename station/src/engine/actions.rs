//! Actions driving the check-in engine.

use gatecheck_core::ticket::{Ticket, TicketId, Totals, WristbandId};
use gatecheck_sync::SyncReport;

/// A ticket resolved by a lookup, with its check-in history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// The authoritative row.
    pub ticket: Ticket,
    /// Check-ins recorded for the ticket's triple.
    pub checkins: u64,
    /// Most recent wristband for the triple, if any.
    pub current_wristband: Option<WristbandId>,
}

/// Actions for the check-in engine
#[derive(Clone, Debug)]
pub enum CheckInAction {
    // Operator input
    /// Text typed or scanned into the code field
    Submit {
        /// Raw input
        input: String,
    },

    /// Pick a row out of the search results
    SelectTicket {
        /// Row to check in
        ticket_id: TicketId,
    },

    /// Answer to "Ticket already used! Are you replacing a wristband?"
    AnswerDuplicate {
        /// `true` to issue a replacement wristband
        replace: bool,
    },

    /// Answer to the identity review
    AnswerReview {
        /// `true` once the operator has checked the attendee's ID
        accept: bool,
    },

    /// Wristband id typed at the wristband prompt
    EnterWristband {
        /// Raw input
        input: String,
    },

    /// Wristband prompt closed without an id
    AbandonWristband,

    /// Reload the admission counters
    RefreshTotals,

    // Effect feedback
    /// Search finished
    SearchCompleted {
        /// Authoritative rows matching the query
        results: Vec<Ticket>,
    },

    /// Code or id lookup finished
    TicketLoaded {
        /// `None` when nothing matched
        found: Option<Box<Resolution>>,
    },

    /// Wristband availability known
    WristbandChecked {
        /// Candidate wristband
        wristband: WristbandId,
        /// Already present in the check-in log
        taken: bool,
    },

    /// Check-in committed
    CheckInRecorded {
        /// Wristband issued
        wristband: WristbandId,
    },

    /// Store failure during the current operation
    OperationFailed {
        /// Operator-facing message
        message: String,
    },

    /// Counters reloaded
    TotalsLoaded {
        /// Fresh counters
        totals: Totals,
    },

    /// Operator-requested sync succeeded
    SyncCompleted {
        /// What the sync did
        report: SyncReport,
    },

    /// Operator-requested sync failed
    SyncFailed {
        /// Operator-facing message
        message: String,
    },
}
