//! Engine state, outcomes and the operator review payload.

use super::actions::Resolution;
use gatecheck_core::code::TicketCode;
use gatecheck_core::ticket::{Ticket, Totals, WristbandId};
use gatecheck_sync::SyncReport;
use std::fmt;

/// Where the engine is in a check-in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Phase {
    /// Waiting for a code, a search or a refresh
    #[default]
    Idle,
    /// Looking up the entered code or selected row
    Resolving,
    /// Ticket has check-ins; operator must confirm a replacement
    ConfirmDuplicate,
    /// Operator must compare the attendee's ID with the review payload
    ConfirmReview,
    /// Waiting for a wristband id
    AwaitingWristband,
    /// Checking the candidate wristband against the log
    CheckingWristband {
        /// Candidate
        wristband: WristbandId,
    },
    /// Writing the check-in
    Committing {
        /// Wristband being issued
        wristband: WristbandId,
    },
}

/// How the engine maps an outcome onto operator feedback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    /// Green light
    Accept,
    /// Red light, expected flow
    Reject,
    /// Something broke
    Error,
}

/// Result of the last finished operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Check-in committed
    Accepted(String),
    /// Ticket refused
    Rejected(String),
    /// Operator backed out at the review or wristband prompt
    Cancelled,
    /// Store failure
    Failed(String),
    /// Operator-requested sync is running in the background
    SyncStarted,
    /// Operator-requested sync succeeded
    Synced(SyncReport),
    /// Operator-requested sync failed
    SyncFailed(String),
}

impl Outcome {
    /// Feedback class for this outcome.
    #[must_use]
    pub const fn status(&self) -> StatusClass {
        match self {
            Self::Accepted(_) | Self::SyncStarted | Self::Synced(_) => StatusClass::Accept,
            Self::Rejected(_) | Self::Cancelled => StatusClass::Reject,
            Self::Failed(_) | Self::SyncFailed(_) => StatusClass::Error,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted(message) | Self::Rejected(message) | Self::Failed(message) => {
                f.write_str(message)
            }
            Self::Cancelled => f.write_str("Cancelled"),
            Self::SyncStarted => f.write_str("Sync started"),
            Self::Synced(report) => write!(
                f,
                "Sync complete: {} new, {} unchanged",
                report.inserted, report.unchanged
            ),
            Self::SyncFailed(message) => write!(f, "Sync failed: {message}"),
        }
    }
}

/// What the operator checks against the attendee's ID before a wristband is issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Review {
    /// Presented ticket code
    pub code: TicketCode,
    /// Most recent wristband, when the ticket was used before
    pub current_wristband: Option<WristbandId>,
    /// Wristbands issued so far
    pub checkins: u64,
    /// "Last, First"
    pub waiver_name: String,
    /// Waiver state
    pub waiver_state: String,
    /// Assigned email, else the buyer's
    pub email: String,
    /// Buyer name
    pub purchase_name: String,
    /// Buyer email
    pub purchase_email: String,
    /// Emergency contact from the waiver
    pub emergency_contact: String,
}

impl From<&Resolution> for Review {
    fn from(resolution: &Resolution) -> Self {
        let ticket = &resolution.ticket;
        Self {
            code: ticket.code(),
            current_wristband: resolution.current_wristband,
            checkins: resolution.checkins,
            waiver_name: ticket.waiver_name(),
            waiver_state: ticket.waiver_state.clone(),
            email: ticket.display_email().to_string(),
            purchase_name: ticket.purchase_name.clone(),
            purchase_email: ticket.purchase_email.clone(),
            emergency_contact: ticket.waiver_emergency.clone(),
        }
    }
}

impl fmt::Display for Review {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ticket#: {}", self.code)?;
        if let Some(wristband) = self.current_wristband.filter(|_| self.checkins > 0) {
            writeln!(f, "Current Wristband: {wristband}")?;
        }
        writeln!(f, "Wristbands Used: {}", self.checkins)?;
        writeln!(f)?;
        writeln!(f, "#### CHECK ID WITH INFORMATION BELOW ####")?;
        writeln!(f)?;
        writeln!(f, "Name: {}", self.waiver_name)?;
        writeln!(f, "State: {}", self.waiver_state)?;
        writeln!(f, "Email: {}", self.email)?;
        writeln!(f, "Emergency Contact: {}", self.emergency_contact)?;
        writeln!(f)?;
        writeln!(f, "#### CHECK ID WITH INFORMATION ABOVE ####")?;
        writeln!(f)?;
        writeln!(f, "Purchaser Name: {}", self.purchase_name)?;
        write!(f, "Purchaser Email: {}", self.purchase_email)
    }
}

/// State of the check-in engine
#[derive(Clone, Debug, Default)]
pub struct CheckInState {
    /// Current phase
    pub phase: Phase,
    /// Code field contents; kept when the operator cancels a review
    pub entered_code: String,
    /// Last search text
    pub search_filter: Option<String>,
    /// Last search results
    pub results: Vec<Ticket>,
    /// Ticket being checked in
    pub candidate: Option<Resolution>,
    /// Why the last wristband id was refused
    pub wristband_rejection: Option<String>,
    /// Admission counters
    pub totals: Totals,
    /// Result of the last finished operation
    pub outcome: Option<Outcome>,
    /// An operator-requested sync is in flight
    pub syncing: bool,
}

impl CheckInState {
    /// Review payload for the current candidate.
    #[must_use]
    pub fn review(&self) -> Option<Review> {
        self.candidate.as_ref().map(Review::from)
    }

    /// Back to idle with an empty code field and no search.
    pub(crate) fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.entered_code.clear();
        self.search_filter = None;
        self.results.clear();
        self.candidate = None;
        self.wristband_rejection = None;
    }

    /// Back to idle, leaving the code field as it is.
    pub(crate) fn stand_down(&mut self) {
        self.phase = Phase::Idle;
        self.candidate = None;
        self.wristband_rejection = None;
    }
}
