//! Ticket and check-in records.

use crate::code::TicketCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Local surrogate key of a ticket row.
///
/// In the synced variant this is the remote authority's id, which is why it
/// doubles as the sync cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub i64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operator-entered id printed on a physical wristband.
///
/// Unique across the entire check-in log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WristbandId(pub i64);

impl fmt::Display for WristbandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One purchased admission unit, as delivered by the ticket authority.
///
/// Field names double as the sync wire format, so renaming a field is a
/// protocol change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Local key; the remote id in the synced variant.
    pub id: TicketId,
    /// The authority's own identifier for the record.
    pub import_id: String,
    /// Remote tier reference, when the authority sends one.
    #[serde(default)]
    pub tier_id: Option<i64>,
    /// Single-digit tier code.
    pub tier_code: u8,
    /// Ticket number within the tier.
    pub ticket_number: u32,
    /// Per-ticket check code.
    pub ticket_code: u16,
    /// Human-readable tier name.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tier_label: String,
    /// Purchase timestamp as sent by the authority.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub purchase_date: String,
    /// Buyer email.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub purchase_email: String,
    /// Buyer name.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub purchase_name: String,
    /// Attendee email for transferred tickets.
    #[serde(default)]
    pub assigned_email: Option<String>,
    /// Attendee first name from the signed waiver.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub waiver_first_name: String,
    /// Attendee last name from the signed waiver.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub waiver_last_name: String,
    /// Attendee state/province from the waiver.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub waiver_state: String,
    /// Emergency contact from the waiver.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub waiver_emergency: String,
}

/// Missing and `null` text fields both read as empty; unsigned waivers arrive as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Ticket {
    /// The triple this row presents to operators.
    #[must_use]
    pub const fn code(&self) -> TicketCode {
        TicketCode {
            tier_code: self.tier_code,
            ticket_number: self.ticket_number,
            ticket_code: self.ticket_code,
        }
    }

    /// Email shown to operators: the assigned email when present, else the buyer's.
    #[must_use]
    pub fn display_email(&self) -> &str {
        match self.assigned_email.as_deref() {
            Some(email) if !email.is_empty() => email,
            _ => &self.purchase_email,
        }
    }

    /// Waiver name as "Last, First".
    #[must_use]
    pub fn waiver_name(&self) -> String {
        format!("{}, {}", self.waiver_last_name, self.waiver_first_name)
    }

    /// One-line summary used in search result lists.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} - {} <{}>",
            self.code(),
            self.waiver_name(),
            self.display_email()
        )
    }
}

/// A check-in about to be appended to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckIn {
    /// Row that was checked in.
    pub ticket_id: TicketId,
    /// Wristband handed out.
    pub wristband: WristbandId,
    /// Denormalized triple, so history survives re-issues.
    pub code: TicketCode,
    /// Issuance time.
    pub date: DateTime<Utc>,
}

/// A recorded wristband issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIn {
    /// Insertion-order key.
    pub id: i64,
    /// Row that was checked in.
    pub ticket_id: TicketId,
    /// Issuance time.
    pub date: DateTime<Utc>,
    /// Wristband handed out.
    pub wristband: WristbandId,
    /// Denormalized triple.
    pub code: TicketCode,
}

/// Admission counters shown on the station.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    /// Distinct ticket triples in the catalog.
    pub sold: u64,
    /// Distinct ticket rows with at least one check-in.
    pub used: u64,
}
