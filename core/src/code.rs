//! The 10-digit ticket code printed on every ticket.
//!
//! A code is the concatenation of three fields with no separators:
//!
//! ```text
//!  2 00345 6789
//!  │ │     └── ticket code   (4 digits, zero padded)
//!  │ └──────── ticket number (5 digits, zero padded)
//!  └────────── tier code     (1 digit)
//! ```
//!
//! The same rendering is used everywhere a ticket is shown to an operator,
//! so [`TicketCode`]'s `Display` output always decodes back to itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of characters in an encoded ticket code.
pub const CODE_LEN: usize = 10;

/// Largest tier code that fits in one digit.
pub const MAX_TIER: u8 = 9;

/// Largest ticket number that fits in five digits.
pub const MAX_NUMBER: u32 = 99_999;

/// Largest per-ticket code that fits in four digits.
pub const MAX_CODE: u16 = 9_999;

/// Errors produced while encoding or decoding ticket codes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// Input is not exactly ten ASCII decimal digits.
    #[error("Invalid ticket code format: expected {CODE_LEN} digits")]
    InvalidFormat,

    /// A field does not fit in its fixed number of digits.
    #[error("Ticket {field} {value} is out of range (max {max})")]
    OutOfRange {
        /// Which field overflowed.
        field: &'static str,
        /// The rejected value.
        value: u32,
        /// Largest accepted value for the field.
        max: u32,
    },
}

/// The (tier, number, code) identity encoded in a ticket code.
///
/// Re-issued tickets share the same triple, so a `TicketCode` identifies a
/// family of ticket rows rather than a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketCode {
    /// Single-digit tier code.
    pub tier_code: u8,
    /// Ticket number within the tier.
    pub ticket_number: u32,
    /// Per-ticket check code.
    pub ticket_code: u16,
}

impl TicketCode {
    /// Build a triple, validating every field against its digit budget.
    ///
    /// # Errors
    ///
    /// Returns [`CodeError::OutOfRange`] naming the first field that does not fit.
    pub const fn new(tier_code: u8, ticket_number: u32, ticket_code: u16) -> Result<Self, CodeError> {
        if tier_code > MAX_TIER {
            return Err(CodeError::OutOfRange {
                field: "tier",
                value: tier_code as u32,
                max: MAX_TIER as u32,
            });
        }
        if ticket_number > MAX_NUMBER {
            return Err(CodeError::OutOfRange {
                field: "number",
                value: ticket_number,
                max: MAX_NUMBER,
            });
        }
        if ticket_code > MAX_CODE {
            return Err(CodeError::OutOfRange {
                field: "code",
                value: ticket_code as u32,
                max: MAX_CODE as u32,
            });
        }
        Ok(Self {
            tier_code,
            ticket_number,
            ticket_code,
        })
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:05}{:04}",
            self.tier_code, self.ticket_number, self.ticket_code
        )
    }
}

impl FromStr for TicketCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

/// Encode a triple into its canonical 10-digit form.
///
/// # Errors
///
/// Returns [`CodeError::OutOfRange`] if any field exceeds its digit budget.
pub fn encode(tier_code: u8, ticket_number: u32, ticket_code: u16) -> Result<String, CodeError> {
    TicketCode::new(tier_code, ticket_number, ticket_code).map(|code| code.to_string())
}

/// Decode a 10-digit ticket code.
///
/// The input must be exactly ten ASCII digits. Nothing is trimmed and
/// nothing is partially parsed.
///
/// # Errors
///
/// Returns [`CodeError::InvalidFormat`] for any other input.
pub fn decode(input: &str) -> Result<TicketCode, CodeError> {
    if !is_candidate_code(input) {
        return Err(CodeError::InvalidFormat);
    }

    // Every byte is an ASCII digit, so slicing on byte offsets is safe.
    let tier_code = parse_field(&input[..1])?;
    let ticket_number = parse_field(&input[1..6])?;
    let ticket_code = parse_field(&input[6..])?;

    Ok(TicketCode {
        tier_code,
        ticket_number,
        ticket_code,
    })
}

/// True iff `input` is exactly ten ASCII decimal digits.
///
/// The engine uses this to decide between a code lookup and a name search.
#[must_use]
pub fn is_candidate_code(input: &str) -> bool {
    input.len() == CODE_LEN && input.bytes().all(|b| b.is_ascii_digit())
}

fn parse_field<T: FromStr>(digits: &str) -> Result<T, CodeError> {
    digits.parse().map_err(|_| CodeError::InvalidFormat)
}
