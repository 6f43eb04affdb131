//! Check-in transitions.
//!
//! Everything touching the store or the network is returned as an effect;
//! the reducer itself only moves between phases.

use super::actions::{CheckInAction, Resolution};
use super::state::{CheckInState, Outcome, Phase};
use crate::context::AppContext;
use gatecheck_core::code::{TicketCode, decode, is_candidate_code};
use gatecheck_core::effect::Effect;
use gatecheck_core::reducer::{Effects, Reducer};
use gatecheck_core::search::SearchQuery;
use gatecheck_core::smallvec;
use gatecheck_core::store::{TicketStore, TicketStoreError};
use gatecheck_core::ticket::{NewCheckIn, Ticket, TicketId, WristbandId};
use gatecheck_sync::{SyncClient, SyncError};
use std::sync::Arc;

/// Literal that forces a sync from the code field.
pub const REFRESH_COMMAND: &str = "REFRESH";

/// Operator-facing rejection reasons.
pub const NOT_FOUND: &str = "Ticket not found";
/// See [`NOT_FOUND`].
pub const ALREADY_USED: &str = "Ticket already used";
/// Operator-facing success message.
pub const ACCEPTED: &str = "Ticket accepted";

const SYNC_BUSY: &str = "Sync already in progress";

/// Reducer for the check-in engine
#[derive(Clone, Debug, Default)]
pub struct CheckInReducer;

impl CheckInReducer {
    /// Creates a new `CheckInReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Terminal rejection: record it, reset and reload counters.
    fn reject(
        state: &mut CheckInState,
        reason: &'static str,
        label: &'static str,
        env: &AppContext,
    ) -> Effects<CheckInAction> {
        metrics::counter!("checkin.rejected", "reason" => label).increment(1);
        tracing::warn!(code = %state.entered_code, reason, "ticket rejected");
        state.outcome = Some(Outcome::Rejected(reason.to_string()));
        state.reset();
        smallvec![load_totals(env)]
    }

    fn fail(state: &mut CheckInState, message: String, env: &AppContext) -> Effects<CheckInAction> {
        tracing::error!(phase = ?state.phase, %message, "operation failed");
        state.outcome = Some(Outcome::Failed(message));
        state.reset();
        smallvec![load_totals(env)]
    }

    fn reprompt_wristband(state: &mut CheckInState, message: String) -> Effects<CheckInAction> {
        state.phase = Phase::AwaitingWristband;
        state.wristband_rejection = Some(message);
        smallvec![Effect::None]
    }

    fn submit(state: &mut CheckInState, input: String, env: &AppContext) -> Effects<CheckInAction> {
        state.outcome = None;

        if input == REFRESH_COMMAND {
            let Some(sync) = env.sync.clone() else {
                state.outcome = Some(Outcome::SyncFailed("Sync is not configured".to_string()));
                return smallvec![Effect::None];
            };
            if state.syncing {
                state.outcome = Some(Outcome::SyncFailed(SYNC_BUSY.to_string()));
                return smallvec![Effect::None];
            }
            state.syncing = true;
            state.outcome = Some(Outcome::SyncStarted);
            return smallvec![run_sync(sync)];
        }

        if !is_candidate_code(&input) {
            state.entered_code.clear();
            state.candidate = None;
            let Some(query) = SearchQuery::parse(&input) else {
                tracing::debug!(%input, "search refused by whitelist");
                state.search_filter = Some(input);
                state.results.clear();
                return smallvec![Effect::None];
            };
            state.search_filter = Some(input);
            return smallvec![search(env, query)];
        }

        let Ok(code) = decode(&input) else {
            state.entered_code.clear();
            return smallvec![Effect::None];
        };
        state.entered_code = input;
        state.phase = Phase::Resolving;
        smallvec![resolve_code(env, code)]
    }
}

impl Reducer for CheckInReducer {
    type State = CheckInState;
    type Action = CheckInAction;
    type Environment = AppContext;

    #[allow(clippy::too_many_lines)] // One arm per transition reads best in one place
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match action {
            // ========== Operator input ==========
            CheckInAction::Submit { input } if state.phase == Phase::Idle => {
                Self::submit(state, input, env)
            }

            CheckInAction::SelectTicket { ticket_id } if state.phase == Phase::Idle => {
                state.outcome = None;
                state.phase = Phase::Resolving;
                smallvec![resolve_id(env, ticket_id)]
            }

            CheckInAction::AnswerDuplicate { replace } if state.phase == Phase::ConfirmDuplicate => {
                if replace {
                    state.phase = Phase::ConfirmReview;
                    smallvec![Effect::None]
                } else {
                    Self::reject(state, ALREADY_USED, "already_used", env)
                }
            }

            CheckInAction::AnswerReview { accept } if state.phase == Phase::ConfirmReview => {
                if accept {
                    state.phase = Phase::AwaitingWristband;
                    state.wristband_rejection = None;
                } else {
                    state.outcome = Some(Outcome::Cancelled);
                    state.stand_down();
                }
                smallvec![Effect::None]
            }

            CheckInAction::EnterWristband { input } if state.phase == Phase::AwaitingWristband => {
                match parse_wristband(&input) {
                    Some(wristband) => {
                        state.phase = Phase::CheckingWristband { wristband };
                        state.wristband_rejection = None;
                        smallvec![check_wristband(env, wristband)]
                    }
                    None => Self::reprompt_wristband(
                        state,
                        format!("Wristband ID must be a number of at least 1, got {:?}", input.trim()),
                    ),
                }
            }

            CheckInAction::AbandonWristband if state.phase == Phase::AwaitingWristband => {
                state.outcome = Some(Outcome::Cancelled);
                state.stand_down();
                smallvec![Effect::None]
            }

            CheckInAction::RefreshTotals => smallvec![load_totals(env)],

            // ========== Effect feedback ==========
            CheckInAction::SearchCompleted { results } if state.phase == Phase::Idle => {
                tracing::debug!(count = results.len(), "search completed");
                state.results = results;
                smallvec![Effect::None]
            }

            CheckInAction::TicketLoaded { found } if state.phase == Phase::Resolving => {
                let Some(resolution) = found else {
                    return Self::reject(state, NOT_FOUND, "not_found", env);
                };
                let resolution = *resolution;
                // A row picked from the search list fills the code field
                state.entered_code = resolution.ticket.code().to_string();
                state.phase = if resolution.checkins > 0 {
                    Phase::ConfirmDuplicate
                } else {
                    Phase::ConfirmReview
                };
                tracing::info!(
                    ticket_id = %resolution.ticket.id,
                    checkins = resolution.checkins,
                    "ticket resolved"
                );
                state.candidate = Some(resolution);
                smallvec![Effect::None]
            }

            CheckInAction::WristbandChecked { wristband, taken }
                if matches!(
                    state.phase,
                    Phase::CheckingWristband { .. } | Phase::Committing { .. }
                ) =>
            {
                if taken {
                    metrics::counter!("checkin.wristband_collisions").increment(1);
                    tracing::warn!(%wristband, "wristband already entered");
                    return Self::reprompt_wristband(
                        state,
                        TicketStoreError::WristbandTaken(wristband).to_string(),
                    );
                }
                let Some(candidate) = &state.candidate else {
                    return Self::fail(state, "No ticket selected".to_string(), env);
                };
                state.phase = Phase::Committing { wristband };
                let checkin = NewCheckIn {
                    ticket_id: candidate.ticket.id,
                    wristband,
                    code: candidate.ticket.code(),
                    date: env.clock.now(),
                };
                smallvec![commit(env, checkin)]
            }

            CheckInAction::CheckInRecorded { wristband }
                if state.phase == (Phase::Committing { wristband }) =>
            {
                metrics::counter!("checkin.committed").increment(1);
                tracing::info!(code = %state.entered_code, %wristband, "check-in committed");
                state.outcome = Some(Outcome::Accepted(ACCEPTED.to_string()));
                state.reset();
                smallvec![load_totals(env)]
            }

            CheckInAction::OperationFailed { message } => Self::fail(state, message, env),

            CheckInAction::TotalsLoaded { totals } => {
                state.totals = totals;
                smallvec![Effect::None]
            }

            // Sync results land whatever the operator is doing; only an idle
            // station shows them as the current outcome.
            CheckInAction::SyncCompleted { report } => {
                tracing::info!(inserted = report.inserted, "operator sync completed");
                state.syncing = false;
                if state.phase == Phase::Idle {
                    state.outcome = Some(Outcome::Synced(report));
                }
                smallvec![load_totals(env)]
            }

            CheckInAction::SyncFailed { message } => {
                tracing::warn!(%message, "operator sync failed");
                state.syncing = false;
                if state.phase == Phase::Idle {
                    state.outcome = Some(Outcome::SyncFailed(message));
                }
                smallvec![Effect::None]
            }

            // ========== Out of phase ==========
            action => {
                tracing::warn!(phase = ?state.phase, ?action, "ignoring action");
                smallvec![Effect::None]
            }
        }
    }
}

// ============================================================================
// Effects
// ============================================================================

/// Trimmed positive integer, else `None`.
fn parse_wristband(input: &str) -> Option<WristbandId> {
    input
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id >= 1)
        .map(WristbandId)
}

fn failed(error: &TicketStoreError) -> CheckInAction {
    CheckInAction::OperationFailed {
        message: error.to_string(),
    }
}

/// Reload counters. Failures are logged only, so a broken store cannot loop
/// through reset and reload.
fn load_totals(env: &AppContext) -> Effect<CheckInAction> {
    let tickets = Arc::clone(&env.tickets);
    Effect::future(async move {
        match tickets.totals().await {
            Ok(totals) => Some(CheckInAction::TotalsLoaded { totals }),
            Err(error) => {
                tracing::error!(%error, "failed to load totals");
                None
            }
        }
    })
}

/// Pull from the authority without holding up operator input.
fn run_sync(sync: Arc<SyncClient>) -> Effect<CheckInAction> {
    Effect::background(async move {
        Some(match sync.sync().await {
            Ok(report) => CheckInAction::SyncCompleted { report },
            Err(SyncError::AlreadyRunning) => CheckInAction::SyncFailed {
                message: SYNC_BUSY.to_string(),
            },
            Err(error) => CheckInAction::SyncFailed {
                message: error.to_string(),
            },
        })
    })
}

fn search(env: &AppContext, query: SearchQuery) -> Effect<CheckInAction> {
    let tickets = Arc::clone(&env.tickets);
    Effect::future(async move {
        Some(match tickets.search(query).await {
            Ok(results) => CheckInAction::SearchCompleted { results },
            Err(error) => failed(&error),
        })
    })
}

fn resolve_code(env: &AppContext, code: TicketCode) -> Effect<CheckInAction> {
    let tickets = Arc::clone(&env.tickets);
    Effect::future(async move {
        let found = match tickets.find_by_triple(code).await {
            Ok(found) => found,
            Err(error) => return Some(failed(&error)),
        };
        Some(loaded(tickets.as_ref(), found).await)
    })
}

fn resolve_id(env: &AppContext, ticket_id: TicketId) -> Effect<CheckInAction> {
    let tickets = Arc::clone(&env.tickets);
    Effect::future(async move {
        let found = match tickets.find_by_id(ticket_id).await {
            Ok(found) => found,
            Err(error) => return Some(failed(&error)),
        };
        Some(loaded(tickets.as_ref(), found).await)
    })
}

/// Attach check-in history to a looked-up row.
async fn loaded(tickets: &dyn TicketStore, found: Option<Ticket>) -> CheckInAction {
    let Some(ticket) = found else {
        return CheckInAction::TicketLoaded { found: None };
    };
    let history = async {
        let checkins = tickets.checkin_count(ticket.id).await?;
        let current_wristband = tickets.latest_wristband(ticket.id).await?;
        Ok::<_, TicketStoreError>((checkins, current_wristband))
    };
    match history.await {
        Ok((checkins, current_wristband)) => CheckInAction::TicketLoaded {
            found: Some(Box::new(Resolution {
                ticket,
                checkins,
                current_wristband,
            })),
        },
        Err(error) => failed(&error),
    }
}

fn check_wristband(env: &AppContext, wristband: WristbandId) -> Effect<CheckInAction> {
    let tickets = Arc::clone(&env.tickets);
    Effect::future(async move {
        Some(match tickets.wristband_exists(wristband).await {
            Ok(taken) => CheckInAction::WristbandChecked { wristband, taken },
            Err(error) => failed(&error),
        })
    })
}

fn commit(env: &AppContext, checkin: NewCheckIn) -> Effect<CheckInAction> {
    let tickets = Arc::clone(&env.tickets);
    Effect::future(async move {
        let wristband = checkin.wristband;
        Some(match tickets.record_checkin(checkin).await {
            Ok(()) => CheckInAction::CheckInRecorded { wristband },
            // Lost a race with another writer: treat like the pre-check
            Err(TicketStoreError::WristbandTaken(wristband)) => CheckInAction::WristbandChecked {
                wristband,
                taken: true,
            },
            Err(error) => failed(&error),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wristband_input_must_be_positive_integer() {
        assert_eq!(parse_wristband(" 100 \n"), Some(WristbandId(100)));
        assert_eq!(parse_wristband("1"), Some(WristbandId(1)));
        assert_eq!(parse_wristband("0"), None);
        assert_eq!(parse_wristband("-4"), None);
        assert_eq!(parse_wristband("12a"), None);
        assert_eq!(parse_wristband(""), None);
    }
}
