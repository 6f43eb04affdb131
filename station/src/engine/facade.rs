//! Continuation-style API over the engine store.

use super::actions::CheckInAction;
use super::reducer::CheckInReducer;
use super::state::{CheckInState, Outcome, Phase, Review};
use crate::context::AppContext;
use gatecheck_core::ticket::{Ticket, TicketId, Totals};
use gatecheck_runtime::{Store, StoreError};
use tokio::sync::broadcast;

/// What the engine needs from the operator next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prompt {
    /// Ready for a code, a search or `REFRESH`.
    Ready {
        /// Result of the operation that just finished, if any
        outcome: Option<Outcome>,
        /// Text of the search that produced `results`, if one ran
        search: Option<String>,
        /// Current search results
        results: Vec<Ticket>,
        /// Admission counters
        totals: Totals,
    },

    /// "Ticket already used! Are you replacing a wristband?"
    ConfirmDuplicate(Review),

    /// Compare the attendee's ID with the payload, then accept or cancel.
    Review(Review),

    /// Enter a wristband id.
    Wristband {
        /// Why the previous id was refused
        rejection: Option<String>,
    },
}

impl Prompt {
    fn from_state(state: &CheckInState) -> Self {
        match (state.phase, state.review()) {
            (Phase::ConfirmDuplicate, Some(review)) => Self::ConfirmDuplicate(review),
            (Phase::ConfirmReview, Some(review)) => Self::Review(review),
            (Phase::AwaitingWristband, _) => Self::Wristband {
                rejection: state.wristband_rejection.clone(),
            },
            _ => Self::Ready {
                outcome: state.outcome.clone(),
                search: state.search_filter.clone(),
                results: state.results.clone(),
                totals: state.totals,
            },
        }
    }
}

type EngineStore = Store<CheckInState, CheckInAction, AppContext, CheckInReducer>;

/// Room for effect actions between two polls of [`Notices`].
const NOTICE_CAPACITY: usize = 64;

/// Outcomes of work that finished behind the operator's back.
///
/// Today that is the sync started by `REFRESH`.
#[derive(Debug)]
pub struct Notices {
    actions: broadcast::Receiver<CheckInAction>,
}

impl Notices {
    /// Wait for the next finished background operation.
    ///
    /// Returns `None` once the engine is gone. Cancel safe.
    pub async fn next(&mut self) -> Option<Outcome> {
        loop {
            match self.actions.recv().await {
                Ok(CheckInAction::SyncCompleted { report }) => return Some(Outcome::Synced(report)),
                Ok(CheckInAction::SyncFailed { message }) => {
                    return Some(Outcome::SyncFailed(message));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notice receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// The check-in engine.
///
/// Every call reduces one operator action, settles the effects it starts and
/// returns the next [`Prompt`]. Calls are serialized; a second caller waits
/// for the first chain to finish.
///
/// ```ignore
/// let engine = CheckInEngine::new(context);
/// match engine.submit("2003456789").await? {
///     Prompt::Review(review) => {
///         println!("{review}");
///         engine.resume_review(true).await?;
///         engine.resume_wristband("100").await?;
///     }
///     other => println!("{other:?}"),
/// }
/// ```
#[derive(Clone)]
pub struct CheckInEngine {
    store: EngineStore,
}

impl CheckInEngine {
    /// Create an idle engine over `context`.
    #[must_use]
    pub fn new(context: AppContext) -> Self {
        Self {
            store: Store::with_broadcast_capacity(
                CheckInState::default(),
                CheckInReducer::new(),
                context,
                NOTICE_CAPACITY,
            ),
        }
    }

    async fn dispatch(&self, action: CheckInAction) -> Result<Prompt, StoreError> {
        self.store.send(action).await?;
        Ok(self.prompt().await)
    }

    /// Submit the code field: a ticket code, a search text or `REFRESH`.
    ///
    /// `REFRESH` returns as soon as the sync has started; its result arrives
    /// on [`notices`](Self::notices).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn submit(&self, input: &str) -> Result<Prompt, StoreError> {
        self.dispatch(CheckInAction::Submit {
            input: input.to_string(),
        })
        .await
    }

    /// Check in a row picked from the search results.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn select(&self, ticket_id: TicketId) -> Result<Prompt, StoreError> {
        self.dispatch(CheckInAction::SelectTicket { ticket_id }).await
    }

    /// Answer the duplicate prompt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn resume_duplicate(&self, replace: bool) -> Result<Prompt, StoreError> {
        self.dispatch(CheckInAction::AnswerDuplicate { replace }).await
    }

    /// Answer the identity review.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn resume_review(&self, accept: bool) -> Result<Prompt, StoreError> {
        self.dispatch(CheckInAction::AnswerReview { accept }).await
    }

    /// Offer a wristband id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn resume_wristband(&self, input: &str) -> Result<Prompt, StoreError> {
        self.dispatch(CheckInAction::EnterWristband {
            input: input.to_string(),
        })
        .await
    }

    /// Close the wristband prompt without issuing one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn abandon(&self) -> Result<Prompt, StoreError> {
        self.dispatch(CheckInAction::AbandonWristband).await
    }

    /// Reload the admission counters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn refresh_totals(&self) -> Result<Prompt, StoreError> {
        self.dispatch(CheckInAction::RefreshTotals).await
    }

    /// Subscribe to background outcomes from now on.
    #[must_use]
    pub fn notices(&self) -> Notices {
        Notices {
            actions: self.store.subscribe_actions(),
        }
    }

    /// The prompt for the current state.
    pub async fn prompt(&self) -> Prompt {
        self.store.state(Prompt::from_state).await
    }

    /// A copy of the full engine state.
    pub async fn snapshot(&self) -> CheckInState {
        self.store.state(CheckInState::clone).await
    }

    /// Refuse further input and wait for the running chain.
    pub async fn shutdown(&self) {
        self.store.shutdown().await;
    }
}
