//! The sync client: cursor, sealed round trip, merge.

use crate::codec::{KeyMaterial, SealedBox, UpdateRequest, decode_tickets};
use crate::error::SyncError;
use crate::transport::SyncTransport;
use gatecheck_core::store::TicketStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// What one successful sync did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Cursor sent to the authority.
    pub cursor: i64,
    /// Tickets the authority returned.
    pub fetched: usize,
    /// Tickets that were new locally.
    pub inserted: usize,
    /// Tickets already present with identical content.
    pub unchanged: usize,
}

/// Clears the in-flight flag when a sync ends, including by cancellation.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Pulls new tickets from the authority into the local store.
///
/// # Example
///
/// ```ignore
/// let transport = HttpTransport::new("https://tickets.example/sync", Duration::from_secs(30))?;
/// let client = Arc::new(SyncClient::new("gate-a", &keys, Arc::new(transport), store));
///
/// let report = client.sync().await?;
/// let refresher = Arc::clone(&client).spawn_periodic(Duration::from_secs(300));
/// ```
pub struct SyncClient {
    client_id: String,
    sealer: SealedBox,
    transport: Arc<dyn SyncTransport>,
    store: Arc<dyn TicketStore>,
    in_flight: AtomicBool,
}

impl SyncClient {
    /// Create a client for station `client_id`.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        keys: &KeyMaterial,
        transport: Arc<dyn SyncTransport>,
        store: Arc<dyn TicketStore>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            sealer: SealedBox::new(keys),
            transport,
            store,
            in_flight: AtomicBool::new(false),
        }
    }

    /// The plaintext client id sent with every request.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Run one sync cycle.
    ///
    /// Calls made while another cycle is in flight are skipped, not queued.
    /// Nothing is retried here; the periodic refresher tries again on its
    /// next tick.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyRunning`]: another cycle is in flight
    /// - [`SyncError::Transport`] / [`SyncError::Status`]: the round trip failed; store untouched
    /// - [`SyncError::Encoding`] / [`SyncError::Decryption`] / [`SyncError::Payload`]: the
    ///   response was unusable; store untouched
    /// - [`SyncError::Merge`]: the store refused the batch; nothing applied
    #[tracing::instrument(skip(self), fields(client_id = %self.client_id))]
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            metrics::counter!("sync.skipped").increment(1);
            tracing::debug!("sync already in flight, skipping");
            return Err(SyncError::AlreadyRunning);
        };

        let result = self.pull().await;
        match &result {
            Ok(report) => {
                metrics::counter!("sync.completed").increment(1);
                #[allow(clippy::cast_precision_loss)] // Batch sizes are far below 2^52
                metrics::histogram!("sync.fetched").record(report.fetched as f64);
                tracing::info!(
                    cursor = report.cursor,
                    fetched = report.fetched,
                    inserted = report.inserted,
                    unchanged = report.unchanged,
                    "sync completed"
                );
            }
            Err(error) => {
                metrics::counter!("sync.failed", "kind" => error.kind()).increment(1);
                tracing::error!(%error, "sync failed");
            }
        }
        result
    }

    async fn pull(&self) -> Result<SyncReport, SyncError> {
        let cursor = self.store.cursor().await?;

        let request = serde_json::to_vec(&UpdateRequest::after(cursor))
            .map_err(|e| SyncError::Encoding(e.to_string()))?;
        let sealed = self.sealer.seal(&request)?;

        tracing::debug!(cursor, "requesting tickets");
        let body = self.transport.exchange(&self.client_id, sealed).await?;

        let tickets = decode_tickets(&self.sealer.open(&body)?)?;
        let fetched = tickets.len();
        let merged = self.store.upsert_from_remote(tickets).await?;

        Ok(SyncReport {
            cursor,
            fetched,
            inserted: merged.inserted,
            unchanged: merged.unchanged,
        })
    }

    /// Sync now and then every `period` on a background task.
    ///
    /// Ticks missed while a slow sync runs are dropped. Failures are logged and
    /// retried on the next tick. Abort the returned handle to stop.
    #[must_use]
    pub fn spawn_periodic(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        let period = period.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(period_secs = period.as_secs(), "periodic sync started");

            loop {
                ticker.tick().await;
                // Outcome already logged and counted by sync()
                let _ = self.sync().await;
            }
        })
    }
}
