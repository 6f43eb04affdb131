//! Application context: the dependencies the check-in engine runs against.

use crate::config::Config;
use gatecheck_core::environment::{Clock, SystemClock};
use gatecheck_core::store::{TicketStore, TicketStoreError};
use gatecheck_sqlite::SqliteTicketStore;
use gatecheck_sync::{HttpTransport, KeyMaterial, SyncClient, SyncError};
use std::sync::Arc;
use thiserror::Error;

/// Failures while wiring the station together at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The local store could not be opened or migrated.
    #[error("Failed to open ticket store: {0}")]
    Store(#[from] TicketStoreError),

    /// Sync settings were rejected (bad key, insecure endpoint, ...).
    #[error("Invalid sync setup: {0}")]
    Sync(#[from] SyncError),
}

/// Everything the engine needs from the outside world.
///
/// Handles are shared: the periodic refresher and the engine see the same
/// store and the same sync client.
#[derive(Clone)]
pub struct AppContext {
    /// Source of check-in timestamps.
    pub clock: Arc<dyn Clock>,
    /// Ticket catalog and check-in log.
    pub tickets: Arc<dyn TicketStore>,
    /// Sync client, when the station is configured for a remote authority.
    pub sync: Option<Arc<SyncClient>>,
}

impl AppContext {
    /// Assemble a context from ready-made parts.
    #[must_use]
    pub fn new(
        clock: impl Clock + 'static,
        tickets: Arc<dyn TicketStore>,
        sync: Option<Arc<SyncClient>>,
    ) -> Self {
        Self {
            clock: Arc::new(clock),
            tickets,
            sync,
        }
    }

    /// Open the store and build the sync client described by `config`.
    ///
    /// # Errors
    ///
    /// - [`StartupError::Store`]: the database cannot be opened or migrated
    /// - [`StartupError::Sync`]: keys do not decode or the endpoint is not `https://`
    pub async fn open(config: &Config) -> Result<Self, StartupError> {
        let store: Arc<dyn TicketStore> =
            Arc::new(SqliteTicketStore::connect(&config.database_url).await?);

        let sync = match &config.sync {
            None => {
                tracing::info!("no sync endpoint configured, running offline");
                None
            }
            Some(settings) => {
                let keys = KeyMaterial::from_base64(
                    &settings.client_secret_key,
                    &settings.server_public_key,
                )?;
                let transport = HttpTransport::new(&settings.url, settings.timeout)?;
                tracing::info!(endpoint = %settings.url, client_id = %settings.client_id, "sync enabled");
                Some(Arc::new(SyncClient::new(
                    settings.client_id.clone(),
                    &keys,
                    Arc::new(transport),
                    Arc::clone(&store),
                )))
            }
        };

        Ok(Self::new(SystemClock, store, sync))
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("sync", &self.sync.as_ref().map(|client| client.client_id()))
            .finish_non_exhaustive()
    }
}
