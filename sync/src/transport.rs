//! HTTP transport for sealed sync messages.

use crate::error::SyncError;
use reqwest::{Client, Url};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by [`SyncTransport::exchange`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<String, SyncError>> + Send + 'a>>;

/// One request/response round trip with the ticket authority.
///
/// The transport only ever sees the plaintext client id and opaque sealed
/// text in both directions.
pub trait SyncTransport: Send + Sync {
    /// Post the sealed request and return the sealed response body.
    ///
    /// # Errors
    ///
    /// - `Transport`: the request never completed
    /// - `Status`: the authority answered with a non-success status
    fn exchange<'a>(&'a self, client_id: &'a str, sealed: String) -> TransportFuture<'a>;
}

/// Form-encoded HTTPS POST (`i` = client id, `r` = sealed request).
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Transport to an `https://` endpoint with verified TLS.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InsecureEndpoint`] if the URL is not `https://`
    /// - [`SyncError::Transport`] if the URL does not parse or the client cannot be built
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, SyncError> {
        let endpoint = parse_endpoint(endpoint)?;
        if endpoint.scheme() != "https" {
            return Err(SyncError::InsecureEndpoint(endpoint.to_string()));
        }
        let client = Client::builder()
            .https_only(true)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, endpoint })
    }

    /// Transport that also accepts plain `http://`.
    ///
    /// Meant for local tooling and tests against a mock authority only.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Transport`] if the URL does not parse or the client cannot be built.
    pub fn insecure(endpoint: &str, timeout: Duration) -> Result<Self, SyncError> {
        let endpoint = parse_endpoint(endpoint)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(format!("Failed to build HTTP client: {e}")))?;
        tracing::warn!(%endpoint, "sync transport created without https enforcement");
        Ok(Self { client, endpoint })
    }

    /// The endpoint requests are posted to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, SyncError> {
    Url::parse(endpoint).map_err(|e| SyncError::Transport(format!("Invalid endpoint {endpoint:?}: {e}")))
}

impl SyncTransport for HttpTransport {
    fn exchange<'a>(&'a self, client_id: &'a str, sealed: String) -> TransportFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.endpoint.clone())
                .form(&[("i", client_id), ("r", sealed.as_str())])
                .send()
                .await
                .map_err(|e| SyncError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SyncError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            response
                .text()
                .await
                .map_err(|e| SyncError::Transport(e.to_string()))
        })
    }
}
