//! Fetching snapshots from the upstream control API.
//!
//! [`Upstream`] is the seam between the poll loop and the network. The
//! production implementation, [`HttpUpstream`], issues
//! `GET {base_url}/_/{keys}` against REAPER's web interface with a
//! per-request deadline and returns the body unparsed.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

/// Errors from a single upstream fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The request exceeded its deadline.
    #[error("upstream request timed out")]
    Timeout,

    /// The upstream could not be reached (connection refused, DNS, reset).
    #[error("upstream unreachable: {0}")]
    Transport(String),

    /// The upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// The response body could not be read to the end.
    #[error("failed to read upstream body: {0}")]
    Body(String),
}

impl FetchError {
    /// Expected outcomes that are neither logged as errors nor penalised.
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Whether the poller should back off before the next attempt.
    pub const fn wants_cooldown(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// A source of full snapshots.
pub trait Upstream: Send + Sync + 'static {
    /// Fetch the complete current state.
    fn fetch(&self) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

/// Polls REAPER's web interface over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpUpstream {
    /// Create a fetcher for `GET {base_url}/_/{keys}`.
    ///
    /// `keys` is the semicolon-joined command list, passed through as is.
    pub fn new(base_url: &str, keys: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: poll_url(base_url, keys),
            timeout,
        }
    }

    /// The URL fetched on every tick.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Upstream for HttpUpstream {
    async fn fetch(&self) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Body(e.to_string())
            }
        })
    }
}

/// Build the poll URL from the upstream base URL and the command list.
pub fn poll_url(base_url: &str, keys: &str) -> String {
    format!("{}/_/{keys}", base_url.trim_end_matches('/'))
}
