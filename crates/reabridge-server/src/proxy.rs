//! Byte-for-byte relay of unmatched requests to REAPER.
//!
//! Method, path, query, headers and body go upstream to
//! `{base_url}{path}[?query]`; status, headers and body come back
//! unchanged, the body streamed. The whole exchange is bounded by a short
//! deadline so interactive clients fail fast when REAPER is down.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response, Uri};

use crate::error::HttpError;

/// Default deadline for one proxied exchange.
pub const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest request body relayed upstream.
const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// Relays requests to the upstream base URL.
#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl UpstreamProxy {
    /// Create a proxy towards `base_url` (e.g. `http://localhost:8088`).
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            timeout,
        }
    }

    /// The upstream URL a request for `uri` is relayed to.
    pub fn target_url(&self, uri: &Uri) -> String {
        let mut target = format!("{}{}", self.base_url, uri.path());
        if let Some(query) = uri.query() {
            target.push('?');
            target.push_str(query);
        }
        target
    }

    /// Relay `request` upstream and return the upstream's response.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, HttpError> {
        let (parts, body) = request.into_parts();
        let target = self.target_url(&parts.uri);

        let body = axum::body::to_bytes(body, MAX_REQUEST_BODY)
            .await
            .map_err(|e| HttpError::RequestBody(e.to_string()))?;

        let mut headers = parts.headers;
        headers.remove(header::HOST);

        let upstream = self
            .client
            .request(parts.method, &target)
            .headers(headers)
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HttpError::UpstreamTimeout
                } else {
                    HttpError::Upstream(e.to_string())
                }
            })?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(response_headers) = response.headers_mut() {
            for (name, value) in upstream.headers() {
                response_headers.append(name, value.clone());
            }
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| HttpError::UpstreamResponse(e.to_string()))
    }
}
