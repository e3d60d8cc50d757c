//! The I/O seam: something that turns an `HttpRequest` into an `HttpResponse`.
//!
//! `UreqTransport` is the production implementation. Tests substitute stubs
//! that count calls or replay canned responses.

use std::time::Duration;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};

/// Largest body the transport will buffer.
const BODY_LIMIT: u64 = 20 * 1024 * 1024;

/// Executes HTTP GET requests on behalf of the client.
///
/// Non-2xx answers are returned as data; only failures to obtain a response
/// at all are errors.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Blocking transport backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Build a transport; `timeout` bounds each whole request when set.
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = self.agent.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder.call().map_err(|e| {
            log::warn!("GET {} failed: {e}", request.url);
            ApiError::FetchFailed(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(BODY_LIMIT)
            .read_to_vec()
            .map_err(|e| ApiError::FetchFailed(e.to_string()))?;

        log::debug!("GET {} -> {status} ({} bytes)", request.url, body.len());
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
