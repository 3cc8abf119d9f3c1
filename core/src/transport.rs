//! The HTTP capability `RestTool` executes requests on.
//!
//! # Design
//! `Transport` is the seam between request construction and I/O. The default
//! `UreqTransport` is a blocking `ureq` agent configured to return every
//! status as data and to never follow redirects: WebHDFS signals DataNode
//! targets through `307 Location`, and the client decides what to do with it.
//! Connection pooling, TLS and timeouts belong to the agent.

use std::io::Read;

use thiserror::Error;
use ureq::{Agent, RequestBuilder};

use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// A transport-level failure: no HTTP response was obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Executes one HTTP exchange.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a `ureq::Agent`.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Use a caller-configured agent. It must not follow redirects or treat
    /// HTTP statuses as errors for two-phase writes to work.
    pub fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, request: &HttpRequest) -> RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let result = match (request.method, &request.body) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(url), request).call(),
            (HttpMethod::Delete, _) => with_headers(self.agent.delete(url), request).call(),
            (HttpMethod::Post, Some(body)) => {
                with_headers(self.agent.post(url), request).send(body.as_slice())
            }
            (HttpMethod::Post, None) => with_headers(self.agent.post(url), request).send_empty(),
            (HttpMethod::Put, Some(body)) => {
                with_headers(self.agent.put(url), request).send(body.as_slice())
            }
            (HttpMethod::Put, None) => with_headers(self.agent.put(url), request).send_empty(),
        };
        let mut response = result.map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let mut body = Vec::new();
        response
            .body_mut()
            .as_reader()
            .read_to_end(&mut body)
            .map_err(|e| TransportError(format!("failed to read response body: {e}")))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
