//! Blocking network transport backed by `ureq`.
//!
//! Status codes are handed back as data so the gateways own their
//! interpretation. No timeout and no retry are configured here.

use tracing::debug;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};

#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    fn prepare<B>(builder: ureq::RequestBuilder<B>, req: &HttpRequest) -> ureq::RequestBuilder<B> {
        let mut builder = builder;
        for (key, value) in &req.query {
            builder = builder.query(key.as_str(), value.as_str());
        }
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, mut req: HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = req.method.as_str(), url = %req.path, "sending request");

        let body = req.body.take();
        let result = match (req.method, body) {
            (HttpMethod::Get, _) => Self::prepare(self.agent.get(&req.path), &req).call(),
            (HttpMethod::Delete, _) => Self::prepare(self.agent.delete(&req.path), &req).call(),
            (HttpMethod::Post, Some(body)) => {
                Self::prepare(self.agent.post(&req.path), &req).send(body.as_bytes())
            }
            (HttpMethod::Post, None) => Self::prepare(self.agent.post(&req.path), &req).send_empty(),
            (HttpMethod::Put, Some(body)) => {
                Self::prepare(self.agent.put(&req.path), &req).send(body.as_bytes())
            }
            (HttpMethod::Put, None) => Self::prepare(self.agent.put(&req.path), &req).send_empty(),
        };

        let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;
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
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        debug!(method = req.method.as_str(), url = %req.path, status, "received response");
        Ok(HttpResponse { status, headers, body })
    }
}
