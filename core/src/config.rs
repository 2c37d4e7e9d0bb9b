//! Client configuration.
//!
//! The API base URL defaults to the relative `/api` path used by same-origin
//! deployments behind a reverse proxy. `OPSDASH_API_URL` overrides it at
//! build time (baked in through `option_env!`) and, through the CLI, at
//! deploy time. A relative base is resolved against `origin`.

use std::time::Duration;

pub const API_URL_ENV: &str = "OPSDASH_API_URL";
pub const ORIGIN_ENV: &str = "OPSDASH_ORIGIN";

pub const DEFAULT_BASE_URL: &str = match option_env!("OPSDASH_API_URL") {
    Some(url) => url,
    None => "/api",
};
pub const DEFAULT_ORIGIN: &str = "http://localhost:8000";

/// Interval between task status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Interval between health/metrics refreshes on a live dashboard.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub origin: String,
    pub poll_interval: Duration,
    pub max_poll_attempts: Option<u32>,
    pub refresh_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Absolute base URL: `base_url` itself when it carries a scheme,
    /// otherwise `base_url` joined onto `origin`.
    pub fn resolved_base_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.contains("://") {
            return base.to_string();
        }
        let origin = self.origin.trim_end_matches('/');
        if base.is_empty() {
            origin.to_string()
        } else if base.starts_with('/') {
            format!("{origin}{base}")
        } else {
            format!("{origin}/{base}")
        }
    }
}
