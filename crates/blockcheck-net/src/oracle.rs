//! "Is it down for everyone" oracle over HTTP

use crate::error::{NetError, Result};
use blockcheck_core::config::OracleConfig;
use blockcheck_core::{Availability, AvailabilityOracle};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Availability oracle scraping a status page for up/down markers
pub struct IsupOracle {
    client: Client,
    url_format: String,
    up_marker: String,
    down_marker: String,
}

impl IsupOracle {
    /// Create an oracle from its configuration
    pub fn new(config: &OracleConfig, user_agent: &str, timeout: Duration) -> Result<Self> {
        if !config.url_format.contains("{}") {
            return Err(NetError::invalid_url(&config.url_format, "missing {} placeholder"));
        }
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url_format: config.url_format.clone(),
            up_marker: config.up_marker.clone(),
            down_marker: config.down_marker.clone(),
        })
    }

    /// Query URL asking about the host part of `page_url`
    pub fn query_url(&self, page_url: &str) -> Option<String> {
        let parsed = Url::parse(page_url).ok()?;
        let host = parsed.host_str()?;
        let netloc = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Some(self.url_format.replace("{}", &netloc))
    }

    /// Read the verdict out of a status page body
    pub fn classify(&self, body: &str) -> Availability {
        if body.contains(&self.up_marker) {
            Availability::Up
        } else if body.contains(&self.down_marker) {
            Availability::Down
        } else {
            Availability::Unknown
        }
    }
}

impl AvailabilityOracle for IsupOracle {
    fn is_up(&self, url: &str) -> Availability {
        if url.starts_with("https://") {
            return Availability::Up;
        }
        let Some(query) = self.query_url(url) else {
            debug!(url, "cannot build oracle query");
            return Availability::Unknown;
        };

        let response = match self.client.get(&query).send() {
            Ok(response) => response,
            Err(e) => {
                debug!(%query, error = %e, "oracle unreachable");
                return Availability::Unknown;
            }
        };
        if response.status() != StatusCode::OK {
            debug!(%query, status = response.status().as_u16(), "unexpected oracle status");
            return Availability::Unknown;
        }
        match response.text() {
            Ok(body) => self.classify(&body),
            Err(e) => {
                debug!(%query, error = %e, "oracle body unreadable");
                Availability::Unknown
            }
        }
    }
}
