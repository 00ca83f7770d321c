//! DNS-over-HTTPS JSON API client
//!
//! Speaks the `?name=..&type=..` JSON dialect served by dns.google and
//! compatible resolvers.

use crate::error::Result;
use blockcheck_core::{AddressSet, RecordKind, ResolveError};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status", default)]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    rr_type: u16,
    data: String,
}

/// Client for one DoH endpoint
pub struct DohClient {
    client: Client,
    endpoint: String,
}

impl DohClient {
    /// Create a client for `endpoint`
    pub fn new(endpoint: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Query `name` for `kind` records
    pub fn query(
        &self,
        name: &str,
        kind: RecordKind,
    ) -> std::result::Result<AddressSet, ResolveError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", name), ("type", kind.as_str())])
            .send()
            .map_err(|e| ResolveError::Api(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Api(format!("HTTP {}", status.as_u16())));
        }
        let body = response.text().map_err(|e| ResolveError::Api(e.to_string()))?;
        parse_answers(&body, kind)
    }
}

/// Addresses of the requested type in a DoH JSON answer
pub fn parse_answers(
    body: &str,
    kind: RecordKind,
) -> std::result::Result<AddressSet, ResolveError> {
    let parsed: DohResponse =
        serde_json::from_str(body).map_err(|e| ResolveError::Api(format!("invalid JSON: {e}")))?;
    if parsed.status != 0 {
        debug!(status = parsed.status, "DoH answer carries a DNS error code");
    }
    Ok(parsed
        .answer
        .into_iter()
        .filter(|a| a.rr_type == kind.rr_type())
        .filter_map(|a| a.data.parse::<IpAddr>().ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CNAME_CHAIN: &str = r#"{
        "Status": 0, "TC": false, "RD": true, "RA": true,
        "Question": [{"name": "www.example.org.", "type": 1}],
        "Answer": [
            {"name": "www.example.org.", "type": 5, "TTL": 300, "data": "example.org."},
            {"name": "example.org.", "type": 1, "TTL": 300, "data": "93.184.216.34"},
            {"name": "example.org.", "type": 1, "TTL": 300, "data": "93.184.216.35"}
        ]
    }"#;

    #[test]
    fn test_parse_skips_cname() {
        let addrs = parse_answers(CNAME_CHAIN, RecordKind::A).unwrap();
        let expected: AddressSet = ["93.184.216.34", "93.184.216.35"]
            .iter()
            .map(|a| a.parse::<IpAddr>().unwrap())
            .collect();
        assert_eq!(addrs, expected);
    }

    #[test]
    fn test_parse_filters_by_type() {
        let body = r#"{"Status": 0, "Answer": [
            {"name": "a.", "type": 1, "data": "1.2.3.4"},
            {"name": "a.", "type": 28, "data": "2001:db8::1"}
        ]}"#;
        let v6 = parse_answers(body, RecordKind::Aaaa).unwrap();
        assert_eq!(v6.len(), 1);
        assert!(v6.contains(&"2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_parse_nxdomain_is_empty() {
        let body = r#"{"Status": 3, "Question": [{"name": "gone.example.", "type": 1}]}"#;
        assert!(parse_answers(body, RecordKind::A).unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_api_error() {
        let err = parse_answers("<html>blocked</html>", RecordKind::A).unwrap_err();
        assert!(matches!(err, ResolveError::Api(_)));
    }
}
