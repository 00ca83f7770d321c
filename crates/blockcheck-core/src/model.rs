//! Reference data and probe results
//!
//! Everything here is created fresh for a run and thrown away afterwards.
//! Reference targets are immutable; addresses discovered during the run
//! live in [`ResolvedAddresses`] instead of being written back.

use crate::error::{Error, Result};
use ipnet::{Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::Url;

/// A set of address literals.
///
/// Ordering and duplicates in the answers a resolver hands back are
/// irrelevant; only membership and cardinality take part in comparisons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressSet(BTreeSet<IpAddr>);

impl AddressSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address
    pub fn insert(&mut self, addr: IpAddr) -> bool {
        self.0.insert(addr)
    }

    /// Merge another set into this one
    pub fn extend(&mut self, other: AddressSet) {
        self.0.extend(other.0);
    }

    /// Number of distinct addresses
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no address was collected
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the set holds the address
    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.0.contains(addr)
    }

    /// Lowest address in the set
    pub fn first(&self) -> Option<IpAddr> {
        self.0.iter().next().copied()
    }

    /// Iterate in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.0.iter()
    }
}

impl FromIterator<IpAddr> for AddressSet {
    fn from_iter<I: IntoIterator<Item = IpAddr>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for AddressSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, addr) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{addr}")?;
        }
        f.write_str("]")
    }
}

/// Outcome code of a fetch.
///
/// The two sentinels keep their historical integer values so transcripts
/// and golden tests stay comparable: `-1` for a rejected certificate and
/// `0` for any network failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "i32")]
pub enum HttpStatus {
    /// TLS certificate validation failed
    CertError,
    /// Connection, timeout or protocol failure
    NetworkError,
    /// HTTP status code returned by the server (or relay)
    Code(u16),
}

impl HttpStatus {
    /// Integer form, with sentinels `-1` and `0`
    pub fn code(self) -> i32 {
        match self {
            Self::CertError => -1,
            Self::NetworkError => 0,
            Self::Code(code) => i32::from(code),
        }
    }
}

impl From<HttpStatus> for i32 {
    fn from(status: HttpStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CertError => f.write_str("certificate error"),
            Self::NetworkError => f.write_str("network error"),
            Self::Code(code) => write!(f, "{code}"),
        }
    }
}

/// A site whose expected reply is known in advance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTarget {
    /// Full URL to fetch
    pub url: String,
    /// Status the real site answers with
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    /// Substring the real page always contains
    pub expected_marker: String,
    /// Address used when live resolution yields nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
    /// IPv6 address used when live resolution yields nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Addr>,
    /// Non-blocked subdomain of a blocked domain
    #[serde(default)]
    pub is_subdomain_probe: bool,
    /// False for control sites that must stay reachable
    #[serde(default = "default_true")]
    pub counts_toward_blacklist: bool,
    /// Follow HTTP redirects when fetching directly
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
}

fn default_expected_status() -> u16 {
    200
}

fn default_true() -> bool {
    true
}

impl ReferenceTarget {
    /// Build a blacklisted target with no static addresses
    pub fn new(url: impl Into<String>, expected_status: u16, marker: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected_status,
            expected_marker: marker.into(),
            ipv4: None,
            ipv6: None,
            is_subdomain_probe: false,
            counts_toward_blacklist: true,
            follow_redirects: true,
        }
    }

    /// Set the fallback IPv4 literal
    pub fn with_ipv4(mut self, addr: Ipv4Addr) -> Self {
        self.ipv4 = Some(addr);
        self
    }

    /// Set the fallback IPv6 literal
    pub fn with_ipv6(mut self, addr: Ipv6Addr) -> Self {
        self.ipv6 = Some(addr);
        self
    }

    /// Mark as a non-blacklisted subdomain of a blocked domain
    pub fn subdomain_probe(mut self) -> Self {
        self.is_subdomain_probe = true;
        self.counts_toward_blacklist = false;
        self
    }

    /// Host part of the URL
    pub fn host(&self) -> Result<String> {
        url_host(&self.url)
    }

    /// Judge a fetch result against this target's expectations
    pub fn evaluate(&self, status: HttpStatus, body: String) -> ProbeOutcome {
        ProbeOutcome::evaluate(status, body, self.expected_status, &self.expected_marker)
    }
}

/// Target of the DPI evasion matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpiTarget {
    /// Value sent in the Host header
    pub host: String,
    /// Request path with query
    pub urn: String,
    /// Substring proving the real page came back
    pub expected_marker: String,
    /// Address used when live resolution yields nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
    /// IPv6 address of the target, informational
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Addr>,
}

/// Result of a single fetch, judged against a reference target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Status or sentinel
    pub status: HttpStatus,
    /// Decoded body, possibly prefixed with response headers
    pub body: String,
    /// Status matched and marker was found
    pub succeeded_as_expected: bool,
}

impl ProbeOutcome {
    /// Both the status and the marker must match; neither alone is enough.
    pub fn evaluate(status: HttpStatus, body: String, expected_status: u16, marker: &str) -> Self {
        let succeeded_as_expected =
            status == HttpStatus::Code(expected_status) && body.contains(marker);
        Self {
            status,
            body,
            succeeded_as_expected,
        }
    }

    /// Got the expected status but the marker is missing (likely a stub page)
    pub fn is_stub_page(&self, expected_status: u16) -> bool {
        !self.succeeded_as_expected && self.status == HttpStatus::Code(expected_status)
    }
}

/// Live-resolved addresses for one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetAddresses {
    /// IPv4 address to connect to
    pub v4: Option<IpAddr>,
    /// IPv6 address to connect to
    pub v6: Option<IpAddr>,
}

/// Side table of addresses discovered during a run, keyed by target URL or host.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAddresses {
    entries: HashMap<String, TargetAddresses>,
}

impl ResolvedAddresses {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the addresses for a key
    pub fn insert(&mut self, key: impl Into<String>, addrs: TargetAddresses) {
        self.entries.insert(key.into(), addrs);
    }

    /// Addresses for a key, empty when never resolved
    pub fn get(&self, key: &str) -> TargetAddresses {
        self.entries.get(key).copied().unwrap_or_default()
    }
}

/// Extract the host of a URL
pub fn url_host(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| Error::invalid_target(url, e.to_string()))?;
    parsed
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| Error::invalid_target(url, "URL has no host"))
}

/// Whether the URL uses the https scheme
pub fn is_https(url: &str) -> bool {
    url.get(..8)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
}

/// Hide the host part of an address for display.
///
/// IPv4 keeps its /24 (`1.2.3.xxx`), IPv6 its /64 (`2001:db8:1:2:xxxx::`).
pub fn mask_ip(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => match Ipv4Net::new(v4, 24) {
            Ok(net) => {
                let [a, b, c, _] = net.network().octets();
                format!("{a}.{b}.{c}.xxx")
            }
            Err(_) => v4.to_string(),
        },
        IpAddr::V6(v6) => match Ipv6Net::new(v6, 64) {
            Ok(net) => {
                let network = net.network().to_string();
                match network.strip_suffix("::") {
                    Some(prefix) => format!("{prefix}:xxxx::"),
                    None => format!("{network}:xxxx::"),
                }
            }
            Err(_) => v6.to_string(),
        },
    }
}
