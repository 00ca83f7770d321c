//! Collaborator contracts
//!
//! The probe battery never touches the network itself. Everything it needs
//! from the outside world goes through these traits, implemented for real in
//! `blockcheck-net` and by fakes in tests.

use crate::model::{AddressSet, HttpStatus};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// DNS record type to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
}

impl RecordKind {
    /// Presentation form, as used in DoH query strings
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
        }
    }

    /// Numeric RR type
    pub fn rr_type(self) -> u16 {
        match self {
            Self::A => 1,
            Self::Aaaa => 28,
        }
    }

    /// Address family label for transcripts
    pub fn family(self) -> &'static str {
        match self {
            Self::A => "IPv4",
            Self::Aaaa => "IPv6",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a resolution produced no addresses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The nameserver did not answer in time
    #[error("DNS timeout")]
    Timeout,
    /// The name does not exist (NXDOMAIN)
    #[error("name does not exist")]
    NameNotFound,
    /// The name exists but has no record of the requested type,
    /// or every nameserver in the list timed out
    #[error("no answer")]
    NoAnswer,
    /// Any other DNS failure
    #[error("resolution error: {0}")]
    Resolution(String),
    /// The DoH-style API failed
    #[error("DNS API error: {0}")]
    Api(String),
}

/// Name resolution collaborator
pub trait NameResolver: Send + Sync {
    /// Resolve through `server`, or through the system nameservers when `None`
    fn resolve(
        &self,
        name: &str,
        kind: RecordKind,
        server: Option<IpAddr>,
    ) -> Result<AddressSet, ResolveError>;

    /// Resolve through the DNS-over-HTTPS style JSON API
    fn resolve_via_api(&self, name: &str, kind: RecordKind) -> Result<AddressSet, ResolveError>;
}

/// How a request is split into writes.
///
/// With `count > 0` the first `count * size` bytes leave as separate small
/// writes and the remainder as one write; otherwise the request is a single
/// write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FragmentPlan {
    /// Bytes per leading fragment
    pub size: usize,
    /// Number of leading fragments
    pub count: usize,
}

impl FragmentPlan {
    /// Single unsplit write
    pub const NONE: Self = Self { size: 0, count: 0 };

    /// Split the first `count` chunks of `size` bytes
    pub const fn new(size: usize, count: usize) -> Self {
        Self { size, count }
    }

    /// Whether the request is split at all
    pub fn is_fragmented(&self) -> bool {
        self.count > 0
    }

    /// Cut `data` into the writes this plan produces.
    ///
    /// Concatenating the result always yields `data` verbatim.
    pub fn split<'a>(&self, data: &'a [u8]) -> Vec<&'a [u8]> {
        let mut writes = Vec::with_capacity(self.count + 1);
        let mut rest = data;
        for _ in 0..self.count {
            let take = self.size.min(rest.len());
            let (head, tail) = rest.split_at(take);
            writes.push(head);
            rest = tail;
        }
        if !rest.is_empty() || writes.is_empty() {
            writes.push(rest);
        }
        writes
    }
}

/// Options for a single fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Connect here instead of resolving the URL host
    pub override_ip: Option<IpAddr>,
    /// Send the request through this HTTP relay (`host:port`)
    pub via_relay: Option<String>,
    /// Follow 3xx responses
    pub follow_redirects: bool,
    /// Prefix the body with the response headers
    pub include_headers: bool,
}

impl FetchOptions {
    /// Direct fetch following redirects
    pub fn direct() -> Self {
        Self {
            follow_redirects: true,
            ..Self::default()
        }
    }

    /// Connect to a specific address
    pub fn with_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.override_ip = ip;
        self
    }

    /// Route through a relay
    pub fn with_relay(mut self, relay: impl Into<String>) -> Self {
        self.via_relay = Some(relay.into());
        self
    }

    /// Do not follow redirects
    pub fn no_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    /// Include response headers in the body
    pub fn with_headers(mut self) -> Self {
        self.include_headers = true;
        self
    }
}

/// Result of a fetch; failures are folded into the status sentinels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Status or sentinel
    pub status: HttpStatus,
    /// Decoded body
    pub body: String,
}

impl FetchResponse {
    /// Response with a status and body
    pub fn new(status: HttpStatus, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Network failure
    pub fn network_error() -> Self {
        Self::new(HttpStatus::NetworkError, "")
    }

    /// Certificate validation failure
    pub fn cert_error() -> Self {
        Self::new(HttpStatus::CertError, "")
    }
}

/// Raw transport failure
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not connect
    #[error("connect to {addr} failed: {source}")]
    Connect {
        /// Destination
        addr: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Connection broke during the exchange
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport collaborator
pub trait Transport: Send + Sync {
    /// Fetch a URL; never fails, failures become sentinel statuses
    fn fetch(&self, url: &str, options: &FetchOptions) -> FetchResponse;

    /// Send raw bytes and read until the peer closes the connection
    fn raw_send(
        &self,
        ip: IpAddr,
        port: u16,
        request: &[u8],
        plan: FragmentPlan,
    ) -> Result<Vec<u8>, TransportError>;
}

/// Answer of the availability oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Availability {
    /// Site works for everyone else
    Up,
    /// Site is down for everyone
    Down,
    /// Oracle unreachable or answer not recognised
    Unknown,
}

/// "Is this site down for everyone or just me" collaborator.
///
/// Only plain HTTP targets can be judged; HTTPS URLs answer `Up`.
pub trait AvailabilityOracle: Send + Sync {
    /// Ask about a URL
    fn is_up(&self, url: &str) -> Availability;
}

/// Autonomous system number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Asn(pub u32);

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AS{}", self.0)
    }
}

/// IP to autonomous system registry
pub trait AsnRegistry: Send + Sync {
    /// ASN announcing the address, `None` when unavailable
    fn asn_of(&self, ip: IpAddr) -> Option<Asn>;

    /// Human-readable holder of the ASN
    fn holder(&self, _asn: Asn) -> Option<String> {
        None
    }
}
