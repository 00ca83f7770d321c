//! Configuration management for blockcheck
//!
//! A strongly-typed run configuration with TOML support. Every section has
//! working defaults, so an empty file (or no file) runs the standard check.

pub mod targets;

use crate::error::{Error, Result};
use crate::model::{url_host, DpiTarget, ReferenceTarget};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Version string reported to remote services
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Resolvers compared by the DNS battery
    pub resolvers: ResolversConfig,

    /// Relay used to tell IP blocking from payload inspection
    pub relay: RelayConfig,

    /// Availability oracle
    pub oracle: OracleConfig,

    /// Probe behaviour
    pub probes: ProbesConfig,

    /// Reference data
    pub targets: TargetsConfig,

    /// Transcript upload
    pub report: ReportConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| Error::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::from)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(Error::from)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.targets.dns_domains.is_empty() {
            return Err(Error::config_value(
                "targets.dns_domains",
                "At least one domain is required",
            ));
        }

        for target in &self.targets.http {
            url_host(&target.url)?;
            if target.expected_marker.is_empty() {
                return Err(Error::invalid_target(&target.url, "expected_marker is empty"));
            }
        }

        for url in &self.targets.https {
            if !crate::model::is_https(url) {
                return Err(Error::invalid_target(url, "certificate targets must use https"));
            }
            url_host(url)?;
        }

        for target in &self.targets.dpi {
            if !target.urn.starts_with('/') {
                return Err(Error::invalid_target(&target.host, "urn must start with '/'"));
            }
            if target.expected_marker.is_empty() {
                return Err(Error::invalid_target(&target.host, "expected_marker is empty"));
            }
        }

        if self.relay.enabled && self.relay.address.parse::<SocketAddr>().is_err() {
            return Err(Error::config_value(
                "relay.address",
                format!("'{}' is not an ip:port pair", self.relay.address),
            ));
        }

        if self.oracle.enabled && !self.oracle.url_format.contains("{}") {
            return Err(Error::config_value(
                "oracle.url_format",
                "Must contain '{}' where the domain goes",
            ));
        }

        if !self.resolvers.doh_url.starts_with("http") {
            return Err(Error::config_value("resolvers.doh_url", "Must be an http(s) URL"));
        }

        if self.resolvers.timeout_secs == 0 {
            return Err(Error::config_value("resolvers.timeout_secs", "Must be positive"));
        }
        if self.probes.connect_timeout_secs == 0 {
            return Err(Error::config_value("probes.connect_timeout_secs", "Must be positive"));
        }
        if self.probes.fetch_timeout_secs == 0 {
            return Err(Error::config_value("probes.fetch_timeout_secs", "Must be positive"));
        }

        if self.probes.disable_ipv6 && self.probes.force_ipv6 {
            return Err(Error::config_value(
                "probes",
                "disable_ipv6 and force_ipv6 are mutually exclusive",
            ));
        }

        Ok(())
    }

    /// Relay address to pass to the transport, if the relay is enabled
    pub fn relay_address(&self) -> Option<&str> {
        self.relay.enabled.then_some(self.relay.address.as_str())
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// User-Agent sent with every request
    pub user_agent: String,
    /// URL returning the caller's public IPv4 address as plain text
    pub echo_v4_url: String,
    /// Host resolved over AAAA to test IPv6
    pub echo_v6_host: String,
    /// URL returning the caller's public IPv6 address as plain text
    pub echo_v6_url: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("Blockcheck/{VERSION} https://github.com/ValdikSS/blockcheck"),
            echo_v4_url: "http://ipv4.icanhazip.com/".to_string(),
            echo_v6_host: "ipv6.icanhazip.com".to_string(),
            echo_v6_url: "http://ipv6.icanhazip.com/".to_string(),
        }
    }
}

/// Resolvers compared by the DNS battery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolversConfig {
    /// Explicit system nameservers, tried in order (empty = read from the OS)
    pub system: Vec<IpAddr>,
    /// Trusted public resolver (IPv4)
    pub public_v4: Ipv4Addr,
    /// Trusted public resolver (IPv6)
    pub public_v6: Ipv6Addr,
    /// Address where no resolver should ever answer (IPv4)
    pub fake_v4: Ipv4Addr,
    /// Address where no resolver should ever answer (IPv6)
    pub fake_v6: Ipv6Addr,
    /// DNS-over-HTTPS JSON API endpoint
    pub doh_url: String,
    /// Per-nameserver timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ResolversConfig {
    fn default() -> Self {
        Self {
            system: Vec::new(),
            public_v4: Ipv4Addr::new(8, 8, 4, 4),
            public_v6: Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8844),
            fake_v4: Ipv4Addr::new(3, 3, 3, 3),
            fake_v6: Ipv6Addr::new(0x2600, 0, 0, 0, 0, 0, 0x10, 0x20),
            doh_url: "https://dns.google.com/resolve".to_string(),
            timeout_secs: 5,
        }
    }
}

impl ResolversConfig {
    /// Per-nameserver timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// HTTP relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Retry failed targets through the relay
    pub enabled: bool,
    /// Relay `ip:port`
    pub address: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "95.137.240.30:60030".to_string(),
        }
    }
}

/// Availability oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Ask the oracle; when disabled every site is presumed up
    pub enabled: bool,
    /// Display name
    pub name: String,
    /// Query URL, `{}` is replaced with the domain
    pub url_format: String,
    /// Body substring meaning "up"
    pub up_marker: String,
    /// Body substring meaning "down"
    pub down_marker: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "isitdownrightnow.com".to_string(),
            url_format: "https://www.isitdownrightnow.com/check.php?domain={}".to_string(),
            up_marker: "upicon".to_string(),
            down_marker: "downicon".to_string(),
        }
    }
}

/// Probe behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbesConfig {
    /// Run the DPI matrix even without observed HTTP blocking
    pub force_dpi_check: bool,
    /// Skip every IPv6 probe
    pub disable_ipv6: bool,
    /// Use IPv6 even through transition tunnels or foreign networks
    pub force_ipv6: bool,
    /// Probe targets of a battery concurrently
    pub parallel: bool,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Whole-fetch timeout in seconds
    pub fetch_timeout_secs: u64,
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            force_dpi_check: false,
            disable_ipv6: false,
            force_ipv6: false,
            parallel: false,
            connect_timeout_secs: 10,
            fetch_timeout_secs: 15,
        }
    }
}

impl ProbesConfig {
    /// Connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Whole-fetch timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Reference data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Domains compared by the DNS battery
    pub dns_domains: Vec<String>,
    /// Plain HTTP reachability targets
    pub http: Vec<ReferenceTarget>,
    /// Certificate check URLs
    pub https: Vec<String>,
    /// DPI matrix targets
    pub dpi: Vec<DpiTarget>,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            dns_domains: targets::dns_domains(),
            http: targets::http_targets(),
            https: targets::https_targets(),
            dpi: targets::dpi_targets(),
        }
    }
}

/// Transcript upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Upload the transcript after the run
    pub enabled: bool,
    /// Collector endpoint
    pub url: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://blockcheck.antizapret.prostovpn.org/postdata.php".to_string(),
        }
    }
}
