//! # Blockcheck Net
//!
//! Real implementations of the collaborator traits defined in
//! `blockcheck-core`:
//!
//! - [`DnsResolver`] - UDP DNS pinned to chosen nameservers, plus the DoH JSON API
//! - [`HttpTransport`] - HTTP(S) fetches with address override and relay, raw TCP sends
//! - [`IsupOracle`] - "is it down for everyone" status page
//! - [`CymruRegistry`] - IP to ASN over DNS
//!
//! [`NetStack::build`] wires all four from a [`Config`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod asn;
pub mod dns;
pub mod doh;
pub mod error;
pub mod http;
pub mod oracle;
pub mod raw;
pub mod tls;

pub use asn::CymruRegistry;
pub use dns::DnsResolver;
pub use doh::DohClient;
pub use error::{NetError, Result};
pub use http::HttpTransport;
pub use oracle::IsupOracle;

use blockcheck_core::{Collaborators, Config};
use std::net::IpAddr;
use tracing::debug;

/// The four real collaborators of a run
pub struct NetStack {
    resolver: DnsResolver,
    transport: HttpTransport,
    oracle: IsupOracle,
    registry: CymruRegistry,
}

impl NetStack {
    /// Build every collaborator from the configuration
    pub fn build(config: &Config) -> Result<Self> {
        let user_agent = config.general.user_agent.as_str();
        let timeout = config.resolvers.timeout();

        let fetch_timeout = config.probes.fetch_timeout();

        let api = DohClient::new(&config.resolvers.doh_url, user_agent, fetch_timeout)?;
        let resolver = DnsResolver::new(config.resolvers.system.clone(), timeout, api)?;
        let transport = HttpTransport::new(config)?;
        let oracle = IsupOracle::new(&config.oracle, user_agent, fetch_timeout)?;
        let registry = CymruRegistry::new(IpAddr::V4(config.resolvers.public_v4), timeout)?;

        debug!(system = ?resolver.system_servers(), "network collaborators ready");
        Ok(Self {
            resolver,
            transport,
            oracle,
            registry,
        })
    }

    /// Borrow the collaborators for the diagnosis engine
    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            resolver: &self.resolver,
            transport: &self.transport,
            oracle: &self.oracle,
            registry: &self.registry,
        }
    }
}
