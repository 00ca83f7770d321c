//! IPv6 tunnel detector
//!
//! IPv6 results only describe the provider under test when IPv6 leaves
//! through that provider. Transition tunnels and egress addresses owned by
//! a different autonomous system are rejected.

use crate::context::RunContext;
use crate::traits::{Asn, AsnRegistry, FetchOptions, NameResolver, RecordKind, Transport};
use ipnet::Ipv6Net;
use std::net::{IpAddr, Ipv6Addr};
use tracing::instrument;

const TEREDO: (Ipv6Addr, u8) = (Ipv6Addr::new(0x2001, 0, 0, 0, 0, 0, 0, 0), 32);
const SIX_TO_FOUR: (Ipv6Addr, u8) = (Ipv6Addr::new(0x2002, 0, 0, 0, 0, 0, 0, 0), 16);

fn in_prefix(addr: Ipv6Addr, (prefix, len): (Ipv6Addr, u8)) -> bool {
    Ipv6Net::new(prefix, len).is_ok_and(|net| net.contains(&addr))
}

/// Whether the address belongs to Teredo (2001::/32) or 6to4 (2002::/16)
pub fn is_transition_tunnel(addr: Ipv6Addr) -> bool {
    in_prefix(addr, TEREDO) || in_prefix(addr, SIX_TO_FOUR)
}

/// Checks that IPv6 works and is native
pub struct TunnelDetector<'a> {
    resolver: &'a dyn NameResolver,
    transport: &'a dyn Transport,
    echo_host: &'a str,
    echo_url: &'a str,
    force: bool,
}

impl<'a> TunnelDetector<'a> {
    /// Detector asking `echo_url` (served by `echo_host`) for our address
    pub fn new(
        resolver: &'a dyn NameResolver,
        transport: &'a dyn Transport,
        echo_host: &'a str,
        echo_url: &'a str,
    ) -> Self {
        Self {
            resolver,
            transport,
            echo_host,
            echo_url,
            force: false,
        }
    }

    /// Accept tunnel addresses
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Public IPv6 egress address, or `None` when IPv6 is unusable
    #[instrument(skip_all, fields(echo = self.echo_host))]
    pub fn detect(&self, ctx: &mut RunContext) -> Option<Ipv6Addr> {
        let server = match self.resolver.resolve(self.echo_host, RecordKind::Aaaa, None) {
            Ok(addrs) => addrs.first(),
            Err(e) => {
                ctx.debug(format!("AAAA lookup for {} failed: {e}", self.echo_host));
                None
            }
        };
        let Some(server) = server else {
            ctx.note("Checking IPv6: IPv6 is not available.");
            return None;
        };

        let response = self
            .transport
            .fetch(self.echo_url, &FetchOptions::direct().with_ip(Some(server)));
        let body = response.body.trim();
        if body.is_empty() {
            ctx.note("Checking IPv6: IPv6 is not available.");
            return None;
        }

        let addr = match body.parse::<Ipv6Addr>() {
            Ok(addr) => addr,
            Err(e) => {
                ctx.debug(format!("IPv6 echo returned {body:?}: {e}"));
                ctx.note("Checking IPv6: IPv6 is not available.");
                return None;
            }
        };

        if !self.force && is_transition_tunnel(addr) {
            ctx.note("Checking IPv6: Teredo or 6to4 tunnel detected, ignoring.");
            return None;
        }

        ctx.note("Checking IPv6: IPv6 is available!");
        Some(addr)
    }
}

/// Autonomous systems of both egress addresses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsnCorrelation {
    /// ASN of the IPv4 egress
    pub asn_v4: Option<Asn>,
    /// ASN of the IPv6 egress
    pub asn_v6: Option<Asn>,
}

impl AsnCorrelation {
    /// Look up both addresses; a failed lookup marks the registry unavailable
    pub fn lookup(
        registry: &dyn AsnRegistry,
        v4: IpAddr,
        v6: IpAddr,
        ctx: &mut RunContext,
    ) -> Self {
        let asn_v4 = registry.asn_of(v4);
        let asn_v6 = registry.asn_of(v6);
        if asn_v4.is_none() || asn_v6.is_none() {
            ctx.health.registry_unavailable = true;
            ctx.debug("ASN registry lookup failed, skipping tunnel correlation");
        }
        Self { asn_v4, asn_v6 }
    }

    /// Both ASNs are known and differ
    pub fn is_asymmetric(&self) -> bool {
        matches!((self.asn_v4, self.asn_v6), (Some(a), Some(b)) if a != b)
    }
}
