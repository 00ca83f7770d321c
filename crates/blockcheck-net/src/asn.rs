//! IP to ASN registry over Team Cymru's DNS interface

use blockcheck_core::{Asn, AsnRegistry};
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::Resolver;
use std::fmt::Write as _;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

const ORIGIN_V4: &str = "origin.asn.cymru.com.";
const ORIGIN_V6: &str = "origin6.asn.cymru.com.";
const ASN_ZONE: &str = "asn.cymru.com.";

/// Team Cymru IP-to-ASN registry
pub struct CymruRegistry {
    resolver: Resolver,
}

impl CymruRegistry {
    /// Query the registry through `nameserver`
    pub fn new(nameserver: IpAddr, timeout: Duration) -> std::io::Result<Self> {
        let mut config = ResolverConfig::new();
        let addr = SocketAddr::new(nameserver, 53);
        config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;
        Ok(Self {
            resolver: Resolver::new(config, opts)?,
        })
    }

    fn txt(&self, name: &str) -> Option<String> {
        match self.resolver.txt_lookup(name) {
            Ok(lookup) => lookup.iter().next().map(ToString::to_string),
            Err(e) => {
                debug!(name, error = %e, "registry lookup failed");
                None
            }
        }
    }
}

impl AsnRegistry for CymruRegistry {
    fn asn_of(&self, ip: IpAddr) -> Option<Asn> {
        self.txt(&origin_name(ip)).and_then(|record| parse_origin(&record))
    }

    fn holder(&self, asn: Asn) -> Option<String> {
        self.txt(&format!("AS{}.{ASN_ZONE}", asn.0))
            .and_then(|record| parse_holder(&record))
    }
}

/// Reverse-order query name for an address
pub fn origin_name(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{d}.{c}.{b}.{a}.{ORIGIN_V4}")
        }
        IpAddr::V6(v6) => {
            let mut name = String::with_capacity(64 + ORIGIN_V6.len());
            for byte in v6.octets().iter().rev() {
                let _ = write!(name, "{:x}.{:x}.", byte & 0x0f, byte >> 4);
            }
            name.push_str(ORIGIN_V6);
            name
        }
    }
}

/// First ASN of `"13335 | 1.1.1.0/24 | US | arin | 2010-07-14"`
pub fn parse_origin(record: &str) -> Option<Asn> {
    record
        .split('|')
        .next()?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
        .map(Asn)
}

/// Holder name, the last field of `"13335 | US | arin | 2010-07-14 | CLOUDFLARENET, US"`
pub fn parse_holder(record: &str) -> Option<String> {
    let holder = record.rsplit('|').next()?.trim();
    (!holder.is_empty()).then(|| holder.to_string())
}
