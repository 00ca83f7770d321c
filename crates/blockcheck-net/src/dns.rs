//! Classic DNS resolution through chosen nameservers
//!
//! One `hickory` resolver per nameserver, so a query can be pinned to a
//! specific server and a timeout can move on to the next system server.

use crate::doh::DohClient;
use crate::error::{NetError, Result};
use blockcheck_core::probes::resolve_in_order;
use blockcheck_core::{AddressSet, NameResolver, RecordKind, ResolveError};
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError as LookupError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::Resolver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

const DNS_PORT: u16 = 53;

/// Real [`NameResolver`]: UDP DNS plus the DoH API
pub struct DnsResolver {
    system: Vec<IpAddr>,
    timeout: Duration,
    resolvers: Mutex<HashMap<IpAddr, Arc<Resolver>>>,
    api: DohClient,
}

impl DnsResolver {
    /// Create a resolver.
    ///
    /// An empty `system` list is filled from the operating system's resolver
    /// configuration.
    pub fn new(system: Vec<IpAddr>, timeout: Duration, api: DohClient) -> Result<Self> {
        let system = if system.is_empty() { system_nameservers()? } else { system };
        if system.is_empty() {
            return Err(NetError::Resolver("no system nameservers configured".into()));
        }
        debug!(?system, "system nameservers");
        Ok(Self {
            system,
            timeout,
            resolvers: Mutex::new(HashMap::new()),
            api,
        })
    }

    /// Nameservers used for `server = None`
    pub fn system_servers(&self) -> &[IpAddr] {
        &self.system
    }

    fn resolver_for(&self, server: IpAddr) -> std::result::Result<Arc<Resolver>, ResolveError> {
        let mut cache = self.resolvers.lock();
        if let Some(resolver) = cache.get(&server) {
            return Ok(Arc::clone(resolver));
        }
        let mut config = ResolverConfig::new();
        let addr = SocketAddr::new(server, DNS_PORT);
        config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));
        let resolver = Resolver::new(config, single_shot(self.timeout))
            .map(Arc::new)
            .map_err(|e| ResolveError::Resolution(e.to_string()))?;
        cache.insert(server, Arc::clone(&resolver));
        Ok(resolver)
    }

    fn query(
        &self,
        server: IpAddr,
        name: &str,
        kind: RecordKind,
    ) -> std::result::Result<AddressSet, ResolveError> {
        let resolver = self.resolver_for(server)?;
        trace!(%server, name, %kind, "DNS query");
        let addrs: AddressSet = match kind {
            RecordKind::A => resolver
                .ipv4_lookup(name)
                .map_err(map_error)?
                .iter()
                .map(|a| IpAddr::V4(a.0))
                .collect(),
            RecordKind::Aaaa => resolver
                .ipv6_lookup(name)
                .map_err(map_error)?
                .iter()
                .map(|a| IpAddr::V6(a.0))
                .collect(),
        };
        if addrs.is_empty() {
            return Err(ResolveError::NoAnswer);
        }
        Ok(addrs)
    }
}

impl NameResolver for DnsResolver {
    fn resolve(
        &self,
        name: &str,
        kind: RecordKind,
        server: Option<IpAddr>,
    ) -> std::result::Result<AddressSet, ResolveError> {
        match server {
            Some(server) => self.query(server, name, kind),
            None => resolve_in_order(&self.system, |server| self.query(server, name, kind)),
        }
    }

    fn resolve_via_api(
        &self,
        name: &str,
        kind: RecordKind,
    ) -> std::result::Result<AddressSet, ResolveError> {
        self.api.query(name, kind)
    }
}

/// One attempt, no caching, no hosts file
fn single_shot(timeout: Duration) -> ResolverOpts {
    let mut opts = ResolverOpts::default();
    opts.timeout = timeout;
    opts.attempts = 1;
    opts.cache_size = 0;
    opts.use_hosts_file = false;
    opts
}

fn map_error(err: LookupError) -> ResolveError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. }
            if *response_code == ResponseCode::NXDomain =>
        {
            ResolveError::NameNotFound
        }
        ResolveErrorKind::NoRecordsFound { .. } => ResolveError::NoAnswer,
        ResolveErrorKind::Timeout => ResolveError::Timeout,
        _ => ResolveError::Resolution(err.to_string()),
    }
}

/// Nameserver addresses from the OS configuration, duplicates removed
fn system_nameservers() -> Result<Vec<IpAddr>> {
    let (config, _) = hickory_resolver::system_conf::read_system_conf()
        .map_err(|e| NetError::Resolver(e.to_string()))?;
    let mut servers: Vec<IpAddr> = Vec::new();
    for ns in config.name_servers() {
        let ip = ns.socket_addr.ip();
        if !servers.contains(&ip) {
            servers.push(ip);
        }
    }
    Ok(servers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_timeout() {
        let err = LookupError::from(ResolveErrorKind::Timeout);
        assert_eq!(map_error(err), ResolveError::Timeout);
    }

    #[test]
    fn test_map_other_error() {
        let err = LookupError::from(ResolveErrorKind::Message("socket closed"));
        assert!(matches!(
            map_error(err),
            ResolveError::Resolution(msg) if msg.contains("socket closed")
        ));
    }

    #[test]
    fn test_single_shot_options() {
        let opts = single_shot(Duration::from_secs(5));
        assert_eq!(opts.timeout, Duration::from_secs(5));
        assert_eq!(opts.attempts, 1);
        assert_eq!(opts.cache_size, 0);
        assert!(!opts.use_hosts_file);
    }

    #[test]
    fn test_explicit_system_list_kept_in_order() {
        let api =
            DohClient::new("https://dns.example/resolve", "test", Duration::from_secs(1)).unwrap();
        let servers: Vec<IpAddr> =
            vec!["192.0.2.53".parse().unwrap(), "192.0.2.54".parse().unwrap()];
        let resolver = DnsResolver::new(servers.clone(), Duration::from_secs(1), api).unwrap();
        assert_eq!(resolver.system_servers(), servers.as_slice());
    }
}
