//! Fake collaborators shared by the integration tests

#![allow(dead_code)]

use blockcheck_core::config::Config;
use blockcheck_core::{
    AddressSet, Asn, AsnRegistry, Availability, AvailabilityOracle, CancelToken, Collaborators,
    DiagnosisEngine, FetchOptions, FetchResponse, FragmentPlan, HttpStatus, NameResolver,
    RecordKind, ReferenceTarget, ResolveError, RunOutcome, Transport, TransportError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn set(addrs: &[&str]) -> AddressSet {
    addrs.iter().map(|a| ip(a)).collect()
}

// =========== Resolver ===========

/// Same answer for every name, keyed by nameserver and record type
#[derive(Default)]
pub struct FakeResolver {
    servers: HashMap<(Option<IpAddr>, RecordKind), Result<AddressSet, ResolveError>>,
    api: HashMap<RecordKind, AddressSet>,
    api_hosts: HashMap<(String, RecordKind), AddressSet>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system(mut self, kind: RecordKind, addrs: &[&str]) -> Self {
        self.servers.insert((None, kind), Ok(set(addrs)));
        self
    }

    pub fn server(mut self, server: &str, kind: RecordKind, addrs: &[&str]) -> Self {
        self.servers.insert((Some(ip(server)), kind), Ok(set(addrs)));
        self
    }

    pub fn failing(mut self, server: Option<&str>, kind: RecordKind, error: ResolveError) -> Self {
        self.servers.insert((server.map(ip), kind), Err(error));
        self
    }

    pub fn api(mut self, kind: RecordKind, addrs: &[&str]) -> Self {
        self.api.insert(kind, set(addrs));
        self
    }

    pub fn api_host(mut self, host: &str, kind: RecordKind, addrs: &[&str]) -> Self {
        self.api_hosts.insert((host.to_string(), kind), set(addrs));
        self
    }

    /// All four DNS paths agree on one address for IPv4
    pub fn clean_v4() -> Self {
        Self::new()
            .system(RecordKind::A, &["1.2.3.4"])
            .server("8.8.4.4", RecordKind::A, &["1.2.3.4"])
            .api(RecordKind::A, &["1.2.3.4"])
    }
}

impl NameResolver for FakeResolver {
    fn resolve(
        &self,
        name: &str,
        kind: RecordKind,
        server: Option<IpAddr>,
    ) -> Result<AddressSet, ResolveError> {
        self.calls.lock().push(format!("{name} {kind} {server:?}"));
        self.servers
            .get(&(server, kind))
            .cloned()
            .unwrap_or(Err(ResolveError::NoAnswer))
    }

    fn resolve_via_api(&self, name: &str, kind: RecordKind) -> Result<AddressSet, ResolveError> {
        self.calls.lock().push(format!("{name} {kind} api"));
        if let Some(addrs) = self.api_hosts.get(&(name.to_string(), kind)) {
            return Ok(addrs.clone());
        }
        self.api
            .get(&kind)
            .cloned()
            .ok_or_else(|| ResolveError::Api("no answer".into()))
    }
}

// =========== Transport ===========

/// Canned responses; anything not configured is a network error
#[derive(Default)]
pub struct FakeTransport {
    direct: HashMap<String, FetchResponse>,
    by_ip: HashMap<(String, IpAddr), FetchResponse>,
    relay: HashMap<String, FetchResponse>,
    raw: HashMap<(Vec<u8>, FragmentPlan), Vec<u8>>,
    pub fetches: Mutex<Vec<(String, FetchOptions)>>,
    pub raw_writes: Mutex<Vec<Vec<Vec<u8>>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direct(mut self, url: &str, status: u16, body: &str) -> Self {
        self.direct
            .insert(url.to_string(), FetchResponse::new(HttpStatus::Code(status), body));
        self
    }

    pub fn direct_status(mut self, url: &str, status: HttpStatus) -> Self {
        self.direct.insert(url.to_string(), FetchResponse::new(status, ""));
        self
    }

    pub fn at_ip(mut self, url: &str, addr: &str, status: u16, body: &str) -> Self {
        self.by_ip.insert(
            (url.to_string(), ip(addr)),
            FetchResponse::new(HttpStatus::Code(status), body),
        );
        self
    }

    pub fn relay(mut self, url: &str, status: u16, body: &str) -> Self {
        self.relay
            .insert(url.to_string(), FetchResponse::new(HttpStatus::Code(status), body));
        self
    }

    pub fn raw(mut self, request: &[u8], plan: FragmentPlan, response: &str) -> Self {
        self.raw.insert((request.to_vec(), plan), response.as_bytes().to_vec());
        self
    }

    pub fn fetched(&self, url: &str) -> Vec<FetchOptions> {
        self.fetches
            .lock()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, o)| o.clone())
            .collect()
    }
}

impl Transport for FakeTransport {
    fn fetch(&self, url: &str, options: &FetchOptions) -> FetchResponse {
        self.fetches.lock().push((url.to_string(), options.clone()));
        if options.via_relay.is_some() {
            return self.relay.get(url).cloned().unwrap_or_else(FetchResponse::network_error);
        }
        if let Some(addr) = options.override_ip {
            if let Some(response) = self.by_ip.get(&(url.to_string(), addr)) {
                return response.clone();
            }
        }
        self.direct.get(url).cloned().unwrap_or_else(FetchResponse::network_error)
    }

    fn raw_send(
        &self,
        _ip: IpAddr,
        _port: u16,
        request: &[u8],
        plan: FragmentPlan,
    ) -> Result<Vec<u8>, TransportError> {
        self.raw_writes
            .lock()
            .push(plan.split(request).into_iter().map(<[u8]>::to_vec).collect());
        self.raw
            .get(&(request.to_vec(), plan))
            .cloned()
            .ok_or_else(|| TransportError::Io(std::io::ErrorKind::ConnectionRefused.into()))
    }
}

// =========== Oracle and registry ===========

pub struct FakeOracle {
    answers: HashMap<String, Availability>,
    default: Availability,
    pub asked: Mutex<Vec<String>>,
}

impl FakeOracle {
    pub fn answering(default: Availability) -> Self {
        Self {
            answers: HashMap::new(),
            default,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, url: &str, answer: Availability) -> Self {
        self.answers.insert(url.to_string(), answer);
        self
    }
}

impl AvailabilityOracle for FakeOracle {
    fn is_up(&self, url: &str) -> Availability {
        self.asked.lock().push(url.to_string());
        self.answers.get(url).copied().unwrap_or(self.default)
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    asns: HashMap<IpAddr, Asn>,
    holders: HashMap<Asn, String>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, addr: &str, asn: u32, holder: &str) -> Self {
        self.asns.insert(ip(addr), Asn(asn));
        self.holders.insert(Asn(asn), holder.to_string());
        self
    }
}

impl AsnRegistry for FakeRegistry {
    fn asn_of(&self, addr: IpAddr) -> Option<Asn> {
        self.asns.get(&addr).copied()
    }

    fn holder(&self, asn: Asn) -> Option<String> {
        self.holders.get(&asn).cloned()
    }
}

// =========== Scenario helpers ===========

/// Blacklisted target opening with status 200 and its marker
pub fn target(url: &str) -> ReferenceTarget {
    ReferenceTarget::new(url, 200, "real page")
}

/// IPv4-only config with no reference data; tests add what they need
pub fn bare_config() -> Config {
    let mut config = Config::default();
    config.probes.disable_ipv6 = true;
    config.targets.http.clear();
    config.targets.https.clear();
    config.targets.dpi.clear();
    config
}

pub struct World {
    pub resolver: FakeResolver,
    pub transport: FakeTransport,
    pub oracle: FakeOracle,
    pub registry: FakeRegistry,
}

impl World {
    pub fn new(resolver: FakeResolver, transport: FakeTransport) -> Self {
        Self {
            resolver,
            transport,
            oracle: FakeOracle::answering(Availability::Up),
            registry: FakeRegistry::new(),
        }
    }

    pub fn with_oracle(mut self, oracle: FakeOracle) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_registry(mut self, registry: FakeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            resolver: &self.resolver,
            transport: &self.transport,
            oracle: &self.oracle,
            registry: &self.registry,
        }
    }

    pub fn run(&self, config: &Config) -> RunOutcome {
        DiagnosisEngine::new(config, self.collaborators())
            .run(CancelToken::new())
            .expect("run should complete")
    }
}
