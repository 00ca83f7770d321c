//! Reachability prober
//!
//! Fetches the plain HTTP reference targets and escalates every failure:
//! direct fetch, then the relay, then the availability oracle. Counters from
//! all targets are reduced to an access verdict per address family and an
//! oracle cross-check verdict.

use super::oracle::OracleGate;
use super::{lookup_real_ip, run_per_target};
use crate::context::{ProbeLog, RunContext};
use crate::error::Result;
use crate::model::{ReferenceTarget, TargetAddresses};
use crate::report::{HttpVerdict, OracleVerdict};
use crate::traits::{Availability, FetchOptions, NameResolver, RecordKind, Transport};
use std::net::IpAddr;
use tracing::instrument;

/// Access verdict from the success counters.
///
/// `total` counts only targets that take part in the tally.
pub fn classify_access(direct: usize, relay: usize, total: usize) -> HttpVerdict {
    if direct == total {
        HttpVerdict::NoBlocks
    } else if direct > 0 && direct + relay == total {
        HttpVerdict::PartialDpi
    } else if direct > 0 {
        HttpVerdict::FullDpi
    } else {
        HttpVerdict::IpBlock
    }
}

/// Oracle cross-check verdict from the oracle counters
pub fn classify_oracle(down: usize, ambiguous: usize, total: usize) -> OracleVerdict {
    if ambiguous > 0 {
        OracleVerdict::OracleBroken
    } else if total > 0 && down == total {
        OracleVerdict::AllDown
    } else if down > 0 {
        OracleVerdict::SomeDown
    } else {
        OracleVerdict::AllUp
    }
}

/// What happened to one target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetResult {
    /// Target takes part in the tally
    pub counted: bool,
    /// Target is a subdomain probe
    pub subdomain_probe: bool,
    /// Direct IPv4 fetch succeeded
    pub direct_v4: bool,
    /// Direct IPv6 fetch succeeded (or was not applicable)
    pub direct_v6: bool,
    /// Relay fetch succeeded after a direct failure
    pub via_relay: bool,
    /// Oracle answer after the relay failed too
    pub oracle: Option<Availability>,
}

/// Counters over a whole target set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReachabilityTally {
    /// Targets taking part in the tally
    pub total: usize,
    /// Direct IPv4 successes
    pub direct_v4: usize,
    /// Direct IPv6 successes
    pub direct_v6: usize,
    /// Successes through the relay only
    pub relay: usize,
    /// Oracle says the site is down for everyone
    pub down: usize,
    /// Oracle gave no usable answer
    pub ambiguous: usize,
    /// Oracle says the site is up, so it is blocked for us
    pub blocks: usize,
    /// Subdomain probes blocked while up for everyone
    pub subdomain_blocks: usize,
}

impl ReachabilityTally {
    /// Fold one target into the counters
    pub fn record(&mut self, result: &TargetResult) {
        if result.oracle == Some(Availability::Up) && result.subdomain_probe {
            self.subdomain_blocks += 1;
        }
        if !result.counted {
            return;
        }

        self.total += 1;
        if result.direct_v4 {
            self.direct_v4 += 1;
        }
        if result.direct_v6 {
            self.direct_v6 += 1;
        }
        if result.via_relay {
            self.relay += 1;
        }
        match result.oracle {
            Some(Availability::Up) => self.blocks += 1,
            Some(Availability::Down) => self.down += 1,
            Some(Availability::Unknown) => self.ambiguous += 1,
            None => {}
        }
    }
}

/// Verdicts of the reachability prober
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachabilityResult {
    /// IPv4 access verdict
    pub http_v4: HttpVerdict,
    /// IPv6 access verdict when IPv6 was probed
    pub http_v6: Option<HttpVerdict>,
    /// Oracle cross-check
    pub oracle: OracleVerdict,
    /// A subdomain of a blocked domain is blocked too
    pub subdomain_blocked: bool,
    /// Raw counters
    pub tally: ReachabilityTally,
}

impl ReachabilityResult {
    /// Reduce the counters to verdicts
    pub fn from_tally(tally: ReachabilityTally, ipv6: bool) -> Self {
        Self {
            http_v4: classify_access(tally.direct_v4, tally.relay, tally.total),
            http_v6: ipv6.then(|| classify_access(tally.direct_v6, tally.relay, tally.total)),
            oracle: classify_oracle(tally.down, tally.ambiguous, tally.total),
            subdomain_blocked: tally.subdomain_blocks > 0,
            tally,
        }
    }

    /// Blocking was observed on any probed family
    pub fn http_blocked(&self) -> bool {
        self.http_v4.is_blocked() || self.http_v6.is_some_and(HttpVerdict::is_blocked)
    }
}

/// Reachability prober over the plain HTTP target set
pub struct ReachabilityProber<'a> {
    transport: &'a dyn Transport,
    resolver: &'a dyn NameResolver,
    oracle: OracleGate<'a>,
    relay: Option<&'a str>,
    by_known_ip: bool,
    ipv6: bool,
    parallel: bool,
}

impl<'a> ReachabilityProber<'a> {
    /// Create a prober; `relay` is `None` when relay fallback is disabled
    pub fn new(
        transport: &'a dyn Transport,
        resolver: &'a dyn NameResolver,
        oracle: OracleGate<'a>,
        relay: Option<&'a str>,
    ) -> Self {
        Self {
            transport,
            resolver,
            oracle,
            relay,
            by_known_ip: false,
            ipv6: false,
            parallel: false,
        }
    }

    /// Connect to the addresses the DNS API reports instead of resolving locally
    pub fn by_known_ip(mut self, enabled: bool) -> Self {
        self.by_known_ip = enabled;
        self
    }

    /// Probe IPv6 alongside IPv4
    pub fn with_ipv6(mut self, enabled: bool) -> Self {
        self.ipv6 = enabled;
        self
    }

    /// Probe targets on worker threads
    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Probe every target and classify
    ///
    /// The addresses each target was fetched from are recorded in
    /// `ctx.addresses` under the target URL.
    #[instrument(skip_all, fields(targets = targets.len(), by_known_ip = self.by_known_ip))]
    pub fn run(
        &self,
        targets: &[ReferenceTarget],
        ctx: &mut RunContext,
    ) -> Result<ReachabilityResult> {
        if self.by_known_ip {
            ctx.note("[O] Testing HTTP (using the real IP addresses of the sites)");
        } else {
            ctx.note("[O] Testing HTTP");
        }

        let mut sorted: Vec<&ReferenceTarget> = targets.iter().collect();
        sorted.sort_by(|a, b| a.url.cmp(&b.url));

        let cancel = ctx.cancel_token().clone();
        let results = run_per_target(&sorted, self.parallel, &cancel, |target, log| {
            self.probe(target, log)
        })?;

        let mut tally = ReachabilityTally::default();
        for (target, ((result, addrs), log)) in sorted.iter().zip(results) {
            ctx.absorb(log);
            ctx.addresses.insert(target.url.as_str(), addrs);
            tally.record(&result);
        }
        ctx.checkpoint()?;

        let result = ReachabilityResult::from_tally(tally, self.ipv6);
        if result.oracle == OracleVerdict::OracleBroken {
            ctx.health.oracle_broken = true;
        }
        tracing::debug!(?tally, "HTTP reachability tally");
        Ok(result)
    }

    /// Addresses to connect to directly
    fn addresses(&self, target: &ReferenceTarget, log: &mut ProbeLog) -> TargetAddresses {
        let mut addrs = TargetAddresses {
            v4: target.ipv4.map(IpAddr::V4),
            v6: target.ipv6.map(IpAddr::V6),
        };
        if !self.by_known_ip {
            return addrs;
        }

        let Ok(host) = target.host() else {
            return addrs;
        };
        if let Some(ip) = lookup_real_ip(self.resolver, &host, RecordKind::A, log) {
            addrs.v4 = Some(ip);
        }
        // only targets known to have IPv6 get a fresh AAAA address
        if self.ipv6 && addrs.v6.is_some() {
            if let Some(ip) = lookup_real_ip(self.resolver, &host, RecordKind::Aaaa, log) {
                addrs.v6 = Some(ip);
            }
        }
        addrs
    }

    fn probe(
        &self,
        target: &ReferenceTarget,
        log: &mut ProbeLog,
    ) -> (TargetResult, TargetAddresses) {
        log.note(format!("\tOpening {}", target.url));
        let addrs = self.addresses(target, log);

        let direct = FetchOptions {
            follow_redirects: target.follow_redirects,
            ..FetchOptions::direct()
        }
        .with_headers();

        let v4 = if self.ipv6 || self.by_known_ip {
            direct.clone().with_ip(addrs.v4)
        } else {
            direct.clone()
        };
        let outcome_v4 = {
            let response = self.transport.fetch(&target.url, &v4);
            target.evaluate(response.status, response.body)
        };
        log.debug(format!("{} via IPv4: {}", target.url, outcome_v4.status));

        let outcome_v6 = match (self.ipv6, addrs.v6) {
            (true, Some(ip)) => {
                let v6 = direct.clone().with_ip(Some(ip));
                let response = self.transport.fetch(&target.url, &v6);
                log.debug(format!("{} via IPv6: {}", target.url, response.status));
                Some(target.evaluate(response.status, response.body))
            }
            _ => None,
        };

        let ok_v4 = outcome_v4.succeeded_as_expected;
        let ok_v6 = outcome_v6.as_ref().map_or(true, |o| o.succeeded_as_expected);

        let mut result = TargetResult {
            counted: target.counts_toward_blacklist,
            subdomain_probe: target.is_subdomain_probe,
            direct_v4: ok_v4,
            direct_v6: ok_v6,
            ..TargetResult::default()
        };

        if ok_v4 && ok_v6 {
            log.note("[✓] The site opens");
            return (result, addrs);
        }
        if self.ipv6 {
            if ok_v6 {
                log.note("[!] The site opens over IPv6 only");
            } else if ok_v4 {
                log.note("[!] The site opens over IPv4 only");
            }
        }

        let stub = outcome_v4.is_stub_page(target.expected_status)
            || outcome_v6
                .as_ref()
                .is_some_and(|o| o.is_stub_page(target.expected_status));
        if stub {
            log.note(
                "[☠] Unexpected response, most likely a provider stub page. Trying the relay.",
            );
        } else {
            log.note("[☠] The site does not open, trying the relay");
        }

        if let Some(relay) = self.relay {
            let response = self
                .transport
                .fetch(&target.url, &FetchOptions::direct().with_relay(relay));
            let outcome = target.evaluate(response.status, response.body);
            if outcome.succeeded_as_expected {
                log.note("[✓] The site opens through the relay");
                result.via_relay = true;
                return (result, addrs);
            }
            if outcome.is_stub_page(target.expected_status) {
                log.note(
                    "[☠] Unexpected response through the relay, most likely a stub page. \
                     Treating as blocked.",
                );
            } else {
                log.note("[☠] The site does not open through the relay");
            }
        } else {
            log.debug("relay disabled");
        }

        result.oracle = Some(self.oracle.check(&target.url, log));
        (result, addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========== Classification Tests ===========

    #[test]
    fn test_classify_access_rows() {
        assert_eq!(classify_access(3, 0, 3), HttpVerdict::NoBlocks);
        assert_eq!(classify_access(1, 2, 3), HttpVerdict::PartialDpi);
        assert_eq!(classify_access(1, 1, 3), HttpVerdict::FullDpi);
        assert_eq!(classify_access(0, 3, 3), HttpVerdict::IpBlock);
        assert_eq!(classify_access(0, 0, 3), HttpVerdict::IpBlock);
    }

    #[test]
    fn test_classify_access_empty_set() {
        assert_eq!(classify_access(0, 0, 0), HttpVerdict::NoBlocks);
    }

    #[test]
    fn test_classify_oracle_rows() {
        assert_eq!(classify_oracle(3, 1, 3), OracleVerdict::OracleBroken);
        assert_eq!(classify_oracle(3, 0, 3), OracleVerdict::AllDown);
        assert_eq!(classify_oracle(1, 0, 3), OracleVerdict::SomeDown);
        assert_eq!(classify_oracle(0, 0, 3), OracleVerdict::AllUp);
        assert_eq!(classify_oracle(0, 0, 0), OracleVerdict::AllUp);
    }

    // =========== Tally Tests ===========

    #[test]
    fn test_uncounted_subdomain_probe() {
        let mut tally = ReachabilityTally::default();
        tally.record(&TargetResult {
            counted: false,
            subdomain_probe: true,
            oracle: Some(Availability::Up),
            ..TargetResult::default()
        });
        assert_eq!(tally.total, 0);
        assert_eq!(tally.blocks, 0);
        assert_eq!(tally.subdomain_blocks, 1);

        let result = ReachabilityResult::from_tally(tally, false);
        assert!(result.subdomain_blocked);
        assert_eq!(result.http_v4, HttpVerdict::NoBlocks);
        assert_eq!(result.http_v6, None);
    }

    #[test]
    fn test_uncounted_down_target_ignored() {
        let mut tally = ReachabilityTally::default();
        tally.record(&TargetResult {
            counted: false,
            oracle: Some(Availability::Unknown),
            ..TargetResult::default()
        });
        assert_eq!(tally.ambiguous, 0);
        assert_eq!(
            ReachabilityResult::from_tally(tally, false).oracle,
            OracleVerdict::AllUp
        );
    }

    #[test]
    fn test_ipv6_verdict_uses_own_counter() {
        let mut tally = ReachabilityTally::default();
        tally.record(&TargetResult {
            counted: true,
            direct_v4: false,
            direct_v6: true,
            oracle: Some(Availability::Up),
            ..TargetResult::default()
        });
        let result = ReachabilityResult::from_tally(tally, true);
        assert_eq!(result.http_v4, HttpVerdict::IpBlock);
        assert_eq!(result.http_v6, Some(HttpVerdict::NoBlocks));
    }

    #[test]
    fn test_http_blocked_considers_ipv6() {
        let mut tally = ReachabilityTally::default();
        tally.record(&TargetResult {
            counted: true,
            direct_v4: true,
            direct_v6: false,
            oracle: Some(Availability::Up),
            ..TargetResult::default()
        });

        let dual = ReachabilityResult::from_tally(tally, true);
        assert_eq!(dual.http_v4, HttpVerdict::NoBlocks);
        assert!(dual.http_blocked());

        // without IPv6 the v6 counter is ignored
        assert!(!ReachabilityResult::from_tally(tally, false).http_blocked());
    }

    // =========== Address Table Tests ===========

    use crate::context::CancelToken;
    use crate::model::{AddressSet, HttpStatus};
    use crate::traits::{FetchResponse, FragmentPlan, ResolveError, TransportError};
    use parking_lot::Mutex;

    /// Resolver whose API knows one address; transport that records the IP it was given
    #[derive(Default)]
    struct Recorder {
        dialed: Mutex<Vec<(String, Option<IpAddr>)>>,
    }

    impl NameResolver for Recorder {
        fn resolve(
            &self,
            _: &str,
            _: RecordKind,
            _: Option<IpAddr>,
        ) -> std::result::Result<AddressSet, ResolveError> {
            Ok(AddressSet::default())
        }

        fn resolve_via_api(
            &self,
            name: &str,
            kind: RecordKind,
        ) -> std::result::Result<AddressSet, ResolveError> {
            match (name, kind) {
                ("a.example", RecordKind::A) => {
                    Ok(["203.0.113.7".parse::<IpAddr>().unwrap()].into_iter().collect())
                }
                _ => Err(ResolveError::Api("no record".into())),
            }
        }
    }

    impl Transport for Recorder {
        fn fetch(&self, url: &str, options: &FetchOptions) -> FetchResponse {
            self.dialed.lock().push((url.to_string(), options.override_ip));
            FetchResponse::new(HttpStatus::Code(200), "marker")
        }

        fn raw_send(
            &self,
            _: IpAddr,
            _: u16,
            _: &[u8],
            _: FragmentPlan,
        ) -> std::result::Result<Vec<u8>, TransportError> {
            Ok(Vec::new())
        }
    }

    impl crate::traits::AvailabilityOracle for Recorder {
        fn is_up(&self, _: &str) -> Availability {
            Availability::Unknown
        }
    }

    #[test]
    fn test_run_records_fetched_addresses() {
        let net = Recorder::default();
        let gate = OracleGate::new(&net, true, "oracle");
        let targets = [
            ReferenceTarget::new("http://a.example/", 200, "marker"),
            ReferenceTarget::new("http://b.example/", 200, "marker")
                .with_ipv4("198.51.100.2".parse().unwrap()),
        ];
        let mut ctx = RunContext::new(CancelToken::new());

        let result = ReachabilityProber::new(&net, &net, gate, None)
            .by_known_ip(true)
            .run(&targets, &mut ctx)
            .unwrap();

        assert_eq!(result.http_v4, HttpVerdict::NoBlocks);
        let a = ctx.addresses.get("http://a.example/");
        assert_eq!(a.v4, Some("203.0.113.7".parse().unwrap()));
        // the API has nothing for b, so its static address is kept
        let b = ctx.addresses.get("http://b.example/");
        assert_eq!(b.v4, Some("198.51.100.2".parse().unwrap()));

        let dialed = net.dialed.lock();
        assert!(dialed.contains(&("http://a.example/".to_string(), a.v4)));
        assert!(dialed.contains(&("http://b.example/".to_string(), b.v4)));
    }
}
