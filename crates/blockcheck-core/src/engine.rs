//! Diagnosis engine
//!
//! Runs the probes in their fixed order and fuses the partial results into
//! a [`DiagnosisReport`]. Cancellation is observed between steps and between
//! targets; a cancelled run produces no report.

use crate::config::{Config, VERSION};
use crate::context::{CancelToken, ProbeLog, RunContext};
use crate::error::Result;
use crate::model::{mask_ip, HttpStatus};
use crate::probes::{
    AsnCorrelation, CertificateProber, DnsBattery, DpiMatrix, OracleGate, ReachabilityProber,
    TunnelDetector,
};
use crate::report::{DiagnosisReport, DnsVerdict, EgressInfo};
use crate::traits::{
    AsnRegistry, AvailabilityOracle, FetchOptions, NameResolver, RecordKind, Transport,
};
use std::net::{IpAddr, Ipv6Addr};
use tracing::{info, instrument};

/// The outside world as seen by the engine
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// DNS and DNS API
    pub resolver: &'a dyn NameResolver,
    /// HTTP(S) fetches and raw sends
    pub transport: &'a dyn Transport,
    /// "Is it down for everyone" service
    pub oracle: &'a dyn AvailabilityOracle,
    /// IP to ASN registry
    pub registry: &'a dyn AsnRegistry,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Every verdict of the run
    pub report: DiagnosisReport,
    /// What the run printed, with debug lines kept apart
    pub transcript: ProbeLog,
}

/// Orchestrates one diagnosis run
pub struct DiagnosisEngine<'a> {
    config: &'a Config,
    net: Collaborators<'a>,
}

impl<'a> DiagnosisEngine<'a> {
    /// Create an engine over a validated configuration
    pub fn new(config: &'a Config, net: Collaborators<'a>) -> Self {
        Self { config, net }
    }

    /// Run every probe and build the report
    #[instrument(skip_all)]
    pub fn run(&self, cancel: CancelToken) -> Result<RunOutcome> {
        let mut ctx = RunContext::new(cancel);
        let config = self.config;
        let probes = &config.probes;
        let targets = &config.targets;
        let net = self.net;

        ctx.note(format!("BlockCheck v{VERSION}"));
        ctx.note(
            "For accurate results use your provider's DNS server and turn off any \
             circumvention tools.",
        );
        ctx.note("");

        let detected_v6 = if probes.disable_ipv6 {
            None
        } else {
            TunnelDetector::new(
                net.resolver,
                net.transport,
                &config.general.echo_v6_host,
                &config.general.echo_v6_url,
            )
            .force(probes.force_ipv6)
            .detect(&mut ctx)
        };
        ctx.checkpoint()?;

        let (egress, ipv6) = self.egress(detected_v6, &mut ctx);
        ctx.checkpoint()?;

        let resolvers = &config.resolvers;
        let dns_v4 = DnsBattery::new(
            net.resolver,
            &targets.dns_domains,
            IpAddr::V4(resolvers.public_v4),
            IpAddr::V4(resolvers.fake_v4),
        )
        .run(RecordKind::A, &mut ctx)?;
        let dns_v6 = if ipv6 {
            ctx.note("");
            let verdict = DnsBattery::new(
                net.resolver,
                &targets.dns_domains,
                IpAddr::V6(resolvers.public_v6),
                IpAddr::V6(resolvers.fake_v6),
            )
            .run(RecordKind::Aaaa, &mut ctx)?;
            Some(verdict)
        } else {
            None
        };
        ctx.note("");

        let oracle = OracleGate::new(net.oracle, config.oracle.enabled, &config.oracle.name);
        let by_known_ip = dns_v4 != DnsVerdict::NoTampering
            || dns_v6.is_some_and(|v| v != DnsVerdict::NoTampering);
        let relay = config.relay_address();
        let http = ReachabilityProber::new(net.transport, net.resolver, oracle, relay)
            .by_known_ip(by_known_ip)
            .with_ipv6(ipv6)
            .parallel(probes.parallel)
            .run(&targets.http, &mut ctx)?;
        ctx.note("");

        let cert = CertificateProber::new(net.transport, net.resolver, oracle)
            .parallel(probes.parallel)
            .run(&targets.https, &mut ctx)?;
        ctx.note("");

        let dpi = if http.http_blocked() || probes.force_dpi_check {
            let labels =
                DpiMatrix::new(net.transport, net.resolver, ipv6).run(&targets.dpi, &mut ctx)?;
            ctx.note("");
            Some(labels)
        } else {
            None
        };
        ctx.checkpoint()?;

        let RunContext { log, health, .. } = ctx;
        let report = DiagnosisReport {
            dns_v4,
            dns_v6,
            http_v4: http.http_v4,
            http_v6: http.http_v6,
            oracle: http.oracle,
            cert,
            subdomain_blocked: http.subdomain_blocked,
            dpi,
            ipv6_tested: ipv6,
            egress,
            health,
        };
        info!(
            dns_v4 = report.dns_v4.code(),
            http_v4 = report.http_v4.code(),
            oracle = report.oracle.code(),
            cert = report.cert.code(),
            "Diagnosis complete"
        );

        Ok(RunOutcome {
            report,
            transcript: log,
        })
    }

    /// Public addresses and their networks. Returns whether IPv6 stays enabled.
    fn egress(&self, detected_v6: Option<Ipv6Addr>, ctx: &mut RunContext) -> (EgressInfo, bool) {
        let net = self.net;
        let mut ipv6 = detected_v6.is_some();
        let mut info = EgressInfo {
            ipv6: detected_v6.map(IpAddr::V6),
            ..EgressInfo::default()
        };

        let response = net
            .transport
            .fetch(&self.config.general.echo_v4_url, &FetchOptions::direct());
        info.ipv4 = match response.status {
            HttpStatus::Code(200) => response.body.trim().parse::<IpAddr>().ok(),
            _ => None,
        };
        let Some(v4) = info.ipv4 else {
            ctx.debug(format!("IPv4 echo failed: {}", response.status));
            return (info, ipv6);
        };

        let asn_v4 = match (detected_v6, self.config.probes.force_ipv6) {
            (Some(v6), false) => {
                let correlation = AsnCorrelation::lookup(net.registry, v4, IpAddr::V6(v6), ctx);
                info.asn_v6 = correlation.asn_v6.map(|a| a.0);
                if correlation.is_asymmetric() {
                    ipv6 = false;
                    ctx.note("You are probably behind an IPv6 tunnel. IPv6 checks are disabled.");
                }
                correlation.asn_v4
            }
            _ => {
                let asn = net.registry.asn_of(v4);
                if asn.is_none() {
                    ctx.health.registry_unavailable = true;
                }
                asn
            }
        };
        info.asn_v4 = asn_v4.map(|a| a.0);
        info.isp = asn_v4.and_then(|asn| net.registry.holder(asn));

        let isp = info.isp.as_deref().unwrap_or("unknown");
        match info.ipv6 {
            Some(v6) => {
                ctx.note(format!("IP: {}, IPv6: {}, provider: {isp}", mask_ip(v4), mask_ip(v6)));
            }
            None => ctx.note(format!("IP: {}, provider: {isp}", mask_ip(v4))),
        }
        ctx.note("");
        (info, ipv6)
    }
}

impl std::fmt::Debug for DiagnosisEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosisEngine").finish_non_exhaustive()
    }
}
