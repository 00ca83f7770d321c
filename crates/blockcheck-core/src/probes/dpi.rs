//! DPI evasion matrix
//!
//! Sends deliberately malformed or fragmented HTTP requests to sites known
//! to be blocked and records which mutations get the real page back.

use super::lookup_real_ip;
use crate::context::{ProbeLog, RunContext};
use crate::error::Result;
use crate::model::{DpiTarget, TargetAddresses};
use crate::traits::{FragmentPlan, NameResolver, RecordKind, Transport};
use bytes::Bytes;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::net::IpAddr;
use tracing::{debug, instrument, warn};

/// Label recorded when a real page arrives under a foreign status line
pub const PASSIVE_DPI_LABEL: &str = "Passive DPI";

/// Label of the unmodified request
pub const BASELINE_LABEL: &str = "plain request";

const HTTP_PORT: u16 = 80;
const HEADER_FRAGMENTS: FragmentPlan = FragmentPlan::new(2, 6);

/// One request mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpiCase {
    /// Human-readable name of the mutation
    pub label: &'static str,
    /// Exact bytes sent on the wire
    pub request: Bytes,
    /// How the request is split into writes
    pub plan: FragmentPlan,
    /// Substring proving the real page came back
    pub expected_marker: String,
}

/// How one case went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseOutcome {
    /// The evasion works
    Success,
    /// Content arrived under an injected status line
    PassiveDpi,
    /// No access
    Failure,
}

/// Truth table over the status line and the marker
pub fn classify_case(first_line_ok: bool, marker_present: bool) -> CaseOutcome {
    match (first_line_ok, marker_present) {
        (true, true) => CaseOutcome::Success,
        (false, true) => CaseOutcome::PassiveDpi,
        (_, false) => CaseOutcome::Failure,
    }
}

/// Classify a raw response
pub fn classify_response(response: &str, marker: &str) -> CaseOutcome {
    let first_line = response.split('\n').next().unwrap_or_default();
    classify_case(first_line.contains("200 "), response.contains(marker))
}

fn request(request_line: &str, headers: &str) -> Bytes {
    Bytes::from(format!("{request_line}{headers}"))
}

fn padding(count: usize, width: usize) -> String {
    let mut out = String::with_capacity(count * (width + 16));
    for n in 1..=count {
        let fill = char::from(b'0' + u8::try_from(n % 10).unwrap_or(0));
        let _ = write!(out, "X-Padding{n}: {}\r\n", fill.to_string().repeat(width));
    }
    out
}

/// Build every mutation for one target, baseline first
pub fn build_cases(host: &str, urn: &str, marker: &str) -> Vec<DpiCase> {
    let get = format!("GET {urn} HTTP/1.0\r\n");
    let plain = |label: &'static str, bytes: Bytes, plan: FragmentPlan| DpiCase {
        label,
        request: bytes,
        plan,
        expected_marker: marker.to_string(),
    };
    let padded = |count: usize, width: usize| {
        request(
            &get,
            &format!("Connection: close\r\n{}Host: {host}\r\n\r\n", padding(count, width)),
        )
    };

    vec![
        plain(
            BASELINE_LABEL,
            request(&get, &format!("Host: {host}\r\nConnection: close\r\n\r\n")),
            FragmentPlan::NONE,
        ),
        plain(
            "extra space after GET",
            request(
                &format!("GET  {urn} HTTP/1.0\r\n"),
                &format!("Host: {host}\r\nConnection: close\r\n\r\n"),
            ),
            FragmentPlan::NONE,
        ),
        plain(
            "line break before GET",
            request(&format!("\r\n{get}"), &format!("Host: {host}\r\nConnection: close\r\n\r\n")),
            FragmentPlan::NONE,
        ),
        plain(
            "tab at end of domain",
            request(&get, &format!("Host: {host}\t\r\nConnection: close\r\n\r\n")),
            FragmentPlan::NONE,
        ),
        plain(
            "header fragmentation",
            request(&get, &format!("Host: {host}\r\nConnection: close\r\n\r\n")),
            HEADER_FRAGMENTS,
        ),
        plain(
            "dot at end of domain",
            request(&get, &format!("Host: {host}.\r\nConnection: close\r\n\r\n")),
            FragmentPlan::NONE,
        ),
        plain(
            "hoSt header instead of Host",
            request(&get, &format!("hoSt: {host}\r\nConnection: close\r\n\r\n")),
            FragmentPlan::NONE,
        ),
        plain(
            "hOSt header instead of Host",
            request(&get, &format!("hOSt: {host}\r\nConnection: close\r\n\r\n")),
            FragmentPlan::NONE,
        ),
        plain(
            "Host value in UPPERCASE",
            request(
                &get,
                &format!("Host: {}\r\nConnection: close\r\n\r\n", host.to_uppercase()),
            ),
            FragmentPlan::NONE,
        ),
        plain(
            "no space after Host colon",
            request(&get, &format!("Host:{host}\r\nConnection: close\r\n\r\n")),
            FragmentPlan::NONE,
        ),
        plain(
            "UNIX-style line breaks",
            request(
                &format!("GET {urn} HTTP/1.0\n"),
                &format!("Host: {host}\nConnection: close\n\n"),
            ),
            FragmentPlan::NONE,
        ),
        plain(
            "unusual header order",
            request(&get, &format!("Connection: close\r\nHost: {host}\r\n\r\n")),
            FragmentPlan::NONE,
        ),
        plain(
            "header fragmentation, hoSt and no space",
            request(&get, &format!("hoSt:{host}\r\nConnection: close\r\n\r\n")),
            HEADER_FRAGMENTS,
        ),
        plain("7 KB of data before Host", padded(7, 1000), FragmentPlan::NONE),
        plain("15 KB of data before Host", padded(15, 1000), FragmentPlan::NONE),
        plain("21 KB of data before Host", padded(7, 3000), FragmentPlan::NONE),
    ]
}

/// The evasion matrix over the DPI target set
pub struct DpiMatrix<'a> {
    transport: &'a dyn Transport,
    resolver: &'a dyn NameResolver,
    ipv6: bool,
}

impl<'a> DpiMatrix<'a> {
    /// Create a matrix; `ipv6` only changes the transcript since cases go over IPv4
    pub fn new(transport: &'a dyn Transport, resolver: &'a dyn NameResolver, ipv6: bool) -> Self {
        Self {
            transport,
            resolver,
            ipv6,
        }
    }

    /// Run every case against every target and collect the labels that got through.
    ///
    /// Target addresses are taken from `ctx.addresses` when already known
    /// under the host name and recorded there otherwise.
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub fn run(&self, targets: &[DpiTarget], ctx: &mut RunContext) -> Result<BTreeSet<String>> {
        if self.ipv6 {
            ctx.note("[O] Testing DPI evasion (IPv4 only)");
        } else {
            ctx.note("[O] Testing DPI evasion");
        }

        let mut sorted: Vec<&DpiTarget> = targets.iter().collect();
        sorted.sort_by(|a, b| a.host.cmp(&b.host));

        let mut labels = BTreeSet::new();
        for target in sorted {
            ctx.checkpoint()?;
            let mut log = ProbeLog::new();
            let known = ctx.addresses.get(&target.host).v4;
            let Some(ip) = known.or_else(|| self.target_ip(target, &mut log)) else {
                log.note(format!("[?] No IPv4 address for {}, skipping", target.host));
                ctx.absorb(log);
                continue;
            };
            ctx.absorb(log);
            if known.is_none() {
                let addrs = TargetAddresses {
                    v4: Some(ip),
                    v6: None,
                };
                ctx.addresses.insert(target.host.as_str(), addrs);
            }

            for case in build_cases(&target.host, &target.urn, &target.expected_marker) {
                ctx.checkpoint()?;
                ctx.note(format!("\tTrying \"{}\" on {}", case.label, target.host));
                if let Some(label) = self.try_case(ip, &case, &mut ctx.log) {
                    labels.insert(label.to_string());
                }
            }
        }
        Ok(labels)
    }

    fn target_ip(&self, target: &DpiTarget, log: &mut ProbeLog) -> Option<IpAddr> {
        lookup_real_ip(self.resolver, &target.host, RecordKind::A, log)
            .or(target.ipv4.map(IpAddr::V4))
    }

    /// Send one case; network errors are logged and count as a failure
    fn try_case(&self, ip: IpAddr, case: &DpiCase, log: &mut ProbeLog) -> Option<&'static str> {
        let response = match self.transport.raw_send(ip, HTTP_PORT, &case.request, case.plan) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(label = case.label, error = %e, "DPI case failed");
                log.note(format!("[☠] Error: {e}"));
                return None;
            }
        };
        let text = String::from_utf8_lossy(&response);
        debug!(label = case.label, bytes = response.len(), "DPI case response");

        match classify_response(&text, &case.expected_marker) {
            CaseOutcome::Success => {
                log.note("[✓] The site opens");
                Some(case.label)
            }
            CaseOutcome::PassiveDpi => {
                log.note("[!] The site does not open, passive DPI detected!");
                Some(PASSIVE_DPI_LABEL)
            }
            CaseOutcome::Failure => {
                log.note("[☠] The site does not open");
                None
            }
        }
    }
}
