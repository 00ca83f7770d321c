//! Probe components
//!
//! Each probe drives the collaborator traits and reduces what it observed to
//! one of the diagnosis codes in [`crate::report`]. Probes write to a
//! [`ProbeLog`] per target; logs are merged in target order once the whole
//! set has finished, whether the targets ran sequentially or in parallel.

pub mod certificate;
pub mod dns;
pub mod dpi;
pub mod ipv6;
pub mod oracle;
pub mod reachability;

pub use certificate::{classify_certificates, CertificateProber, SiteCertificate};
pub use dns::{resolve_in_order, DnsBattery, DnsObservation};
pub use dpi::{build_cases, classify_case, CaseOutcome, DpiCase, DpiMatrix, PASSIVE_DPI_LABEL};
pub use ipv6::{is_transition_tunnel, AsnCorrelation, TunnelDetector};
pub use oracle::OracleGate;
pub use reachability::{
    classify_access, classify_oracle, ReachabilityProber, ReachabilityResult, ReachabilityTally,
};

use crate::context::{CancelToken, ProbeLog};
use crate::error::{Error, Result};
use crate::traits::{NameResolver, RecordKind};
use std::net::IpAddr;
use std::sync::mpsc;

/// Ask the DNS API for the address a host really has.
///
/// Every probe does its own lookup; answers are never shared between probes.
pub(crate) fn lookup_real_ip(
    resolver: &dyn NameResolver,
    host: &str,
    kind: RecordKind,
    log: &mut ProbeLog,
) -> Option<IpAddr> {
    match resolver.resolve_via_api(host, kind) {
        Ok(addrs) => addrs.first(),
        Err(e) => {
            log.debug(format!("Can't resolve {kind} for {host} via API: {e}"));
            None
        }
    }
}

/// Run `probe` once per item, optionally on scoped worker threads.
///
/// Results come back in item order with each item's own log. Workers never
/// touch shared state; everything they produce goes through a channel and is
/// collected here.
pub(crate) fn run_per_target<T, R, F>(
    items: &[T],
    parallel: bool,
    cancel: &CancelToken,
    probe: F,
) -> Result<Vec<(R, ProbeLog)>>
where
    T: Sync,
    R: Send,
    F: Fn(&T, &mut ProbeLog) -> R + Sync,
{
    if !parallel || items.len() < 2 {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            cancel.check()?;
            let mut log = ProbeLog::new();
            let result = probe(item, &mut log);
            results.push((result, log));
        }
        return Ok(results);
    }

    let (tx, rx) = mpsc::channel();
    let probe = &probe;
    std::thread::scope(|scope| {
        for (index, item) in items.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move || {
                if cancel.is_cancelled() {
                    return;
                }
                let mut log = ProbeLog::new();
                let result = probe(item, &mut log);
                // receiver outlives the scope
                let _ = tx.send((index, result, log));
            });
        }
    });
    drop(tx);
    cancel.check()?;

    let mut collected: Vec<(usize, R, ProbeLog)> = rx.into_iter().collect();
    if collected.len() != items.len() {
        return Err(Error::Cancelled);
    }
    collected.sort_by_key(|(index, ..)| *index);
    Ok(collected
        .into_iter()
        .map(|(_, result, log)| (result, log))
        .collect())
}
