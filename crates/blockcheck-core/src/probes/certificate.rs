//! Certificate prober
//!
//! Opens each HTTPS reference site on the address the DNS API reports,
//! keeping the real hostname for SNI and verification, and looks for forged
//! certificates.

use super::oracle::OracleGate;
use super::{lookup_real_ip, run_per_target};
use crate::context::{ProbeLog, RunContext};
use crate::error::Result;
use crate::model::{url_host, HttpStatus};
use crate::report::CertVerdict;
use crate::traits::{Availability, FetchOptions, NameResolver, RecordKind, Transport};
use tracing::instrument;

/// Outcome for a single HTTPS site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteCertificate {
    /// Handshake completed with a valid certificate
    Valid,
    /// Certificate validation failed
    Substituted,
    /// Connection failed while the site is up for everyone else
    Blocked,
    /// Connection failed and the site is down for everyone
    Down,
    /// Connection failed and the oracle could not tell
    Unconfirmed,
}

/// Aggregate per-site outcomes. Any forged certificate wins over blocking.
pub fn classify_certificates(sites: &[SiteCertificate]) -> CertVerdict {
    if sites.contains(&SiteCertificate::Substituted) {
        CertVerdict::Substituted
    } else if sites.contains(&SiteCertificate::Blocked) {
        CertVerdict::Blocked
    } else if sites.iter().all(|s| *s == SiteCertificate::Valid) {
        CertVerdict::Ok
    } else {
        CertVerdict::Inconclusive
    }
}

/// Certificate prober over the HTTPS target set
pub struct CertificateProber<'a> {
    transport: &'a dyn Transport,
    resolver: &'a dyn NameResolver,
    oracle: OracleGate<'a>,
    parallel: bool,
}

impl<'a> CertificateProber<'a> {
    /// Create a prober
    pub fn new(
        transport: &'a dyn Transport,
        resolver: &'a dyn NameResolver,
        oracle: OracleGate<'a>,
    ) -> Self {
        Self {
            transport,
            resolver,
            oracle,
            parallel: false,
        }
    }

    /// Probe sites on worker threads
    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// Probe every site and classify
    #[instrument(skip_all, fields(sites = urls.len()))]
    pub fn run(&self, urls: &[String], ctx: &mut RunContext) -> Result<CertVerdict> {
        ctx.note("[O] Testing HTTPS");

        let mut sorted: Vec<&String> = urls.iter().collect();
        sorted.sort();

        let cancel = ctx.cancel_token().clone();
        let results =
            run_per_target(&sorted, self.parallel, &cancel, |url, log| self.probe(url, log))?;

        let mut sites = Vec::with_capacity(results.len());
        for (site, log) in results {
            ctx.absorb(log);
            if site == SiteCertificate::Unconfirmed {
                ctx.health.oracle_broken = true;
            }
            sites.push(site);
        }
        ctx.checkpoint()?;

        Ok(classify_certificates(&sites))
    }

    fn probe(&self, url: &str, log: &mut ProbeLog) -> SiteCertificate {
        log.note(format!("\tOpening {url}"));

        let ip = match url_host(url) {
            Ok(host) => lookup_real_ip(self.resolver, &host, RecordKind::A, log),
            Err(e) => {
                log.debug(format!("Bad HTTPS target {url}: {e}"));
                None
            }
        };
        if ip.is_none() {
            log.debug(format!("Can't resolve IP for {url}, connecting by name"));
        }

        let response = self
            .transport
            .fetch(url, &FetchOptions::direct().with_ip(ip).no_redirects());
        match response.status {
            HttpStatus::CertError => {
                log.note("[☠] The certificate is substituted");
                SiteCertificate::Substituted
            }
            HttpStatus::NetworkError => {
                log.note("[☠] The site does not open");
                match self.oracle.check(url, log) {
                    Availability::Up => SiteCertificate::Blocked,
                    Availability::Down => SiteCertificate::Down,
                    Availability::Unknown => SiteCertificate::Unconfirmed,
                }
            }
            HttpStatus::Code(_) => {
                log.note("[✓] The site opens");
                SiteCertificate::Valid
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::SiteCertificate::*;

    #[test]
    fn test_substituted_wins() {
        assert_eq!(classify_certificates(&[Valid, Blocked, Substituted]), CertVerdict::Substituted);
    }

    #[test]
    fn test_blocked() {
        assert_eq!(classify_certificates(&[Valid, Blocked, Down]), CertVerdict::Blocked);
    }

    #[test]
    fn test_all_valid() {
        assert_eq!(classify_certificates(&[Valid, Valid]), CertVerdict::Ok);
        assert_eq!(classify_certificates(&[]), CertVerdict::Ok);
    }

    #[test]
    fn test_oracle_issues_make_inconclusive() {
        assert_eq!(classify_certificates(&[Valid, Down]), CertVerdict::Inconclusive);
        assert_eq!(classify_certificates(&[Valid, Unconfirmed]), CertVerdict::Inconclusive);
    }
}
