//! Resolver battery
//!
//! Resolves the same reference domains through four independent paths and
//! compares the answers to tell spoofing apart from redirection.

use crate::context::RunContext;
use crate::error::Result;
use crate::model::AddressSet;
use crate::report::DnsVerdict;
use crate::traits::{NameResolver, RecordKind, ResolveError};
use std::net::IpAddr;
use tracing::instrument;

/// Answers collected through each resolution path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsObservation {
    /// System (ISP) resolver
    pub system: AddressSet,
    /// Trusted public resolver
    pub public: AddressSet,
    /// DNS-over-HTTPS style API
    pub api: AddressSet,
    /// Address where nothing should answer
    pub fake: AddressSet,
}

impl DnsObservation {
    /// Classify the four answer sets. Rules are checked in order; the first match wins.
    pub fn classify(&self) -> DnsVerdict {
        let Self {
            system,
            public,
            api,
            fake,
        } = self;

        if system.is_empty() {
            return DnsVerdict::SystemResolverBroken;
        }
        if public.is_empty() {
            return DnsVerdict::ThirdPartyResolverBlocked;
        }
        if api.is_empty() {
            return DnsVerdict::ApiUnreachable;
        }

        if system == public {
            if fake.is_empty() && system.len() == api.len() {
                return DnsVerdict::NoTampering;
            }
            if system == api {
                return DnsVerdict::RedirectedOnly;
            }
            return DnsVerdict::TamperedAndRedirected;
        }

        if public == api {
            return DnsVerdict::TamperedOnly;
        }
        if !fake.is_empty() {
            return DnsVerdict::TamperedAndRedirected;
        }

        DnsVerdict::Undetermined
    }
}

/// Which path a query goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Path {
    Server(Option<IpAddr>),
    Api,
}

/// Resolve through an ordered nameserver list.
///
/// A timeout moves on to the next server; any other answer, successful or
/// not, is final. Running out of servers yields [`ResolveError::NoAnswer`].
pub fn resolve_in_order<F>(
    servers: &[IpAddr],
    mut query: F,
) -> std::result::Result<AddressSet, ResolveError>
where
    F: FnMut(IpAddr) -> std::result::Result<AddressSet, ResolveError>,
{
    for server in servers {
        match query(*server) {
            Err(ResolveError::Timeout) => {
                tracing::debug!(%server, "DNS timeout, trying next nameserver");
            }
            other => return other,
        }
    }
    Err(ResolveError::NoAnswer)
}

/// The resolver battery for one address family
pub struct DnsBattery<'a> {
    resolver: &'a dyn NameResolver,
    domains: &'a [String],
    public: IpAddr,
    fake: IpAddr,
}

impl<'a> DnsBattery<'a> {
    /// Create a battery comparing `domains` through `public` and `fake`
    pub fn new(
        resolver: &'a dyn NameResolver,
        domains: &'a [String],
        public: IpAddr,
        fake: IpAddr,
    ) -> Self {
        Self {
            resolver,
            domains,
            public,
            fake,
        }
    }

    /// Query every path and classify the result
    #[instrument(skip(self, ctx), fields(domains = self.domains.len()))]
    pub fn run(&self, kind: RecordKind, ctx: &mut RunContext) -> Result<DnsVerdict> {
        ctx.note(format!("[O] Testing {} DNS", kind.family()));

        let observation = self.observe(kind, ctx)?;
        ctx.note(format!("\tVia system DNS:\t{}", observation.system));
        if observation.public.is_empty() {
            ctx.note("\tCould not reach the public DNS server");
        } else {
            ctx.note(format!("\tVia public DNS:\t{}", observation.public));
        }
        if observation.api.is_empty() {
            ctx.note("\tCould not reach the DNS API");
        } else {
            ctx.note(format!("\tVia DNS API:\t{}", observation.api));
        }
        if observation.fake.is_empty() {
            ctx.note("\tThe unreachable DNS server returned nothing (this is not an error)");
        } else {
            ctx.note(format!("\tVia unreachable DNS:\t{}", observation.fake));
        }

        let verdict = observation.classify();
        self.describe(verdict, ctx);
        Ok(verdict)
    }

    /// Collect the four answer sets. The fake resolver is asked about the first domain only.
    pub fn observe(&self, kind: RecordKind, ctx: &mut RunContext) -> Result<DnsObservation> {
        let system = self.collect(self.domains, kind, Path::Server(None), ctx)?;
        let public = self.collect(self.domains, kind, Path::Server(Some(self.public)), ctx)?;
        let api = self.collect(self.domains, kind, Path::Api, ctx)?;
        let fake = self.collect(
            &self.domains[..self.domains.len().min(1)],
            kind,
            Path::Server(Some(self.fake)),
            ctx,
        )?;
        Ok(DnsObservation {
            system,
            public,
            api,
            fake,
        })
    }

    fn collect(
        &self,
        domains: &[String],
        kind: RecordKind,
        path: Path,
        ctx: &mut RunContext,
    ) -> Result<AddressSet> {
        let mut set = AddressSet::new();
        for domain in domains {
            ctx.checkpoint()?;
            let answer = match path {
                Path::Server(server) => self.resolver.resolve(domain, kind, server),
                Path::Api => self.resolver.resolve_via_api(domain, kind),
            };
            match answer {
                Ok(addrs) => {
                    ctx.debug(format!("{domain} {kind} via {path:?}: {addrs}"));
                    set.extend(addrs);
                }
                Err(ResolveError::NameNotFound) => ctx.note(format!(
                    "[!] Cannot get a DNS record for {domain} (NXDOMAIN). \
                     Results may be inaccurate."
                )),
                Err(ResolveError::NoAnswer) => ctx.debug(format!("DNS NoAnswer: {domain}")),
                Err(ResolveError::Timeout) => ctx.debug(format!("DNS timeout: {domain}")),
                Err(ResolveError::Api(reason)) => {
                    ctx.debug(format!("DNS API failed for {domain}: {reason}"));
                }
                Err(ResolveError::Resolution(reason)) => {
                    ctx.debug(format!("DNS exception for {domain}: {reason}"));
                    ctx.health.raise_internal(format!("DNS error resolving {domain}: {reason}"));
                }
            }
        }
        Ok(set)
    }

    fn describe(&self, verdict: DnsVerdict, ctx: &mut RunContext) {
        match verdict {
            DnsVerdict::SystemResolverBroken => {
                ctx.note("[?] Failed to resolve addresses via the system DNS");
                ctx.health.raise_internal("system resolver returned nothing");
            }
            DnsVerdict::ThirdPartyResolverBlocked => {
                ctx.note("[☠] Third-party DNS servers are blocked");
            }
            DnsVerdict::ApiUnreachable => {
                ctx.note("[?] Could not reach the DNS API. The DNS check is broken.");
                ctx.health.raise_internal("DNS API returned nothing");
            }
            DnsVerdict::NoTampering => {
                ctx.note("[✓] DNS records are not spoofed");
                ctx.note("[✓] DNS is not redirected");
            }
            DnsVerdict::RedirectedOnly => {
                ctx.note("[✓] DNS records are not spoofed");
                ctx.note("[☠] DNS is redirected");
            }
            DnsVerdict::TamperedOnly => {
                ctx.note("[☠] DNS records are spoofed");
                ctx.note("[✓] DNS is not redirected");
            }
            DnsVerdict::TamperedAndRedirected => {
                ctx.note("[☠] DNS records are spoofed");
                ctx.note("[☠] DNS is redirected");
            }
            DnsVerdict::Undetermined => {
                ctx.note(
                    "[?] Could not determine the DNS blocking method. \
                     Make sure you are using your provider's DNS, not a third-party one.",
                );
                ctx.health.raise_internal("DNS verdict undetermined");
            }
        }
    }
}
