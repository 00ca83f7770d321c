//! Diagnosis codes and the final report
//!
//! The integer values of every code are stable; golden tests and uploaded
//! transcripts depend on them.

use crate::context::HealthFlags;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

macro_rules! stable_code {
    ($name:ident) => {
        impl $name {
            /// Stable integer value
            pub fn code(self) -> u8 {
                self as u8
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:?} ({})", self, self.code())
            }
        }
    };
}

/// How DNS answers are interfered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum DnsVerdict {
    /// Answers are genuine and not redirected
    NoTampering = 0,
    /// Third-party resolver traffic is redirected, answers are untouched
    RedirectedOnly = 1,
    /// Only the default resolver path is spoofed
    TamperedOnly = 2,
    /// Answers are spoofed and third-party resolvers are redirected
    TamperedAndRedirected = 3,
    /// Local resolution returned nothing
    SystemResolverBroken = 4,
    /// Outbound traffic to third-party resolvers is blocked
    ThirdPartyResolverBlocked = 5,
    /// Reference API gave nothing to compare against
    ApiUnreachable = 6,
    /// No rule matched
    Undetermined = 7,
}
stable_code!(DnsVerdict);

/// How plain HTTP access is blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum HttpVerdict {
    /// Every blacklisted target opened directly
    NoBlocks = 0,
    /// Nothing opened directly
    IpBlock = 1,
    /// The relay got through where direct access failed
    PartialDpi = 2,
    /// Some targets failed both directly and through the relay
    FullDpi = 3,
}
stable_code!(HttpVerdict);

impl HttpVerdict {
    /// Any verdict other than `NoBlocks`
    pub fn is_blocked(self) -> bool {
        self != Self::NoBlocks
    }
}

/// Availability oracle cross-check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum OracleVerdict {
    /// Every failing target is up for everyone else
    AllUp = 0,
    /// Some targets are down for everyone
    SomeDown = 1,
    /// All targets are down for everyone
    AllDown = 2,
    /// The oracle gave unusable answers
    OracleBroken = 3,
}
stable_code!(OracleVerdict);

/// TLS certificate check result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum CertVerdict {
    /// Every site presented a valid certificate
    Ok = 0,
    /// A forged certificate was presented
    Substituted = 1,
    /// Sites that are up for everyone cannot be reached
    Blocked = 2,
    /// Some results could not be confirmed
    Inconclusive = 3,
}
stable_code!(CertVerdict);

/// Addresses and network owner seen from the outside
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EgressInfo {
    /// Public IPv4 address
    pub ipv4: Option<IpAddr>,
    /// Public IPv6 address, if IPv6 works
    pub ipv6: Option<IpAddr>,
    /// Autonomous system of the IPv4 address
    pub asn_v4: Option<u32>,
    /// Autonomous system of the IPv6 address
    pub asn_v6: Option<u32>,
    /// Name of the network owning the IPv4 address
    pub isp: Option<String>,
}

/// Everything the engine concluded about one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosisReport {
    /// IPv4 DNS verdict
    pub dns_v4: DnsVerdict,
    /// IPv6 DNS verdict, when IPv6 was tested
    pub dns_v6: Option<DnsVerdict>,
    /// IPv4 HTTP verdict
    pub http_v4: HttpVerdict,
    /// IPv6 HTTP verdict, when IPv6 was tested
    pub http_v6: Option<HttpVerdict>,
    /// Availability oracle cross-check
    pub oracle: OracleVerdict,
    /// TLS certificate verdict
    pub cert: CertVerdict,
    /// Provider blocks subdomains of blocked domains
    pub subdomain_blocked: bool,
    /// Successful evasion labels; `None` when the matrix did not run
    pub dpi: Option<BTreeSet<String>>,
    /// IPv6 was tested in this run
    pub ipv6_tested: bool,
    /// Egress identity
    pub egress: EgressInfo,
    /// Degraded-confidence flags
    pub health: HealthFlags,
}

impl DiagnosisReport {
    /// Nothing is blocked and every cross-check agrees
    pub fn is_clean(&self) -> bool {
        self.oracle == OracleVerdict::AllUp
            && self.http_v4 == HttpVerdict::NoBlocks
            && self.cert == CertVerdict::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_dns_codes() {
        assert_eq!(DnsVerdict::NoTampering.code(), 0);
        assert_eq!(DnsVerdict::RedirectedOnly.code(), 1);
        assert_eq!(DnsVerdict::TamperedOnly.code(), 2);
        assert_eq!(DnsVerdict::TamperedAndRedirected.code(), 3);
        assert_eq!(DnsVerdict::SystemResolverBroken.code(), 4);
        assert_eq!(DnsVerdict::ThirdPartyResolverBlocked.code(), 5);
        assert_eq!(DnsVerdict::ApiUnreachable.code(), 6);
        assert_eq!(DnsVerdict::Undetermined.code(), 7);
    }

    #[test]
    fn test_stable_other_codes() {
        assert_eq!(HttpVerdict::NoBlocks.code(), 0);
        assert_eq!(HttpVerdict::IpBlock.code(), 1);
        assert_eq!(HttpVerdict::PartialDpi.code(), 2);
        assert_eq!(HttpVerdict::FullDpi.code(), 3);
        assert_eq!(OracleVerdict::OracleBroken.code(), 3);
        assert_eq!(CertVerdict::Inconclusive.code(), 3);
    }

    #[test]
    fn test_display_includes_code() {
        assert_eq!(HttpVerdict::PartialDpi.to_string(), "PartialDpi (2)");
    }

    #[test]
    fn test_json_shape() {
        let mut health = HealthFlags::default();
        health.raise_internal("no answer from the system resolver");
        let report = DiagnosisReport {
            dns_v4: DnsVerdict::SystemResolverBroken,
            dns_v6: None,
            http_v4: HttpVerdict::FullDpi,
            http_v6: None,
            oracle: OracleVerdict::SomeDown,
            cert: CertVerdict::Substituted,
            subdomain_blocked: true,
            dpi: Some(["Passive DPI".to_string()].into_iter().collect()),
            ipv6_tested: false,
            egress: EgressInfo::default(),
            health,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["dns_v4"], "SystemResolverBroken");
        assert_eq!(json["dns_v6"], serde_json::Value::Null);
        assert_eq!(json["cert"], "Substituted");
        assert_eq!(json["dpi"][0], "Passive DPI");
        assert_eq!(json["health"]["internal_error"], true);
    }
}
