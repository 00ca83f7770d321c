//! Human-readable verdict text

use blockcheck_core::{CertVerdict, DiagnosisReport, DnsVerdict, HttpVerdict, OracleVerdict};

const ENCRYPTED_CHANNEL: &str = "You should use an encrypted channel to DNS servers, \
     such as a VPN, Tor, an HTTPS/SOCKS proxy or DNSCrypt.";

/// Result lines for a finished run
pub fn verdict_lines(report: &DiagnosisReport, oracle_name: &str) -> Vec<String> {
    let mut lines = Vec::new();

    dns_lines(&mut lines, report.dns_v4, "IPv4", "8.8.8.8 and 8.8.4.4");
    if let (true, Some(v6)) = (report.ipv6_tested, report.dns_v6) {
        dns_lines(&mut lines, v6, "IPv6", "2001:4860:4860::8888");
    }

    match report.cert {
        CertVerdict::Ok => {}
        CertVerdict::Substituted => {
            lines.push(
                "[⚠] Your provider substitutes the HTTPS certificate for blacklisted sites.".into(),
            );
        }
        CertVerdict::Blocked => {
            lines
                .push("[⚠] Your provider fully blocks HTTPS access to blacklisted sites.".into());
        }
        CertVerdict::Inconclusive => {
            lines.push("[⚠] HTTPS access could not be verified, repeat the test later.".into());
        }
    }

    if report.subdomain_blocked {
        lines.push("[⚠] Your provider blocks subdomains of blocked domains.".into());
    }

    match report.oracle {
        OracleVerdict::AllUp => {}
        OracleVerdict::OracleBroken => lines.push(format!(
            "[⚠] {oracle_name} gives unexpected answers or is unreachable. \
             Repeat the test when it works again. \
             This version of the program may be outdated. \
             It is also possible, though unlikely, that {oracle_name} itself is blacklisted."
        )),
        OracleVerdict::AllDown => lines.push(format!(
            "[⚠] According to {oracle_name}, none of the tested sites work right now. \
             Make sure you run the latest version of the program and repeat the test later."
        )),
        OracleVerdict::SomeDown => lines.push(format!(
            "[⚠] According to {oracle_name}, some of the tested sites do not work right now. \
             Make sure you run the latest version of the program and repeat the test later."
        )),
    }

    if let Some(message) = http_message(report) {
        lines.push(qualify(report.oracle, oracle_name, "[⚠]", &message));
    } else if report.is_clean() {
        let message = "Your provider does not block sites.";
        lines.push(qualify(report.oracle, oracle_name, "[☺]", message));
    }

    if let Some(dpi) = &report.dpi {
        if dpi.is_empty() {
            lines.push("[✗] None of the DPI evasion methods worked.".into());
        } else {
            let methods: Vec<&str> = dpi.iter().map(String::as_str).collect();
            lines.push(format!("[✓] Working DPI evasion methods: {}", methods.join(", ")));
        }
    }

    if report.health.is_degraded() {
        lines.push(
            "[⁇] The check ran into problems of its own, the results may be inaccurate.".into(),
        );
    }

    lines
}

fn dns_lines(lines: &mut Vec<String>, verdict: DnsVerdict, family: &str, alternatives: &str) {
    let text = match verdict {
        DnsVerdict::NoTampering => return,
        DnsVerdict::Undetermined => format!(
            "[⚠] Could not determine how {family} DNS is blocked.\n \
             Restore your provider's DNS settings if you use a third-party DNS server. \
             If you use your provider's DNS, an upstream provider may be modifying the answers.\n \
             {ENCRYPTED_CHANNEL}"
        ),
        DnsVerdict::ThirdPartyResolverBlocked => {
            format!(
                "[⚠] Your provider blocks third-party {family} DNS servers.\n {ENCRYPTED_CHANNEL}"
            )
        }
        DnsVerdict::TamperedOnly => format!(
            "[⚠] Your provider spoofs DNS records \
             but does not redirect third-party {family} DNS servers.\n \
             Switching DNS will help, for example to Google DNS {alternatives}."
        ),
        DnsVerdict::TamperedAndRedirected => format!(
            "[⚠] Your provider spoofs DNS records \
             and redirects third-party {family} DNS servers to its own.\n \
             {ENCRYPTED_CHANNEL}"
        ),
        DnsVerdict::RedirectedOnly => format!(
            "[⚠] Your provider redirects third-party {family} DNS servers to its own \
             but does not spoof DNS records.\n \
             This is somewhat odd and common on mobile networks.\n \
             {ENCRYPTED_CHANNEL} It will not help bypass blocking, though."
        ),
        DnsVerdict::SystemResolverBroken => format!(
            "[⁇] Your system {family} DNS returned no addresses. \
             Check your network settings and repeat the test."
        ),
        DnsVerdict::ApiUnreachable => {
            format!(
                "[⁇] The reference DNS API was unreachable, \
                 the {family} DNS check is inconclusive."
            )
        }
    };
    lines.push(text);
}

/// Message for the IPv4 HTTP verdict, narrowed to IPv4 when IPv6 disagrees
fn http_message(report: &DiagnosisReport) -> Option<String> {
    let v4 = report.http_v4;
    let scope = match (report.ipv6_tested, report.http_v6) {
        (true, Some(v6)) if v6 != v4 => " for IPv4",
        _ => "",
    };
    match v4 {
        HttpVerdict::NoBlocks => None,
        HttpVerdict::IpBlock => {
            let subject = if scope.is_empty() { "sites" } else { "IPv4 sites" };
            Some(format!(
                "Your provider blocks {subject} by IP address. Use any circumvention method."
            ))
        }
        HttpVerdict::FullDpi => Some(format!(
            "Your provider has \"full\" DPI{scope}. It tracks URLs even inside proxies, \
             so you should use any encrypted connection, such as a VPN or Tor."
        )),
        HttpVerdict::PartialDpi => Some(format!(
            "Your provider has \"regular\" DPI{scope}. \
             An HTTPS/SOCKS proxy, a VPN or Tor will help."
        )),
    }
}

/// Prefix with the symbol, hedged when the oracle saw sites down
fn qualify(oracle: OracleVerdict, oracle_name: &str, symbol: &str, message: &str) -> String {
    if oracle == OracleVerdict::AllUp {
        return format!("{symbol} {message}");
    }
    let mut chars = message.chars();
    let lowered = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!("{symbol} Ignoring {oracle_name}, {lowered}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockcheck_core::{EgressInfo, HealthFlags};
    use std::collections::BTreeSet;

    fn clean() -> DiagnosisReport {
        DiagnosisReport {
            dns_v4: DnsVerdict::NoTampering,
            dns_v6: None,
            http_v4: HttpVerdict::NoBlocks,
            http_v6: None,
            oracle: OracleVerdict::AllUp,
            cert: CertVerdict::Ok,
            subdomain_blocked: false,
            dpi: None,
            ipv6_tested: false,
            egress: EgressInfo::default(),
            health: HealthFlags::default(),
        }
    }

    fn text(report: &DiagnosisReport) -> String {
        verdict_lines(report, "isup.example").join("\n")
    }

    #[test]
    fn test_clean_run() {
        assert_eq!(text(&clean()), "[☺] Your provider does not block sites.");
    }

    #[test]
    fn test_dns_spoofing() {
        let report = DiagnosisReport {
            dns_v4: DnsVerdict::TamperedOnly,
            ..clean()
        };
        let out = text(&report);
        assert!(out.contains("spoofs DNS records but does not redirect third-party IPv4"));
        assert!(out.contains("8.8.8.8"));
    }

    #[test]
    fn test_ipv6_dns_only_when_tested() {
        let report = DiagnosisReport {
            dns_v6: Some(DnsVerdict::ThirdPartyResolverBlocked),
            ..clean()
        };
        assert!(!text(&report).contains("IPv6"));

        let report = DiagnosisReport {
            ipv6_tested: true,
            ..report
        };
        assert!(text(&report).contains("blocks third-party IPv6 DNS servers"));
    }

    #[test]
    fn test_ignoring_oracle_phrasing() {
        let report = DiagnosisReport {
            http_v4: HttpVerdict::FullDpi,
            oracle: OracleVerdict::SomeDown,
            ..clean()
        };
        let out = text(&report);
        assert!(out.contains("[⚠] Ignoring isup.example, your provider has \"full\" DPI."));
        assert!(out.contains("some of the tested sites do not work"));
    }

    #[test]
    fn test_ipv4_only_qualifier() {
        let report = DiagnosisReport {
            http_v4: HttpVerdict::IpBlock,
            http_v6: Some(HttpVerdict::NoBlocks),
            ipv6_tested: true,
            ..clean()
        };
        assert!(text(&report).contains("blocks IPv4 sites by IP address"));

        let report = DiagnosisReport {
            http_v6: Some(HttpVerdict::IpBlock),
            ..report
        };
        assert!(text(&report).contains("blocks sites by IP address"));
    }

    #[test]
    fn test_dpi_methods_listed() {
        let mut methods = BTreeSet::new();
        methods.insert("hoSt".to_string());
        methods.insert("Passive DPI".to_string());
        let report = DiagnosisReport {
            http_v4: HttpVerdict::PartialDpi,
            dpi: Some(methods),
            ..clean()
        };
        let out = text(&report);
        assert!(out.contains("\"regular\" DPI. An HTTPS/SOCKS proxy"));
        assert!(out.contains("Working DPI evasion methods: Passive DPI, hoSt"));
    }

    #[test]
    fn test_certificate_and_subdomain() {
        let report = DiagnosisReport {
            cert: CertVerdict::Substituted,
            subdomain_blocked: true,
            ..clean()
        };
        let out = text(&report);
        assert!(out.contains("substitutes the HTTPS certificate"));
        assert!(out.contains("blocks subdomains"));
        assert!(!out.contains("does not block sites"));
    }

    #[test]
    fn test_degraded_health_noted() {
        let mut report = clean();
        report.health.raise_internal("DNS API returned nothing");
        assert!(text(&report).contains("results may be inaccurate"));
    }
}
