//! Built-in reference data
//!
//! Sites with a known blocking status and a known page marker. Static
//! addresses are fallbacks only; the probes resolve live addresses first.

use crate::model::{DpiTarget, ReferenceTarget};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Domains compared across resolvers. The first one must have both A and AAAA records.
pub fn dns_domains() -> Vec<String> {
    [
        "rutracker.org",
        "gelbooru.com",
        "e621.net",
        "danbooru.donmai.us",
        "dailymotion.com",
        "zello.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Plain HTTP reachability targets
pub fn http_targets() -> Vec<ReferenceTarget> {
    vec![
        // Not blocked by itself, opens unless the provider runs DPI.
        ReferenceTarget::new("http://novostey.com", 200, "novostey")
            .with_ipv4(Ipv4Addr::new(172, 64, 80, 1))
            .with_ipv6(Ipv6Addr::new(
                0x2606, 0x4700, 0x130, 0x436c, 0x6f75, 0x6466, 0x6c61, 0x7265,
            )),
        ReferenceTarget::new("https://xn----stbgdeb4aai6g.xn--p1ai/", 200, "PoniBooru")
            .with_ipv4(Ipv4Addr::new(37, 1, 203, 158)),
        ReferenceTarget::new("http://a.putinhuylo.com/", 200, "Antizapret")
            .with_ipv4(Ipv4Addr::new(195, 123, 209, 38))
            .subdomain_probe(),
    ]
}

/// TLS certificate targets
pub fn https_targets() -> Vec<String> {
    [
        "https://e621.net/",
        "https://lolibooru.moe/",
        "https://rutracker.org/forum/index.php",
        "https://www.dailymotion.com/",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// DPI evasion matrix targets
pub fn dpi_targets() -> Vec<DpiTarget> {
    vec![
        DpiTarget {
            host: "pbooru.com".into(),
            urn: "/index.php?page=post&s=view&id=304688".into(),
            expected_marker: "Related Posts".into(),
            ipv4: Some(Ipv4Addr::new(104, 28, 10, 65)),
            ipv6: Some(Ipv6Addr::new(0x2400, 0xcb00, 0x2048, 0x1, 0, 0, 0x681c, 0xa41)),
        },
        DpiTarget {
            host: "rutracker.org".into(),
            urn: "/forum/index.php".into(),
            expected_marker: "groupcp.php\"".into(),
            ipv4: Some(Ipv4Addr::new(195, 82, 146, 214)),
            ipv6: Some(Ipv6Addr::new(0x2a02, 0x4680, 0x22, 0, 0, 0, 0, 0x214)),
        },
    ]
}
