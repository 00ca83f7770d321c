//! HTTP(S) transport
//!
//! Implements [`Transport`] on top of `reqwest`'s blocking client. A client is
//! built per fetch because the address override and the relay are client
//! settings. Every failure folds into the status sentinels.

use crate::error::Result;
use crate::raw::{self, RawTimeouts};
use crate::tls::{CertificateCheck, Handshake};
use blockcheck_core::config::Config;
use blockcheck_core::{
    FetchOptions, FetchResponse, FragmentPlan, HttpStatus, Transport, TransportError,
};
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::Proxy;
use std::fmt::Write as _;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const MAX_REDIRECTS: usize = 10;
const HTTPS_PORT: u16 = 443;

/// Real transport
pub struct HttpTransport {
    user_agent: String,
    connect_timeout: Duration,
    fetch_timeout: Duration,
    certificates: CertificateCheck,
    raw: RawTimeouts,
}

impl HttpTransport {
    /// Create a transport with the configured timeouts and User-Agent
    pub fn new(config: &Config) -> Result<Self> {
        let connect_timeout = config.probes.connect_timeout();
        Ok(Self {
            user_agent: config.general.user_agent.clone(),
            connect_timeout,
            fetch_timeout: config.probes.fetch_timeout(),
            certificates: CertificateCheck::new(connect_timeout)?,
            raw: RawTimeouts {
                connect: connect_timeout,
                io: connect_timeout,
                total: config.probes.fetch_timeout(),
            },
        })
    }

    fn client(&self, url: &Url, options: &FetchOptions) -> reqwest::Result<Client> {
        let policy = if options.follow_redirects {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };
        let mut builder = Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(self.connect_timeout)
            .timeout(self.fetch_timeout)
            .danger_accept_invalid_certs(true)
            .redirect(policy);

        if let (Some(ip), Some(host)) = (options.override_ip, url.host_str()) {
            // port 0 keeps the port of the URL
            builder = builder.resolve(host, SocketAddr::new(ip, 0));
        }
        // https targets tunnel through the relay with CONNECT
        builder = match &options.via_relay {
            Some(relay) => builder.proxy(Proxy::all(format!("http://{relay}"))?),
            None => builder.no_proxy(),
        };
        builder.build()
    }

    /// Validate the certificate of an HTTPS URL.
    ///
    /// Returns the sentinel to report when the fetch must not proceed.
    fn precheck(&self, url: &Url, override_ip: Option<IpAddr>) -> Option<HttpStatus> {
        if url.scheme() != "https" {
            return None;
        }
        let host = url.host_str()?;
        let port = url.port_or_known_default().unwrap_or(HTTPS_PORT);
        let addr = match override_ip {
            Some(ip) => SocketAddr::new(ip, port),
            None => match (host, port).to_socket_addrs().ok().and_then(|mut a| a.next()) {
                Some(addr) => addr,
                None => {
                    debug!(host, "could not resolve host for the certificate check");
                    return Some(HttpStatus::NetworkError);
                }
            },
        };
        match self.certificates.handshake(host, addr) {
            Handshake::Valid => None,
            Handshake::CertificateRejected => Some(HttpStatus::CertError),
            Handshake::Failed => Some(HttpStatus::NetworkError),
        }
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str, options: &FetchOptions) -> FetchResponse {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(url, error = %e, "malformed URL");
                return FetchResponse::network_error();
            }
        };

        if options.via_relay.is_none() {
            if let Some(status) = self.precheck(&parsed, options.override_ip) {
                return FetchResponse::new(status, "");
            }
        }

        let client = match self.client(&parsed, options) {
            Ok(client) => client,
            Err(e) => {
                warn!(url, error = %e, "could not build HTTP client");
                return FetchResponse::network_error();
            }
        };

        let response = match client.get(parsed).send() {
            Ok(response) => response,
            Err(e) => {
                debug!(url, ?options, error = %e, "fetch failed");
                return FetchResponse::network_error();
            }
        };

        let status = response.status().as_u16();
        let headers = options.include_headers.then(|| render_headers(response.headers()));
        match response.text() {
            Ok(body) => {
                let body = match headers {
                    Some(mut head) => {
                        head.push_str(&body);
                        head
                    }
                    None => body,
                };
                debug!(url, status, len = body.len(), "fetched");
                FetchResponse::new(HttpStatus::Code(status), body)
            }
            Err(e) => {
                debug!(url, status, error = %e, "body read failed");
                FetchResponse::network_error()
            }
        }
    }

    fn raw_send(
        &self,
        ip: IpAddr,
        port: u16,
        request: &[u8],
        plan: FragmentPlan,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        raw::exchange(ip, port, request, plan, self.raw)
    }
}

/// Header block followed by the blank separator line
fn render_headers(headers: &HeaderMap) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        let _ = writeln!(out, "{}: {}", name, value.to_str().unwrap_or_default());
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const OK_REPLY: &str = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";

    /// Serve one canned response, return what the client sent
    fn serve_once(reply: &'static str) -> (SocketAddr, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; 1024];
            while !seen.ends_with(b"\r\n\r\n") {
                let n = conn.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
            }
            conn.write_all(reply.as_bytes()).unwrap();
            String::from_utf8_lossy(&seen).into_owned()
        });
        (addr, handle)
    }

    fn transport() -> HttpTransport {
        let mut config = Config::default();
        config.probes.connect_timeout_secs = 3;
        config.probes.fetch_timeout_secs = 5;
        HttpTransport::new(&config).unwrap()
    }

    // =========== Header Rendering Tests ===========

    #[test]
    fn test_render_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("server", HeaderValue::from_static("nginx"));
        headers.insert("location", HeaderValue::from_static("http://warning.example/"));
        let text = render_headers(&headers);
        assert!(text.contains("server: nginx\n"));
        assert!(text.contains("location: http://warning.example/\n"));
        assert!(text.ends_with("\n\n"));
    }

    // =========== Fetch Tests ===========

    #[test]
    fn test_malformed_url_is_network_error() {
        let response = transport().fetch("not a url", &FetchOptions::direct());
        assert_eq!(response.status, HttpStatus::NetworkError);
    }

    #[test]
    fn test_fetch_status_and_headers() {
        let (addr, server) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 5\r\nX-Test: yes\r\n\
             Connection: close\r\n\r\nnope!",
        );
        let url = format!("http://{addr}/page");

        let response = transport().fetch(&url, &FetchOptions::direct().with_headers());

        assert_eq!(response.status, HttpStatus::Code(404));
        assert!(response.body.contains("x-test: yes"));
        assert!(response.body.ends_with("\n\nnope!"));
        assert!(server.join().unwrap().starts_with("GET /page HTTP/1.1"));
    }

    #[test]
    fn test_fetch_with_override_ip_keeps_host() {
        let (addr, server) = serve_once(OK_REPLY);
        let url = format!("http://blocked.example:{}/", addr.port());

        let response = transport().fetch(&url, &FetchOptions::direct().with_ip(Some(addr.ip())));

        assert_eq!(response.status, HttpStatus::Code(200));
        assert_eq!(response.body, "ok");
        let request = server.join().unwrap().to_ascii_lowercase();
        assert!(request.contains(&format!("host: blocked.example:{}", addr.port())));
    }

    #[test]
    fn test_fetch_through_relay_uses_absolute_form() {
        let (relay, server) = serve_once(OK_REPLY);

        let response = transport().fetch(
            "http://blocked.example/",
            &FetchOptions::direct().with_relay(relay.to_string()),
        );

        assert_eq!(response.status, HttpStatus::Code(200));
        assert!(server.join().unwrap().starts_with("GET http://blocked.example/ HTTP/1.1"));
    }

    #[test]
    fn test_https_fetch_through_relay_tunnels() {
        let (relay, server) = serve_once("HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n");

        let response = transport().fetch(
            "https://blocked.example/",
            &FetchOptions::direct().with_relay(relay.to_string()),
        );

        // the relay refused the tunnel, but it was asked for one
        assert_eq!(response.status, HttpStatus::NetworkError);
        assert!(server.join().unwrap().starts_with("CONNECT blocked.example:443 HTTP/1.1"));
    }

    #[test]
    fn test_redirect_not_followed() {
        let (addr, _server) = serve_once(
            "HTTP/1.1 302 Found\r\nLocation: http://warning.example/\r\n\
             Content-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let url = format!("http://{addr}/");

        let response = transport().fetch(&url, &FetchOptions::direct().no_redirects());

        assert_eq!(response.status, HttpStatus::Code(302));
    }

    #[test]
    fn test_https_precheck_refused_is_network_error() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let url = format!("https://a.example:{port}/");
        let options = FetchOptions::direct().with_ip(Some("127.0.0.1".parse().unwrap()));
        let response = transport().fetch(&url, &options);
        assert_eq!(response.status, HttpStatus::NetworkError);
    }

    #[test]
    fn test_raw_send_delegates() {
        let (addr, server) = serve_once("HTTP/1.0 200 OK\r\n\r\n");
        let reply = transport()
            .raw_send(addr.ip(), addr.port(), b"GET / HTTP/1.0\r\n\r\n", FragmentPlan::NONE)
            .unwrap();
        assert_eq!(reply, b"HTTP/1.0 200 OK\r\n\r\n");
        server.join().unwrap();
    }
}
