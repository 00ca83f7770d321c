//! Raw TCP exchange for the DPI matrix
//!
//! The request bytes go out exactly as given, split according to the
//! [`FragmentPlan`]. Nagle is disabled for fragmented plans so every slice
//! leaves as its own segment.

use blockcheck_core::{FragmentPlan, TransportError};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::{Duration, Instant};
use tracing::trace;

const READ_CHUNK: usize = 8192;

/// Timeouts of one raw exchange
#[derive(Debug, Clone, Copy)]
pub struct RawTimeouts {
    /// TCP connect timeout
    pub connect: Duration,
    /// Per-read and per-write timeout
    pub io: Duration,
    /// Deadline for the whole exchange, counted from the connect
    pub total: Duration,
}

impl Default for RawTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            io: Duration::from_secs(10),
            total: Duration::from_secs(15),
        }
    }
}

/// Connect, write the request slices, read until the peer closes.
///
/// A peer that keeps the connection open past `timeouts.total` fails the
/// exchange with [`io::ErrorKind::TimedOut`].
pub fn exchange(
    ip: IpAddr,
    port: u16,
    request: &[u8],
    plan: FragmentPlan,
    timeouts: RawTimeouts,
) -> Result<Vec<u8>, TransportError> {
    let addr = SocketAddr::new(ip, port);
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if plan.is_fragmented() {
        socket.set_nodelay(true)?;
    }
    socket
        .connect_timeout(&addr.into(), timeouts.connect)
        .map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    let deadline = Instant::now() + timeouts.total;
    socket.set_read_timeout(Some(timeouts.io))?;
    socket.set_write_timeout(Some(timeouts.io))?;

    let mut stream: TcpStream = socket.into();
    for (i, slice) in plan.split(request).into_iter().enumerate() {
        trace!(%addr, write = i, len = slice.len(), "raw write");
        stream.write_all(slice)?;
    }

    let mut response = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out());
        }
        stream.set_read_timeout(Some(remaining.min(timeouts.io)))?;
        let n = match stream.read(&mut buf) {
            Ok(n) => n,
            // unix reports an expired read timeout as WouldBlock
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Err(timed_out());
            }
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            break;
        }
        response.extend_from_slice(&buf[..n]);
    }
    Ok(response)
}

fn timed_out() -> TransportError {
    io::Error::new(io::ErrorKind::TimedOut, "peer did not close the connection in time").into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn echo_once(reply: &'static [u8]) -> (SocketAddr, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
            let mut seen = Vec::new();
            let mut buf = [0u8; 256];
            // read until the request terminator
            while !seen.ends_with(b"\r\n\r\n") {
                let n = conn.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
            }
            conn.write_all(reply).unwrap();
            seen
        });
        (addr, handle)
    }

    #[test]
    fn test_exchange_reads_until_close() {
        let (addr, server) = echo_once(b"HTTP/1.1 200 OK\r\n\r\nhello");
        let request = b"GET / HTTP/1.0\r\nHost: a.example\r\n\r\n";

        let response =
            exchange(addr.ip(), addr.port(), request, FragmentPlan::NONE, RawTimeouts::default())
                .unwrap();

        assert_eq!(response, b"HTTP/1.1 200 OK\r\n\r\nhello");
        assert_eq!(server.join().unwrap(), request.to_vec());
    }

    #[test]
    fn test_fragmented_request_arrives_intact() {
        let (addr, server) = echo_once(b"HTTP/1.1 200 OK\r\n\r\n");
        let request = b"GET /forum HTTP/1.0\r\nHost: a.example\r\n\r\n";

        let plan = FragmentPlan::new(2, 6);
        exchange(addr.ip(), addr.port(), request, plan, RawTimeouts::default()).unwrap();

        assert_eq!(server.join().unwrap(), request.to_vec());
    }

    #[test]
    fn test_connect_refused() {
        // bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let timeouts = RawTimeouts {
            connect: Duration::from_secs(2),
            io: Duration::from_secs(2),
            total: Duration::from_secs(2),
        };
        let ip = "127.0.0.1".parse().unwrap();
        let err = exchange(ip, port, b"x", FragmentPlan::NONE, timeouts).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[test]
    fn test_trickling_peer_hits_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            // one byte every 100 ms, never closing on its own
            for _ in 0..50 {
                if conn.write_all(b"x").is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(100));
            }
        });
        let timeouts = RawTimeouts {
            connect: Duration::from_secs(2),
            io: Duration::from_secs(2),
            total: Duration::from_millis(500),
        };

        let started = Instant::now();
        let request = b"GET / HTTP/1.0\r\n\r\n";
        let err =
            exchange(addr.ip(), addr.port(), request, FragmentPlan::NONE, timeouts).unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(3));
        match err {
            TransportError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("unexpected error: {other}"),
        }
    }
}
