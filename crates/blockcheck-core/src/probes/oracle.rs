//! Availability oracle gate
//!
//! Decides whether the oracle is asked at all and writes its answers to
//! the transcript.

use crate::context::ProbeLog;
use crate::model::is_https;
use crate::traits::{Availability, AvailabilityOracle};

/// Front of the availability oracle used by the probes
#[derive(Clone, Copy)]
pub struct OracleGate<'a> {
    oracle: &'a dyn AvailabilityOracle,
    enabled: bool,
    name: &'a str,
}

impl<'a> OracleGate<'a> {
    /// Wrap an oracle; a disabled gate treats every site as up
    pub fn new(oracle: &'a dyn AvailabilityOracle, enabled: bool, name: &'a str) -> Self {
        Self {
            oracle,
            enabled,
            name,
        }
    }

    /// Ask whether a failing site is up for everyone else.
    ///
    /// HTTPS URLs answer `Up` without a query since the oracle cannot judge them.
    pub fn check(&self, url: &str, log: &mut ProbeLog) -> Availability {
        if !self.enabled || is_https(url) {
            return Availability::Up;
        }

        log.note(format!("\tChecking availability via {}", self.name));
        let answer = self.oracle.is_up(url);
        match answer {
            Availability::Up => log.note("[☠] The site is up, the problem is on our side"),
            Availability::Down => log.note("[✗] The site is down for everyone"),
            Availability::Unknown => log.note(format!(
                "[⁇] Could not get a usable answer from {}",
                self.name
            )),
        }
        answer
    }
}

impl std::fmt::Debug for OracleGate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleGate")
            .field("enabled", &self.enabled)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize, Availability);

    impl AvailabilityOracle for Counting {
        fn is_up(&self, _url: &str) -> Availability {
            self.0.fetch_add(1, Ordering::SeqCst);
            self.1
        }
    }

    #[test]
    fn test_disabled_gate_answers_up() {
        let oracle = Counting(AtomicUsize::new(0), Availability::Down);
        let gate = OracleGate::new(&oracle, false, "isup.me");
        let mut log = ProbeLog::new();
        assert_eq!(gate.check("http://example.com/", &mut log), Availability::Up);
        assert_eq!(oracle.0.load(Ordering::SeqCst), 0);
        assert!(log.text_with_debug().is_empty());
    }

    #[test]
    fn test_https_short_circuits() {
        let oracle = Counting(AtomicUsize::new(0), Availability::Down);
        let gate = OracleGate::new(&oracle, true, "isup.me");
        let mut log = ProbeLog::new();
        assert_eq!(gate.check("https://example.com/", &mut log), Availability::Up);
        assert_eq!(oracle.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_plain_http_is_forwarded() {
        let oracle = Counting(AtomicUsize::new(0), Availability::Unknown);
        let gate = OracleGate::new(&oracle, true, "isup.me");
        let mut log = ProbeLog::new();
        assert_eq!(gate.check("http://example.com/", &mut log), Availability::Unknown);
        assert_eq!(oracle.0.load(Ordering::SeqCst), 1);
        assert!(log.text().contains("isup.me"));
    }
}
