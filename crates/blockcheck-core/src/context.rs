//! Run context
//!
//! State accumulated during one diagnosis: the transcript shown to the user,
//! the debug transcript, degraded-confidence flags and the cancellation token.
//! Probes running on worker threads write to their own [`ProbeLog`], which is
//! merged back at the single aggregation point.

use crate::error::{Error, Result};
use crate::model::ResolvedAddresses;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Visibility of a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    /// Shown to the user
    Note,
    /// Kept for troubleshooting only
    Debug,
}

/// One transcript line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptLine {
    /// Visibility
    pub kind: LineKind,
    /// Text without trailing newline
    pub text: String,
}

/// Ordered transcript lines of one probe or of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProbeLog {
    lines: Vec<TranscriptLine>,
}

impl ProbeLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user-visible line
    pub fn note(&mut self, text: impl Into<String>) {
        let text = text.into();
        info!("{}", text);
        self.lines.push(TranscriptLine {
            kind: LineKind::Note,
            text,
        });
    }

    /// Record a troubleshooting line
    pub fn debug(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!("{}", text);
        self.lines.push(TranscriptLine {
            kind: LineKind::Debug,
            text,
        });
    }

    /// Append another log, preserving its order
    pub fn merge(&mut self, other: ProbeLog) {
        self.lines.extend(other.lines);
    }

    /// User-visible text
    pub fn text(&self) -> String {
        self.render(false)
    }

    /// User-visible text interleaved with debug lines
    pub fn text_with_debug(&self) -> String {
        self.render(true)
    }

    fn render(&self, with_debug: bool) -> String {
        let mut out = String::new();
        for line in &self.lines {
            if with_debug || line.kind == LineKind::Note {
                out.push_str(&line.text);
                out.push('\n');
            }
        }
        out
    }
}

/// Degraded-confidence flags raised during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthFlags {
    /// The check itself misbehaved; verdicts may be wrong
    pub internal_error: bool,
    /// ASN registry lookups failed, tunnel correlation skipped
    pub registry_unavailable: bool,
    /// The availability oracle gave unusable answers
    pub oracle_broken: bool,
    /// Why the flags were raised
    pub reasons: Vec<String>,
}

impl HealthFlags {
    /// Raise the internal-health flag
    pub fn raise_internal(&mut self, reason: impl Into<String>) {
        self.internal_error = true;
        self.reasons.push(reason.into());
    }

    /// Whether any flag is set
    pub fn is_degraded(&self) -> bool {
        self.internal_error || self.registry_unavailable || self.oracle_broken
    }
}

/// Shared flag telling every probe to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Accumulated state of a diagnosis run
#[derive(Debug, Default)]
pub struct RunContext {
    /// Transcript of the whole run
    pub log: ProbeLog,
    /// Degraded-confidence flags
    pub health: HealthFlags,
    /// Addresses each probe connects to, keyed by target URL or host
    pub addresses: ResolvedAddresses,
    cancel: CancelToken,
}

impl RunContext {
    /// Create a context observing the given token
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            log: ProbeLog::new(),
            health: HealthFlags::default(),
            addresses: ResolvedAddresses::new(),
            cancel,
        }
    }

    /// Shortcut for `log.note`
    pub fn note(&mut self, text: impl Into<String>) {
        self.log.note(text);
    }

    /// Shortcut for `log.debug`
    pub fn debug(&mut self, text: impl Into<String>) {
        self.log.debug(text);
    }

    /// Cancellation token shared with worker threads
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Fail if the user interrupted the run
    pub fn checkpoint(&self) -> Result<()> {
        self.cancel.check()
    }

    /// Merge the log of a finished probe
    pub fn absorb(&mut self, log: ProbeLog) {
        self.log.merge(log);
    }
}
