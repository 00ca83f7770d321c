//! # Blockcheck Core
//!
//! Transport-independent probe battery and diagnosis engine.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Collaborator traits** - DNS, transport, availability oracle and ASN registry
//! - **Probes** - resolver battery, reachability, certificates, DPI evasion matrix, IPv6 tunnels
//! - **Diagnosis engine** - runs the probes in order and fuses their verdicts
//! - **Configuration** - TOML configuration with built-in reference data
//!
//! ## Example
//!
//! ```rust,ignore
//! use blockcheck_core::{CancelToken, Collaborators, Config, DiagnosisEngine};
//!
//! let config = Config::load("blockcheck.toml")?;
//! let net = Collaborators { resolver: &dns, transport: &http, oracle: &isup, registry: &cymru };
//!
//! let outcome = DiagnosisEngine::new(&config, net).run(CancelToken::new())?;
//! println!("{}", outcome.transcript.text());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod model;
pub mod probes;
pub mod report;
pub mod traits;

// Re-exports for convenience
pub use config::Config;
pub use context::{CancelToken, HealthFlags, ProbeLog, RunContext};
pub use engine::{Collaborators, DiagnosisEngine, RunOutcome};
pub use error::{Error, Result};
pub use model::{AddressSet, DpiTarget, HttpStatus, ProbeOutcome, ReferenceTarget};
pub use report::{CertVerdict, DiagnosisReport, DnsVerdict, EgressInfo, HttpVerdict, OracleVerdict};
pub use traits::{
    Asn, AsnRegistry, Availability, AvailabilityOracle, FetchOptions, FetchResponse, FragmentPlan,
    NameResolver, RecordKind, ResolveError, Transport, TransportError,
};
