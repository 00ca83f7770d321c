//! Error types for blockcheck-net
//!
//! Only building a collaborator can fail. Once built, every probe failure is
//! folded into the collaborator contracts (`ResolveError`, status sentinels,
//! `Availability::Unknown`).

use thiserror::Error;

/// Failure to construct a network collaborator
#[derive(Error, Debug)]
pub enum NetError {
    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// System resolver configuration could not be read or used
    #[error("Resolver configuration error: {0}")]
    Resolver(String),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// A configured URL is malformed
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Parser message
        message: String,
    },

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`NetError`]
pub type Result<T> = std::result::Result<T, NetError>;

impl NetError {
    /// Create an invalid URL error
    pub fn invalid_url(url: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetError::invalid_url("htp:/x", "relative URL without a base");
        assert!(err.to_string().contains("htp:/x"));
        assert!(err.to_string().contains("relative URL"));

        let err = NetError::Resolver("no nameservers".into());
        assert_eq!(err.to_string(), "Resolver configuration error: no nameservers");
    }
}
