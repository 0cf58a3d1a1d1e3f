//! Threat intelligence providers.

pub mod abuseipdb;

use crate::record::ReputationReport;
use async_trait::async_trait;
use std::net::IpAddr;

/// Broad classification of provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Transport, timeout, authentication, or rate limit failure, or a
    /// lookup that never completed.
    Unavailable,
    /// The provider answered with a non-success status or an unexpected
    /// body.
    Malformed,
}

/// Error from a reputation provider.
#[derive(Debug)]
pub enum ProviderError {
    /// HTTP request failed.
    Http(reqwest::Error),
    /// Timeout.
    Timeout,
    /// Rate limited.
    RateLimited,
    /// API key rejected.
    Unauthorized,
    /// Invalid response.
    InvalidResponse(String),
    /// Other error.
    Other(String),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Http(_)
            | ProviderError::Timeout
            | ProviderError::RateLimited
            | ProviderError::Unauthorized
            | ProviderError::Other(_) => ProviderErrorKind::Unavailable,
            ProviderError::InvalidResponse(_) => ProviderErrorKind::Malformed,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Http(e) => write!(f, "HTTP error: {}", e),
            ProviderError::Timeout => write!(f, "Request timed out"),
            ProviderError::RateLimited => write!(f, "Rate limited"),
            ProviderError::Unauthorized => write!(f, "API key rejected"),
            ProviderError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            ProviderError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProviderError::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Http(e)
        }
    }
}

/// Trait for threat intelligence providers.
///
/// Every call performs a single outbound request and holds no state between
/// calls, so callers may retry freely.
#[async_trait]
pub trait ReputationProvider: Send + Sync {
    /// Fetch up to `limit` currently flagged IPs, in provider ranking order.
    async fn list_flagged(&self, limit: usize) -> Result<Vec<IpAddr>, ProviderError>;

    /// Look up the reputation of a single IP.
    async fn check(&self, ip: &IpAddr) -> Result<ReputationReport, ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}
