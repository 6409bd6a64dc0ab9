//! External reputation providers

pub mod abuseipdb;
pub mod shodan;
pub mod virustotal;

use async_trait::async_trait;
use serde_json::Value;
use std::net::IpAddr;

use crate::models::AnalysisOptions;

/// Outcome of a single provider fetch.
///
/// Providers never return `Err` past this boundary; every failure mode
/// (missing credentials, network error, HTTP status, timeout) collapses into
/// one of these variants. A result is consumed exactly once by the
/// aggregation pass that requested it.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResult {
    /// Raw payload in the provider's native shape; `source` names the
    /// upstream that actually answered when the provider has a fallback.
    Success {
        payload: Value,
        source: Option<String>,
    },
    /// Skipped without a network call, typically for missing credentials.
    Unavailable { reason: String },
    /// Upstream rate limit (HTTP 429), with the reset hint if one was sent.
    RateLimited { retry_after: Option<u64> },
    /// Network error, timeout, or unexpected response.
    Failed { message: String },
}

/// A single external reputation source.
#[async_trait]
pub trait IntelProvider: Send + Sync {
    /// Provider name, used as the normalization key and verdict map key.
    fn name(&self) -> &'static str;

    /// Whether this provider has the credentials it needs to answer.
    fn is_configured(&self) -> bool;

    /// Fetch raw reputation data for an IP. Never panics or errors; all
    /// failures are folded into the returned variant.
    async fn fetch(&self, ip: IpAddr, options: &AnalysisOptions) -> ProviderResult;
}

/// Fold a transport error into a `ProviderResult`.
pub(crate) fn transport_failure(provider: &str, err: reqwest::Error) -> ProviderResult {
    if err.is_timeout() {
        tracing::warn!(provider, "request timed out");
        ProviderResult::Failed {
            message: "request timed out".to_string(),
        }
    } else {
        tracing::warn!(provider, error = %err, "request failed");
        ProviderResult::Failed {
            message: err.to_string(),
        }
    }
}

/// Parse a Retry-After style header into seconds.
pub(crate) fn retry_after_seconds(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
