//! ipsentry
//!
//! Aggregates threat-intelligence signals about an IP address from external
//! reputation providers (AbuseIPDB, VirusTotal, Shodan) and reduces them to
//! a normalized risk verdict: a 0-100 score, a risk level, a human-readable
//! explanation, and an abuse category breakdown.
//!
//! Providers are queried concurrently with settle-all semantics; partial
//! provider failure degrades the verdict's detail, never the request. When
//! no provider can answer, the verdict is explicitly indeterminate rather
//! than clean. Verdicts are cached under a fingerprint of the IP and query
//! options with passive TTL expiry.

pub mod aggregator;
pub mod analysis;
pub mod api;
pub mod cache;
pub mod models;
pub mod providers;
pub mod scoring;
