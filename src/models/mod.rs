//! Core data models for IP risk analysis

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Risk levels, ordered by severity.
///
/// `Indeterminate` is only ever assigned when no provider could answer;
/// it is never derived from a score and must not be confused with `Clean`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Clean,
    Low,
    Medium,
    High,
    Critical,
    Malicious,
    Indeterminate,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Clean => write!(f, "clean"),
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
            RiskLevel::Malicious => write!(f, "malicious"),
            RiskLevel::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Severity of an abuse category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// An abuse category observed for an IP, with occurrence statistics.
///
/// Recomputed on every analysis pass, never persisted. `unique_reporters`
/// is always <= `count` (a reporter may file multiple reports).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AbuseCategory {
    pub id: i32,
    pub name: String,
    /// Provider whose taxonomy this category belongs to. Categories from
    /// different providers are never conflated.
    pub provider: String,
    pub severity: Severity,
    pub count: u32,
    pub unique_reporters: u32,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// A single raw abuse report as returned by a provider in verbose mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReport {
    pub reported_at: DateTime<Utc>,
    #[serde(default)]
    pub categories: Vec<i32>,
    #[serde(default)]
    pub reporter_id: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Report volume for one reporter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReporterActivity {
    pub reporter_id: i64,
    pub report_count: u32,
}

/// Normalized per-provider sub-result recorded in a verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProviderOutcome {
    Success {
        score: u8,
        level: RiskLevel,
        /// Which upstream source actually answered, when a provider has a
        /// fallback data source (e.g. Shodan InternetDB).
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    Unavailable {
        reason: String,
    },
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after: Option<u64>,
    },
    #[serde(rename = "error")]
    Failed {
        message: String,
    },
}

/// The unified risk verdict for one IP. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiskVerdict {
    pub entity: IpAddr,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub explanation: String,
    /// Sorted descending by occurrence count, ties by category id.
    pub categories: Vec<AbuseCategory>,
    pub providers: HashMap<String, ProviderOutcome>,
    /// Report counts per UTC day (YYYY-MM-DD).
    pub reports_by_date: BTreeMap<String, u32>,
    pub top_reporters: Vec<ReporterActivity>,
    pub total_reports: u32,
    pub computed_at: DateTime<Utc>,
}

/// Query options for an analysis request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    pub max_age_in_days: Option<u32>,
    pub verbose: Option<bool>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
}

impl AnalysisOptions {
    pub fn max_age_in_days(&self) -> u32 {
        self.max_age_in_days.unwrap_or(90)
    }

    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(true)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(25).clamp(1, 100)
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }
}

/// Deterministic cache key derived from the normalized IP and the effective
/// query options. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(ip: &IpAddr, options: &AnalysisOptions) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(ip.to_string().as_bytes());
        hasher.update(options.max_age_in_days().to_le_bytes());
        hasher.update([options.verbose() as u8]);
        hasher.update(options.per_page().to_le_bytes());
        hasher.update(options.page().to_le_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Errors surfaced to the caller. Everything else (provider outages,
/// malformed payloads, cache failures) is absorbed into the verdict.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid IP address: {0}")]
    InvalidIp(String),
}
