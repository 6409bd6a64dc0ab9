//! Risk aggregation across providers
//!
//! Orchestrates one analysis pass: cache lookup, concurrent settle-all
//! provider fan-out, normalization, category merging, and verdict assembly.
//! One provider's failure never aborts the others; a verdict is only ever
//! built from fully settled results and only a complete verdict is cached.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future;
use serde_json::Value;

use crate::analysis;
use crate::cache::VerdictCache;
use crate::models::{
    AbuseCategory, AnalysisError, AnalysisOptions, Fingerprint, ProviderOutcome, RawReport,
    ReporterActivity, RiskLevel, RiskVerdict,
};
use crate::providers::{IntelProvider, ProviderResult};
use crate::scoring;

pub struct RiskAggregator {
    providers: Vec<Arc<dyn IntelProvider>>,
    cache: Arc<dyn VerdictCache>,
    verdict_ttl: Duration,
    indeterminate_ttl: Duration,
}

impl RiskAggregator {
    pub fn new(
        providers: Vec<Arc<dyn IntelProvider>>,
        cache: Arc<dyn VerdictCache>,
        verdict_ttl_secs: u64,
        indeterminate_ttl_secs: u64,
    ) -> Self {
        Self {
            providers,
            cache,
            verdict_ttl: Duration::seconds(verdict_ttl_secs as i64),
            indeterminate_ttl: Duration::seconds(indeterminate_ttl_secs as i64),
        }
    }

    /// Configuration state per provider, for health/config reporting.
    pub fn provider_status(&self) -> Vec<(&'static str, bool)> {
        self.providers
            .iter()
            .map(|p| (p.name(), p.is_configured()))
            .collect()
    }

    /// Analyze an IP, serving from cache when a fresh verdict exists.
    ///
    /// Only malformed input is an error; provider failures are absorbed
    /// into the verdict's per-provider detail.
    pub async fn aggregate(
        &self,
        ip: &str,
        options: &AnalysisOptions,
    ) -> Result<RiskVerdict, AnalysisError> {
        let ip: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| AnalysisError::InvalidIp(ip.trim().to_string()))?;

        let fingerprint = Fingerprint::compute(&ip, options);
        match self.cache.get(&fingerprint) {
            Ok(Some(verdict)) => {
                tracing::debug!(ip = %ip, fingerprint = fingerprint.as_str(), "cache hit");
                return Ok(verdict);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "cache read failed, computing fresh");
            }
        }

        let fetches = self.providers.iter().map(|provider| {
            let provider = provider.clone();
            let options = options.clone();
            async move {
                let result = provider.fetch(ip, &options).await;
                (provider.name(), result)
            }
        });
        let settled = future::join_all(fetches).await;

        let verdict = self.build_verdict(ip, settled);

        let ttl = if verdict.risk_level == RiskLevel::Indeterminate {
            // A transient outage must not be frozen for the full TTL.
            self.indeterminate_ttl
        } else {
            self.verdict_ttl
        };
        if let Err(err) = self.cache.put(fingerprint, verdict.clone(), ttl) {
            tracing::warn!(error = %err, "cache write failed");
        }

        Ok(verdict)
    }

    fn build_verdict(
        &self,
        ip: IpAddr,
        settled: Vec<(&'static str, ProviderResult)>,
    ) -> RiskVerdict {
        let mut outcomes: HashMap<String, ProviderOutcome> = HashMap::new();
        let mut merged: BTreeMap<(String, i32), AbuseCategory> = BTreeMap::new();
        let mut reports_by_date: BTreeMap<String, u32> = BTreeMap::new();
        let mut reporter_counts: HashMap<i64, u32> = HashMap::new();
        let mut best_score: Option<u8> = None;
        let mut total_reports: u32 = 0;

        for (name, result) in settled {
            let outcome = match result {
                ProviderResult::Success { payload, source } => {
                    let score = scoring::normalize(name, &payload);
                    best_score = Some(best_score.map_or(score, |s| s.max(score)));

                    let analysis = analysis::analyze(name, &extract_reports(name, &payload));
                    for category in analysis.categories {
                        merged.insert((category.provider.clone(), category.id), category);
                    }
                    for (day, count) in analysis.reports_by_date {
                        *reports_by_date.entry(day).or_insert(0) += count;
                    }
                    for reporter in analysis.top_reporters {
                        *reporter_counts.entry(reporter.reporter_id).or_insert(0) +=
                            reporter.report_count;
                    }

                    let provider_total = payload
                        .get("totalReports")
                        .and_then(Value::as_u64)
                        .map(|t| t as u32)
                        .unwrap_or(analysis.total_reports);
                    total_reports = total_reports.max(provider_total);

                    tracing::info!(provider = name, ip = %ip, score, "provider answered");
                    ProviderOutcome::Success {
                        score,
                        level: scoring::risk_level(score),
                        source,
                    }
                }
                ProviderResult::Unavailable { reason } => {
                    tracing::debug!(provider = name, ip = %ip, reason = %reason, "provider unavailable");
                    ProviderOutcome::Unavailable { reason }
                }
                ProviderResult::RateLimited { retry_after } => {
                    tracing::warn!(provider = name, ip = %ip, ?retry_after, "provider rate limited");
                    ProviderOutcome::RateLimited { retry_after }
                }
                ProviderResult::Failed { message } => {
                    tracing::warn!(provider = name, ip = %ip, error = %message, "provider failed");
                    ProviderOutcome::Failed { message }
                }
            };
            outcomes.insert(name.to_string(), outcome);
        }

        let mut categories: Vec<AbuseCategory> = merged.into_values().collect();
        categories.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.id.cmp(&b.id))
                .then(a.provider.cmp(&b.provider))
        });

        let mut top_reporters: Vec<ReporterActivity> = reporter_counts
            .into_iter()
            .map(|(reporter_id, report_count)| ReporterActivity {
                reporter_id,
                report_count,
            })
            .collect();
        top_reporters.sort_by(|a, b| {
            b.report_count
                .cmp(&a.report_count)
                .then(a.reporter_id.cmp(&b.reporter_id))
        });
        top_reporters.truncate(analysis::TOP_REPORTERS_LIMIT);

        // A provider outage is never reported as a clean verdict.
        let (risk_score, risk_level) = match best_score {
            Some(score) => (score, scoring::risk_level(score)),
            None => (0, RiskLevel::Indeterminate),
        };

        let succeeded = outcomes
            .values()
            .filter(|o| matches!(o, ProviderOutcome::Success { .. }))
            .count();
        let explanation =
            build_explanation(ip, risk_score, risk_level, total_reports, &categories, succeeded);

        RiskVerdict {
            entity: ip,
            risk_score,
            risk_level,
            explanation,
            categories,
            providers: outcomes,
            reports_by_date,
            top_reporters,
            total_reports,
            computed_at: Utc::now(),
        }
    }
}

/// Pull report-level detail out of a raw payload, when the provider
/// supplies it (AbuseIPDB verbose mode).
fn extract_reports(provider: &str, payload: &Value) -> Vec<RawReport> {
    if provider != "abuseipdb" {
        return vec![];
    }
    let Some(reports) = payload.get("reports") else {
        return vec![];
    };
    match serde_json::from_value(reports.clone()) {
        Ok(reports) => reports,
        Err(err) => {
            tracing::warn!(provider, error = %err, "malformed report records, skipping");
            vec![]
        }
    }
}

fn build_explanation(
    ip: IpAddr,
    score: u8,
    level: RiskLevel,
    total_reports: u32,
    categories: &[AbuseCategory],
    succeeded: usize,
) -> String {
    match level {
        RiskLevel::Indeterminate => {
            format!("No reputation provider could answer for {ip}; risk is indeterminate")
        }
        RiskLevel::Clean => {
            format!("No abuse signals for {ip} across {succeeded} provider(s)")
        }
        _ => {
            let base = format!(
                "Risk score {score}/100 ({level}) for {ip} from {succeeded} provider(s), {total_reports} report(s)"
            );
            let top: Vec<&str> = categories.iter().take(3).map(|c| c.name.as_str()).collect();
            if top.is_empty() {
                base
            } else {
                format!("{base}; top categories: {}", top.join(", "))
            }
        }
    }
}
