//! End-to-end aggregation behavior against stub providers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use ipsentry::aggregator::RiskAggregator;
use ipsentry::cache::{MemoryCache, VerdictCache};
use ipsentry::models::{AnalysisOptions, Fingerprint, ProviderOutcome, RiskLevel, RiskVerdict};
use ipsentry::providers::{IntelProvider, ProviderResult};

struct StubProvider {
    name: &'static str,
    configured: bool,
    result: ProviderResult,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubProvider {
    fn new(name: &'static str, result: ProviderResult) -> Arc<Self> {
        Arc::new(Self {
            name,
            configured: true,
            result,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn with_delay(name: &'static str, result: ProviderResult, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            configured: true,
            result,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntelProvider for StubProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn fetch(&self, _ip: std::net::IpAddr, _options: &AnalysisOptions) -> ProviderResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

/// A cache whose backend is down: every operation errors.
struct BrokenCache;

impl VerdictCache for BrokenCache {
    fn get(&self, _fingerprint: &Fingerprint) -> anyhow::Result<Option<RiskVerdict>> {
        Err(anyhow::anyhow!("cache backend unreachable"))
    }

    fn put(
        &self,
        _fingerprint: Fingerprint,
        _verdict: RiskVerdict,
        _ttl: chrono::Duration,
    ) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("cache backend unreachable"))
    }
}

fn aggregator_with_ttls(
    providers: Vec<Arc<StubProvider>>,
    verdict_ttl_secs: u64,
    indeterminate_ttl_secs: u64,
) -> RiskAggregator {
    let providers: Vec<Arc<dyn IntelProvider>> = providers
        .into_iter()
        .map(|p| p as Arc<dyn IntelProvider>)
        .collect();
    RiskAggregator::new(
        providers,
        Arc::new(MemoryCache::new(64)),
        verdict_ttl_secs,
        indeterminate_ttl_secs,
    )
}

fn aggregator(providers: Vec<Arc<StubProvider>>) -> RiskAggregator {
    aggregator_with_ttls(providers, 3600, 300)
}

fn success(payload: serde_json::Value) -> ProviderResult {
    ProviderResult::Success {
        payload,
        source: None,
    }
}

/// A heavily reported IP: 70% confidence, 120 reports across SSH and
/// Brute-Force with SSH the more common category.
fn abuse_payload_with_reports() -> serde_json::Value {
    let mut reports = vec![];
    for i in 0..120u32 {
        let categories = if i % 3 == 0 { vec![18] } else { vec![22] };
        reports.push(json!({
            "reportedAt": format!("2026-08-{:02}T10:00:00+00:00", (i % 28) + 1),
            "categories": categories,
            "reporterId": (i % 30) as i64,
        }));
    }
    json!({
        "abuseConfidenceScore": 70,
        "totalReports": 120,
        "reports": reports,
    })
}

#[tokio::test]
async fn clean_ip_produces_clean_verdict() {
    let abuse = StubProvider::new(
        "abuseipdb",
        success(json!({ "abuseConfidenceScore": 0, "totalReports": 0, "reports": [] })),
    );
    let shodan = StubProvider::new("shodan", success(json!({ "ports": [], "vulns": [] })));

    let verdict = aggregator(vec![abuse, shodan])
        .aggregate("203.0.113.7", &AnalysisOptions::default())
        .await
        .unwrap();

    assert_eq!(verdict.risk_score, 0);
    assert_eq!(verdict.risk_level, RiskLevel::Clean);
    assert!(verdict.categories.is_empty());
}

#[tokio::test]
async fn worst_provider_score_wins() {
    let abuse = StubProvider::new(
        "abuseipdb",
        success(json!({ "abuseConfidenceScore": 30, "totalReports": 0, "reports": [] })),
    );
    // Three dangerous ports and one vulnerability: normalizes to 70.
    let shodan = StubProvider::new(
        "shodan",
        success(json!({ "ports": [22, 80, 443], "vulns": ["CVE-2021-44228"] })),
    );

    let verdict = aggregator(vec![abuse, shodan])
        .aggregate("203.0.113.7", &AnalysisOptions::default())
        .await
        .unwrap();

    assert_eq!(verdict.risk_score, 70);
    assert_eq!(verdict.risk_level, RiskLevel::High);
    assert_eq!(
        verdict.providers["abuseipdb"],
        ProviderOutcome::Success {
            score: 30,
            level: RiskLevel::Medium,
            source: None
        }
    );
}

#[tokio::test]
async fn reported_ip_ranks_categories_by_occurrence() {
    let abuse = StubProvider::new("abuseipdb", success(abuse_payload_with_reports()));

    let verdict = aggregator(vec![abuse])
        .aggregate("203.0.113.7", &AnalysisOptions::default())
        .await
        .unwrap();

    // 70 confidence + 12 report-volume bonus.
    assert_eq!(verdict.risk_score, 82);
    assert!(verdict.risk_level >= RiskLevel::High);
    assert_eq!(verdict.total_reports, 120);

    assert_eq!(verdict.categories.len(), 2);
    assert_eq!(verdict.categories[0].id, 22, "SSH must rank first");
    assert_eq!(verdict.categories[1].id, 18);
    assert!(verdict.categories[0].count > verdict.categories[1].count);
    for category in &verdict.categories {
        assert!(category.unique_reporters <= category.count);
    }

    assert!(!verdict.reports_by_date.is_empty());
    assert_eq!(verdict.top_reporters.len(), 10);
    assert!(verdict.explanation.contains("SSH"));
}

#[tokio::test]
async fn all_failures_yield_indeterminate_not_clean() {
    let abuse = StubProvider::new(
        "abuseipdb",
        ProviderResult::Failed {
            message: "request timed out".to_string(),
        },
    );
    let vt = StubProvider::new(
        "virustotal",
        ProviderResult::RateLimited {
            retry_after: Some(60),
        },
    );
    let shodan = StubProvider::new(
        "shodan",
        ProviderResult::Failed {
            message: "HTTP 500".to_string(),
        },
    );

    let verdict = aggregator(vec![abuse, vt, shodan])
        .aggregate("203.0.113.7", &AnalysisOptions::default())
        .await
        .unwrap();

    assert_eq!(verdict.risk_level, RiskLevel::Indeterminate);
    assert_ne!(verdict.risk_level, RiskLevel::Clean);
    assert_eq!(verdict.risk_score, 0);
    assert!(verdict.categories.is_empty());
    assert_eq!(verdict.providers.len(), 3);
    for outcome in verdict.providers.values() {
        assert!(!matches!(outcome, ProviderOutcome::Success { .. }));
    }
}

#[tokio::test]
async fn unavailable_providers_are_skipped_not_fatal() {
    let abuse = StubProvider::new(
        "abuseipdb",
        ProviderResult::Unavailable {
            reason: "API key not configured".to_string(),
        },
    );
    let shodan = StubProvider::new("shodan", success(json!({ "ports": [8080], "vulns": [] })));

    let verdict = aggregator(vec![abuse, shodan])
        .aggregate("203.0.113.7", &AnalysisOptions::default())
        .await
        .unwrap();

    // The one answering provider decides the verdict.
    assert_eq!(verdict.risk_score, 15);
    assert_eq!(verdict.risk_level, RiskLevel::Low);
    assert!(matches!(
        verdict.providers["abuseipdb"],
        ProviderOutcome::Unavailable { .. }
    ));
}

#[tokio::test]
async fn slow_provider_still_settles() {
    let fast_failure = StubProvider::new(
        "abuseipdb",
        ProviderResult::Failed {
            message: "connection refused".to_string(),
        },
    );
    let slow_success = StubProvider::with_delay(
        "shodan",
        success(json!({ "ports": [22, 3389], "vulns": ["CVE-2024-1234", "CVE-2024-5678"] })),
        Duration::from_millis(50),
    );

    let verdict = aggregator(vec![fast_failure, slow_success])
        .aggregate("203.0.113.7", &AnalysisOptions::default())
        .await
        .unwrap();

    // The fast failure must not cancel the slow success.
    assert!(matches!(
        verdict.providers["shodan"],
        ProviderOutcome::Success { .. }
    ));
    assert!(verdict.risk_score > 0);
}

#[tokio::test]
async fn repeat_within_ttl_hits_cache_and_is_identical() {
    let abuse = StubProvider::new("abuseipdb", success(abuse_payload_with_reports()));
    let aggregator = aggregator(vec![abuse.clone()]);
    let options = AnalysisOptions::default();

    let first = aggregator.aggregate("203.0.113.7", &options).await.unwrap();
    let second = aggregator.aggregate("203.0.113.7", &options).await.unwrap();

    assert_eq!(abuse.calls(), 1, "second call must not reach the provider");
    assert_eq!(first, second);
}

#[tokio::test]
async fn expired_ttl_triggers_fresh_provider_calls() {
    let abuse = StubProvider::new(
        "abuseipdb",
        success(json!({ "abuseConfidenceScore": 50, "totalReports": 0, "reports": [] })),
    );
    let aggregator = aggregator_with_ttls(vec![abuse.clone()], 0, 0);
    let options = AnalysisOptions::default();

    aggregator.aggregate("203.0.113.7", &options).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    aggregator.aggregate("203.0.113.7", &options).await.unwrap();

    assert_eq!(abuse.calls(), 2, "expired entry must not be served");
}

#[tokio::test]
async fn indeterminate_verdicts_use_the_shorter_ttl() {
    let abuse = StubProvider::new(
        "abuseipdb",
        ProviderResult::Failed {
            message: "outage".to_string(),
        },
    );
    // Long TTL for determinate verdicts, zero for indeterminate ones.
    let aggregator = aggregator_with_ttls(vec![abuse.clone()], 3600, 0);
    let options = AnalysisOptions::default();

    let verdict = aggregator.aggregate("203.0.113.7", &options).await.unwrap();
    assert_eq!(verdict.risk_level, RiskLevel::Indeterminate);

    tokio::time::sleep(Duration::from_millis(10)).await;
    aggregator.aggregate("203.0.113.7", &options).await.unwrap();

    assert_eq!(abuse.calls(), 2, "outage must not be frozen for the full TTL");
}

#[tokio::test]
async fn failing_cache_degrades_to_fresh_computation() {
    let abuse = StubProvider::new("abuseipdb", success(abuse_payload_with_reports()));
    let aggregator = RiskAggregator::new(
        vec![abuse.clone() as Arc<dyn IntelProvider>],
        Arc::new(BrokenCache),
        3600,
        300,
    );
    let options = AnalysisOptions::default();

    let verdict = aggregator.aggregate("203.0.113.7", &options).await.unwrap();
    assert_eq!(verdict.risk_score, 82);
    assert_eq!(verdict.risk_level, RiskLevel::High);

    // With the cache down, every request recomputes; none fails.
    aggregator.aggregate("203.0.113.7", &options).await.unwrap();
    assert_eq!(abuse.calls(), 2);
}

#[tokio::test]
async fn different_options_are_cached_separately() {
    let abuse = StubProvider::new(
        "abuseipdb",
        success(json!({ "abuseConfidenceScore": 10, "totalReports": 1, "reports": [] })),
    );
    let aggregator = aggregator(vec![abuse.clone()]);

    aggregator
        .aggregate("203.0.113.7", &AnalysisOptions::default())
        .await
        .unwrap();
    aggregator
        .aggregate(
            "203.0.113.7",
            &AnalysisOptions {
                max_age_in_days: Some(30),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(abuse.calls(), 2);
}

#[tokio::test]
async fn concurrent_requests_for_different_ips_are_independent() {
    let abuse = StubProvider::new(
        "abuseipdb",
        success(json!({ "abuseConfidenceScore": 40, "totalReports": 2, "reports": [] })),
    );
    let aggregator = Arc::new(aggregator(vec![abuse]));
    let options = AnalysisOptions::default();

    let (a, b) = tokio::join!(
        aggregator.aggregate("203.0.113.1", &options),
        aggregator.aggregate("203.0.113.2", &options),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert_ne!(a.entity, b.entity);
    assert_eq!(a.risk_score, b.risk_score);
}

#[tokio::test]
async fn invalid_ip_is_rejected_before_any_provider_call() {
    let abuse = StubProvider::new(
        "abuseipdb",
        success(json!({ "abuseConfidenceScore": 0, "totalReports": 0 })),
    );
    let aggregator = aggregator(vec![abuse.clone()]);

    let result = aggregator
        .aggregate("999.999.999.999", &AnalysisOptions::default())
        .await;

    assert!(result.is_err());
    assert_eq!(abuse.calls(), 0);
}

#[tokio::test]
async fn malformed_payload_scores_zero_without_aborting() {
    let abuse = StubProvider::new("abuseipdb", success(json!({ "garbage": true })));
    let shodan = StubProvider::new("shodan", success(json!({ "ports": [8080], "vulns": [] })));

    let verdict = aggregator(vec![abuse, shodan])
        .aggregate("203.0.113.7", &AnalysisOptions::default())
        .await
        .unwrap();

    assert_eq!(
        verdict.providers["abuseipdb"],
        ProviderOutcome::Success {
            score: 0,
            level: RiskLevel::Clean,
            source: None
        }
    );
    assert_eq!(verdict.risk_score, 15);
}
