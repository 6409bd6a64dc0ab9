//! Score normalization across provider scales
//!
//! Each provider reports risk on a different native scale: AbuseIPDB uses a
//! 0-100 confidence percentage, VirusTotal exposes engine detection counts,
//! Shodan exposes open ports and known vulnerabilities. Everything here is a
//! pure function mapping those onto one 0-100 scale so each provider can be
//! tested in isolation.

use serde_json::Value;

use crate::models::RiskLevel;

/// Fixed monotonic mapping from level labels to scores:
/// clean=0 < low=15 < medium=40 < high=70 < critical=85 < malicious=95.
pub fn level_score(label: &str) -> u8 {
    match label {
        "clean" => 0,
        "low" | "low_risk" => 15,
        "medium" | "medium_risk" => 40,
        "high" | "high_risk" => 70,
        "critical" => 85,
        "malicious" => 95,
        other => {
            // Data-quality signal, not an error.
            tracing::warn!(label = other, "unknown risk level label, normalizing to 0");
            0
        }
    }
}

/// Risk level from a normalized score. The canonical thresholds:
/// 0 clean, 1-24 low, 25-49 medium, 50-84 high, 85-94 critical, 95+ malicious.
pub fn risk_level(score: u8) -> RiskLevel {
    match score {
        0 => RiskLevel::Clean,
        1..=24 => RiskLevel::Low,
        25..=49 => RiskLevel::Medium,
        50..=84 => RiskLevel::High,
        85..=94 => RiskLevel::Critical,
        _ => RiskLevel::Malicious,
    }
}

/// Bonus added to the abuse confidence for report volume.
pub fn report_volume_bonus(total_reports: u32) -> u8 {
    match total_reports {
        0 => 0,
        1..=5 => 2,
        6..=15 => 5,
        16..=50 => 8,
        _ => 12,
    }
}

/// AbuseIPDB scale: confidence percentage clamped to [0,100] plus a
/// report-volume bonus, capped at 100.
pub fn abuse_confidence_score(confidence: i64, total_reports: u32) -> u8 {
    let base = confidence.clamp(0, 100) as u8;
    if base == 0 && total_reports == 0 {
        return 0;
    }
    base.saturating_add(report_volume_bonus(total_reports)).min(100)
}

/// Ports commonly targeted in attacks; each open one weighs heavily.
const DANGEROUS_PORTS: &[u16] = &[
    22, 23, 25, 53, 80, 110, 143, 443, 993, 995, 1433, 3306, 3389, 5432, 6379,
];

/// Shodan scale: weighted sum of dangerous-port hits (x10), total open ports
/// (x2, capped at 20) and known vulnerabilities (x20), bucketed into the
/// fixed level table.
pub fn exposure_score(ports: &[u16], vuln_count: usize) -> u8 {
    let dangerous = ports.iter().filter(|p| DANGEROUS_PORTS.contains(p)).count();
    let weighted = dangerous * 10 + ports.len().min(20) * 2 + vuln_count * 20;

    let label = match weighted {
        0 => "clean",
        1..=19 => "low",
        20..=49 => "medium",
        50..=99 => "high",
        _ => "critical",
    };
    level_score(label)
}

/// VirusTotal scale: combined detection ratio
/// (malicious/total + 0.5 * suspicious/total), bucketed into the level table.
pub fn detection_ratio_score(malicious: u32, suspicious: u32, harmless: u32, undetected: u32) -> u8 {
    let total = malicious + suspicious + harmless + undetected;
    if total == 0 {
        return 0;
    }

    let combined = malicious as f64 / total as f64 + 0.5 * (suspicious as f64 / total as f64);
    let label = if combined == 0.0 {
        "clean"
    } else if combined < 0.1 {
        "low"
    } else if combined < 0.3 {
        "medium"
    } else if combined < 0.6 {
        "high"
    } else {
        "malicious"
    };
    level_score(label)
}

/// Normalize a raw provider payload into a 0-100 score.
///
/// Malformed or unexpected payload shapes normalize to 0 with a logged
/// data-quality warning; they never abort an aggregation.
pub fn normalize(provider: &str, payload: &Value) -> u8 {
    match provider {
        "abuseipdb" => {
            let Some(confidence) = payload.get("abuseConfidenceScore").and_then(Value::as_i64)
            else {
                tracing::warn!(provider, "payload missing abuseConfidenceScore");
                return 0;
            };
            let total_reports = payload
                .get("totalReports")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32;
            abuse_confidence_score(confidence, total_reports)
        }
        "virustotal" => {
            if payload.get("found").and_then(Value::as_bool) == Some(false) {
                return 0;
            }
            let Some(stats) = payload
                .get("last_analysis_stats")
                .and_then(Value::as_object)
            else {
                tracing::warn!(provider, "payload missing last_analysis_stats");
                return 0;
            };
            let stat = |key: &str| stats.get(key).and_then(Value::as_u64).unwrap_or(0) as u32;
            detection_ratio_score(
                stat("malicious"),
                stat("suspicious"),
                stat("harmless"),
                stat("undetected"),
            )
        }
        "shodan" => {
            let Some(ports) = payload.get("ports").and_then(Value::as_array) else {
                tracing::warn!(provider, "payload missing ports");
                return 0;
            };
            let ports: Vec<u16> = ports
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|p| u16::try_from(p).ok())
                .collect();
            let vuln_count = payload
                .get("vulns")
                .and_then(Value::as_array)
                .map(|v| v.len())
                .unwrap_or(0);
            exposure_score(&ports, vuln_count)
        }
        other => {
            tracing::warn!(provider = other, "no normalization rule for provider");
            0
        }
    }
}
