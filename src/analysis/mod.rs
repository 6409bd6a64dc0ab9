//! Abuse category analysis over raw provider reports
//!
//! One pass over every report: per-category occurrence counts, first/last
//! seen timestamps, unique reporter sets, a per-day UTC histogram, and the
//! most active reporters. Correctness over all reports matters more than
//! speed at the volumes involved (tens of thousands, not millions).

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{AbuseCategory, RawReport, ReporterActivity, Severity};

/// How many top categories count as "most common".
pub const MOST_COMMON_LIMIT: usize = 5;

/// How many reporters count as "most active".
pub const TOP_REPORTERS_LIMIT: usize = 10;

/// Result of analyzing a batch of raw reports.
#[derive(Debug, Clone, Default)]
pub struct CategoryAnalysis {
    /// Sorted descending by occurrence count, ties by category id ascending.
    pub categories: Vec<AbuseCategory>,
    /// Report counts keyed by UTC day (YYYY-MM-DD).
    pub reports_by_date: BTreeMap<String, u32>,
    pub total_reports: u32,
    pub unique_reporters: u32,
    /// Sorted descending by report count, ties by reporter id ascending.
    pub top_reporters: Vec<ReporterActivity>,
}

impl CategoryAnalysis {
    pub fn most_common(&self) -> &[AbuseCategory] {
        &self.categories[..self.categories.len().min(MOST_COMMON_LIMIT)]
    }

    pub fn severity_counts(&self) -> BTreeMap<Severity, u32> {
        let mut counts = BTreeMap::new();
        for category in &self.categories {
            *counts.entry(category.severity).or_insert(0) += 1;
        }
        counts
    }
}

/// Human-readable name for an AbuseIPDB category id.
pub fn category_name(id: i32) -> String {
    let name = match id {
        1 => "DNS Compromise",
        2 => "DNS Poisoning",
        3 => "Fraud Orders",
        4 => "DDoS Attack",
        5 => "FTP Brute-Force",
        6 => "Ping of Death",
        7 => "Phishing",
        8 => "Fraud VoIP",
        9 => "Open Proxy",
        10 => "Web Spam",
        11 => "Email Spam",
        12 => "Blog Spam",
        13 => "VPN IP",
        14 => "Port Scan",
        15 => "Hacking",
        16 => "SQL Injection",
        17 => "Spoofing",
        18 => "Brute-Force",
        19 => "Bad Web Bot",
        20 => "Exploited Host",
        21 => "Web App Attack",
        22 => "SSH",
        23 => "IoT Targeted",
        other => return format!("Category {other}"),
    };
    name.to_string()
}

/// Fixed category -> severity table.
pub fn category_severity(id: i32) -> Severity {
    match id {
        4 | 7 | 15 | 16 | 18 | 20 | 21 => Severity::High,
        1 | 2 | 5 | 6 | 14 | 17 | 19 | 22 | 23 => Severity::Medium,
        _ => Severity::Low,
    }
}

struct CategoryTally {
    count: u32,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    reporters: HashSet<i64>,
}

/// Analyze raw reports from one provider into category statistics.
///
/// The provider name tags every derived category so categories from
/// different providers' taxonomies are never merged by id alone.
pub fn analyze(provider: &str, reports: &[RawReport]) -> CategoryAnalysis {
    let mut tallies: HashMap<i32, CategoryTally> = HashMap::new();
    let mut reports_by_date: BTreeMap<String, u32> = BTreeMap::new();
    let mut reporter_counts: HashMap<i64, u32> = HashMap::new();

    for report in reports {
        for &category_id in &report.categories {
            let tally = tallies.entry(category_id).or_insert_with(|| CategoryTally {
                count: 0,
                first_seen: report.reported_at,
                last_seen: report.reported_at,
                reporters: HashSet::new(),
            });
            tally.count += 1;
            tally.first_seen = tally.first_seen.min(report.reported_at);
            tally.last_seen = tally.last_seen.max(report.reported_at);
            if let Some(reporter) = report.reporter_id {
                tally.reporters.insert(reporter);
            }
        }

        let day = report.reported_at.date_naive().to_string();
        *reports_by_date.entry(day).or_insert(0) += 1;

        if let Some(reporter) = report.reporter_id {
            *reporter_counts.entry(reporter).or_insert(0) += 1;
        }
    }

    let mut categories: Vec<AbuseCategory> = tallies
        .into_iter()
        .map(|(id, tally)| AbuseCategory {
            id,
            name: category_name(id),
            provider: provider.to_string(),
            severity: category_severity(id),
            count: tally.count,
            unique_reporters: tally.reporters.len() as u32,
            first_seen: Some(tally.first_seen),
            last_seen: Some(tally.last_seen),
        })
        .collect();
    categories.sort_by(|a, b| b.count.cmp(&a.count).then(a.id.cmp(&b.id)));

    let unique_reporters = reporter_counts.len() as u32;
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
    top_reporters.truncate(TOP_REPORTERS_LIMIT);

    CategoryAnalysis {
        categories,
        reports_by_date,
        total_reports: reports.len() as u32,
        unique_reporters,
        top_reporters,
    }
}
