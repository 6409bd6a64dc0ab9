//! AbuseIPDB reputation provider
//!
//! Uses the v2 `check` endpoint in verbose mode so the payload carries
//! per-report category detail, plus the paginated `reports` endpoint for
//! drill-down queries.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{IntelProvider, ProviderResult, retry_after_seconds, transport_failure};
use crate::models::AnalysisOptions;

const ABUSEIPDB_API_URL: &str = "https://api.abuseipdb.com/api/v2";

pub struct AbuseIpDbProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl AbuseIpDbProvider {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url: ABUSEIPDB_API_URL.to_string(),
        }
    }

    /// Point the provider at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> ProviderResult {
        let Some(api_key) = &self.api_key else {
            return ProviderResult::Unavailable {
                reason: "API key not configured".to_string(),
            };
        };

        let response = match self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .header("Key", api_key)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return transport_failure(self.name(), err),
        };

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_seconds(&response);
            tracing::warn!(provider = self.name(), ?retry_after, "rate limited");
            return ProviderResult::RateLimited { retry_after };
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return ProviderResult::Failed {
                message: format!("HTTP {status}: {body}"),
            };
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                return ProviderResult::Failed {
                    message: format!("failed to parse response: {err}"),
                };
            }
        };

        // AbuseIPDB returns 200 with an `errors` array for request-level
        // problems (e.g. a private address).
        if let Some(detail) = body
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
            .and_then(|e| e.get("detail"))
            .and_then(Value::as_str)
        {
            return ProviderResult::Failed {
                message: detail.to_string(),
            };
        }

        match body.get("data") {
            Some(data) => ProviderResult::Success {
                payload: data.clone(),
                source: None,
            },
            None => ProviderResult::Failed {
                message: "response missing data field".to_string(),
            },
        }
    }

    /// Fetch one page of detailed reports via the `reports` endpoint.
    pub async fn fetch_reports(&self, ip: IpAddr, options: &AnalysisOptions) -> ProviderResult {
        self.get(
            "reports",
            &[
                ("ipAddress", ip.to_string()),
                ("maxAgeInDays", options.max_age_in_days().to_string()),
                ("perPage", options.per_page().to_string()),
                ("page", options.page().to_string()),
            ],
        )
        .await
    }
}

#[async_trait]
impl IntelProvider for AbuseIpDbProvider {
    fn name(&self) -> &'static str {
        "abuseipdb"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, ip: IpAddr, options: &AnalysisOptions) -> ProviderResult {
        self.get(
            "check",
            &[
                ("ipAddress", ip.to_string()),
                ("maxAgeInDays", options.max_age_in_days().to_string()),
                ("verbose", options.verbose().to_string()),
            ],
        )
        .await
    }
}
