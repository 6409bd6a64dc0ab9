//! VirusTotal reputation provider
//!
//! Queries the v3 IP address endpoint. A 404 means VirusTotal has no record
//! of the address; that is an answer ("no known badness"), not a failure.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::{IntelProvider, ProviderResult, retry_after_seconds, transport_failure};
use crate::models::AnalysisOptions;

const VT_API_URL: &str = "https://www.virustotal.com/api/v3";

pub struct VirusTotalProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl VirusTotalProvider {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url: VT_API_URL.to_string(),
        }
    }

    /// Point the provider at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl IntelProvider for VirusTotalProvider {
    fn name(&self) -> &'static str {
        "virustotal"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(&self, ip: IpAddr, _options: &AnalysisOptions) -> ProviderResult {
        let Some(api_key) = &self.api_key else {
            return ProviderResult::Unavailable {
                reason: "API key not configured".to_string(),
            };
        };

        let response = match self
            .client
            .get(format!("{}/ip_addresses/{}", self.base_url, ip))
            .header("x-apikey", api_key)
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

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return ProviderResult::Success {
                payload: json!({ "found": false }),
                source: None,
            };
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

        match body.get("data").and_then(|d| d.get("attributes")) {
            Some(attributes) => {
                let mut payload = attributes.clone();
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert("found".to_string(), json!(true));
                }
                ProviderResult::Success {
                    payload,
                    source: None,
                }
            }
            None => ProviderResult::Failed {
                message: "response missing data.attributes".to_string(),
            },
        }
    }
}
