//! Shodan exposure provider
//!
//! Prefers the paid host API when a key is configured and transparently
//! falls back to the free InternetDB on "not found" or exhausted credits.
//! The verdict records which source actually answered.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::{IntelProvider, ProviderResult, retry_after_seconds, transport_failure};
use crate::models::AnalysisOptions;

const SHODAN_API_URL: &str = "https://api.shodan.io";
const INTERNETDB_URL: &str = "https://internetdb.shodan.io";

pub struct ShodanProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    internetdb_url: String,
}

impl ShodanProvider {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url: SHODAN_API_URL.to_string(),
            internetdb_url: INTERNETDB_URL.to_string(),
        }
    }

    /// Point the provider at different endpoints (tests).
    pub fn with_base_urls(
        mut self,
        base_url: impl Into<String>,
        internetdb_url: impl Into<String>,
    ) -> Self {
        self.base_url = base_url.into();
        self.internetdb_url = internetdb_url.into();
        self
    }

    async fn fetch_internetdb(&self, ip: IpAddr) -> ProviderResult {
        let response = match self
            .client
            .get(format!("{}/{}", self.internetdb_url, ip))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return transport_failure(self.name(), err),
        };

        // InternetDB answers 404 for addresses it has never scanned; that
        // is a clean answer, not an outage.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return ProviderResult::Success {
                payload: json!({ "found": false, "ports": [], "vulns": [] }),
                source: Some("internetdb".to_string()),
            };
        }

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_seconds(&response);
            return ProviderResult::RateLimited { retry_after };
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return ProviderResult::Failed {
                message: format!("HTTP {status}: {body}"),
            };
        }

        match response.json::<Value>().await {
            Ok(payload) => ProviderResult::Success {
                payload,
                source: Some("internetdb".to_string()),
            },
            Err(err) => ProviderResult::Failed {
                message: format!("failed to parse response: {err}"),
            },
        }
    }

    async fn fetch_host_api(&self, ip: IpAddr, api_key: &str) -> ProviderResult {
        let response = match self
            .client
            .get(format!("{}/shodan/host/{}", self.base_url, ip))
            .query(&[("key", api_key)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return transport_failure(self.name(), err),
        };

        match response.status() {
            // Not indexed by the paid API, or credits exhausted: the free
            // source may still know the address.
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::PAYMENT_REQUIRED => {
                tracing::debug!(provider = self.name(), ip = %ip, status = %response.status(),
                    "host API unavailable, falling back to InternetDB");
                self.fetch_internetdb(ip).await
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = retry_after_seconds(&response);
                ProviderResult::RateLimited { retry_after }
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                ProviderResult::Failed {
                    message: format!("HTTP {status}: {body}"),
                }
            }
            _ => match response.json::<Value>().await {
                Ok(payload) => ProviderResult::Success {
                    payload,
                    source: Some("shodan".to_string()),
                },
                Err(err) => ProviderResult::Failed {
                    message: format!("failed to parse response: {err}"),
                },
            },
        }
    }
}

#[async_trait]
impl IntelProvider for ShodanProvider {
    fn name(&self) -> &'static str {
        "shodan"
    }

    /// Always configured: InternetDB needs no credentials.
    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch(&self, ip: IpAddr, _options: &AnalysisOptions) -> ProviderResult {
        match &self.api_key {
            Some(api_key) => self.fetch_host_api(ip, api_key).await,
            None => self.fetch_internetdb(ip).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ip() -> IpAddr {
        "203.0.113.7".parse().unwrap()
    }

    #[tokio::test]
    async fn keyless_provider_uses_internetdb() {
        let idb = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/203.0.113.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ports": [22, 80, 443],
                "vulns": ["CVE-2021-44228"],
                "hostnames": []
            })))
            .expect(1)
            .mount(&idb)
            .await;

        let provider = ShodanProvider::new(None, Duration::from_secs(5))
            .with_base_urls("http://unused.invalid", idb.uri());
        assert!(provider.is_configured());

        let result = provider.fetch(ip(), &AnalysisOptions::default()).await;
        match result {
            ProviderResult::Success { payload, source } => {
                assert_eq!(source.as_deref(), Some("internetdb"));
                assert_eq!(scoring::normalize("shodan", &payload), 70);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn host_api_not_found_falls_back_to_internetdb() {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shodan/host/203.0.113.7"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&api)
            .await;

        let idb = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/203.0.113.7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ports": [8080], "vulns": [] })),
            )
            .expect(1)
            .mount(&idb)
            .await;

        let provider = ShodanProvider::new(Some("test-key".to_string()), Duration::from_secs(5))
            .with_base_urls(api.uri(), idb.uri());

        let result = provider.fetch(ip(), &AnalysisOptions::default()).await;
        match result {
            ProviderResult::Success { source, .. } => {
                assert_eq!(source.as_deref(), Some("internetdb"));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn internetdb_not_found_is_a_clean_answer() {
        let idb = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/203.0.113.7"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&idb)
            .await;

        let provider = ShodanProvider::new(None, Duration::from_secs(5))
            .with_base_urls("http://unused.invalid", idb.uri());

        let result = provider.fetch(ip(), &AnalysisOptions::default()).await;
        match result {
            ProviderResult::Success { payload, source } => {
                assert_eq!(source.as_deref(), Some("internetdb"));
                assert_eq!(scoring::normalize("shodan", &payload), 0);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn host_api_success_uses_primary_source() {
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shodan/host/203.0.113.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ports": [22],
                "vulns": [],
                "org": "Example Org"
            })))
            .mount(&api)
            .await;

        let provider = ShodanProvider::new(Some("test-key".to_string()), Duration::from_secs(5))
            .with_base_urls(api.uri(), "http://unused.invalid");

        let result = provider.fetch(ip(), &AnalysisOptions::default()).await;
        match result {
            ProviderResult::Success { source, .. } => {
                assert_eq!(source.as_deref(), Some("shodan"));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
}
