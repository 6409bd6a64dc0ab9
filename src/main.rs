//! ipsentry
//!
//! A service that aggregates IP reputation signals into risk verdicts.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ipsentry::aggregator::RiskAggregator;
use ipsentry::api::{AppState, create_router};
use ipsentry::cache::MemoryCache;
use ipsentry::providers::IntelProvider;
use ipsentry::providers::abuseipdb::AbuseIpDbProvider;
use ipsentry::providers::shodan::ShodanProvider;
use ipsentry::providers::virustotal::VirusTotalProvider;

/// ipsentry
#[derive(Parser, Debug)]
#[command(name = "ipsentry")]
#[command(about = "Aggregate IP reputation signals into a normalized risk verdict")]
struct Args {
    /// Server host
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// AbuseIPDB API key
    #[arg(long, env = "ABUSEIPDB_API_KEY")]
    abuseipdb_api_key: Option<String>,

    /// VirusTotal API key
    #[arg(long, env = "VIRUSTOTAL_API_KEY")]
    virustotal_api_key: Option<String>,

    /// Shodan API key (optional; the free InternetDB is used without one)
    #[arg(long, env = "SHODAN_API_KEY")]
    shodan_api_key: Option<String>,

    /// Verdict cache TTL in seconds
    #[arg(long, env = "CACHE_TTL_SECONDS", default_value = "3600")]
    cache_ttl_secs: u64,

    /// Cache TTL for indeterminate verdicts, kept short so a transient
    /// provider outage is not frozen as the answer
    #[arg(long, env = "INDETERMINATE_TTL_SECONDS", default_value = "300")]
    indeterminate_ttl_secs: u64,

    /// Maximum number of cached verdicts
    #[arg(long, env = "CACHE_MAX_ENTRIES", default_value = "10000")]
    cache_max_entries: usize,

    /// Per-provider HTTP timeout in seconds
    #[arg(long, env = "PROVIDER_TIMEOUT_SECONDS", default_value = "15")]
    provider_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ipsentry=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    tracing::info!("Starting ipsentry");

    let timeout = Duration::from_secs(args.provider_timeout_secs);

    let abuseipdb = Arc::new(AbuseIpDbProvider::new(
        args.abuseipdb_api_key.clone(),
        timeout,
    ));
    let virustotal = Arc::new(VirusTotalProvider::new(args.virustotal_api_key, timeout));
    // Shodan's free InternetDB answers faster; keep its timeout tighter.
    let shodan = Arc::new(ShodanProvider::new(
        args.shodan_api_key,
        Duration::from_secs(args.provider_timeout_secs.min(10)),
    ));

    let providers: Vec<Arc<dyn IntelProvider>> =
        vec![abuseipdb.clone(), virustotal.clone(), shodan.clone()];
    for provider in &providers {
        if provider.is_configured() {
            tracing::info!(provider = provider.name(), "provider enabled");
        } else {
            tracing::warn!(
                provider = provider.name(),
                "no API key configured, provider will report unavailable"
            );
        }
    }

    let cache = Arc::new(MemoryCache::new(args.cache_max_entries));
    let aggregator = Arc::new(RiskAggregator::new(
        providers,
        cache,
        args.cache_ttl_secs,
        args.indeterminate_ttl_secs,
    ));

    let state = Arc::new(AppState {
        aggregator,
        abuseipdb: args.abuseipdb_api_key.is_some().then_some(abuseipdb),
        cache_ttl_secs: args.cache_ttl_secs,
        indeterminate_ttl_secs: args.indeterminate_ttl_secs,
    });

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
