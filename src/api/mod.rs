//! REST API for IP risk analysis
//!
//! Thin boundary layer: request validation, JSON envelopes, and HTTP status
//! mapping. All aggregation logic lives in the core.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::aggregator::RiskAggregator;
use crate::analysis;
use crate::models::{AnalysisError, AnalysisOptions, RawReport};
use crate::providers::{ProviderResult, abuseipdb::AbuseIpDbProvider};

/// Application state shared across handlers
pub struct AppState {
    pub aggregator: Arc<RiskAggregator>,
    /// Kept separately for the detailed-reports drill-down endpoint.
    pub abuseipdb: Option<Arc<AbuseIpDbProvider>>,
    pub cache_ttl_secs: u64,
    pub indeterminate_ttl_secs: u64,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/analyze", post(analyze))
        .route("/api/v1/analyze/:ip", get(analyze_by_path))
        .route("/api/v1/reports", post(detailed_reports))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    entity: String,
    #[serde(rename = "type")]
    entity_type: Option<String>,
    #[serde(flatten)]
    options: AnalysisOptions,
}

#[derive(Debug, Deserialize)]
struct ReportsRequest {
    entity: String,
    #[serde(flatten)]
    options: AnalysisOptions,
}

type ApiError = (StatusCode, Json<Value>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": message.into() })),
    )
}

fn envelope(entity: &str, data: Value) -> Json<Value> {
    Json(json!({
        "success": true,
        "entity": entity,
        "timestamp": Utc::now(),
        "data": data,
    }))
}

// ==================== Handlers ====================

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let providers: Value = state
        .aggregator
        .provider_status()
        .into_iter()
        .map(|(name, configured)| (name.to_string(), json!(configured)))
        .collect::<serde_json::Map<String, Value>>()
        .into();

    Json(json!({
        "status": "healthy",
        "service": "ipsentry",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": providers,
    }))
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    let providers: Value = state
        .aggregator
        .provider_status()
        .into_iter()
        .map(|(name, configured)| {
            (
                name.to_string(),
                json!(if configured { "configured" } else { "missing" }),
            )
        })
        .collect::<serde_json::Map<String, Value>>()
        .into();

    Json(json!({
        "success": true,
        "providers": providers,
        "cache": {
            "ttlSeconds": state.cache_ttl_secs,
            "indeterminateTtlSeconds": state.indeterminate_ttl_secs,
        },
    }))
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Some(entity_type) = &req.entity_type {
        if !entity_type.eq_ignore_ascii_case("ip") {
            return Err(bad_request("Only IP analysis is supported; type must be \"ip\""));
        }
    }
    run_analysis(&state, &req.entity, &req.options).await
}

async fn analyze_by_path(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
    Query(options): Query<AnalysisOptions>,
) -> Result<Json<Value>, ApiError> {
    run_analysis(&state, &ip, &options).await
}

async fn run_analysis(
    state: &Arc<AppState>,
    entity: &str,
    options: &AnalysisOptions,
) -> Result<Json<Value>, ApiError> {
    let verdict = state
        .aggregator
        .aggregate(entity, options)
        .await
        .map_err(|err| match err {
            AnalysisError::InvalidIp(_) => bad_request(err.to_string()),
        })?;

    let entity = verdict.entity.to_string();
    let data = serde_json::to_value(&verdict).map_err(|err| {
        tracing::error!(error = %err, "failed to serialize verdict");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "message": "internal error" })),
        )
    })?;

    Ok(envelope(&entity, data))
}

async fn detailed_reports(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReportsRequest>,
) -> Result<Json<Value>, ApiError> {
    let ip: std::net::IpAddr = req
        .entity
        .trim()
        .parse()
        .map_err(|_| bad_request(format!("invalid IP address: {}", req.entity.trim())))?;

    let Some(provider) = &state.abuseipdb else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "message": "AbuseIPDB is not configured" })),
        ));
    };

    match provider.fetch_reports(ip, &req.options).await {
        ProviderResult::Success { payload, .. } => {
            let results: Vec<RawReport> = match payload.get("results") {
                Some(raw) => match serde_json::from_value(raw.clone()) {
                    Ok(results) => results,
                    Err(err) => {
                        tracing::warn!(error = %err, "malformed report records, skipping");
                        vec![]
                    }
                },
                None => vec![],
            };
            let analysis = analysis::analyze("abuseipdb", &results);

            let total = payload.get("total").and_then(Value::as_u64).unwrap_or(0);
            let per_page = req.options.per_page() as u64;

            Ok(envelope(
                &ip.to_string(),
                json!({
                    "pagination": {
                        "total": total,
                        "count": payload.get("count").and_then(Value::as_u64).unwrap_or(0),
                        "perPage": per_page,
                        "page": req.options.page(),
                        "lastPage": total.div_ceil(per_page),
                    },
                    "reports": payload.get("results").cloned().unwrap_or(json!([])),
                    "categories": analysis.categories,
                    "bySeverity": analysis.severity_counts(),
                    "reportsByDate": analysis.reports_by_date,
                    "totalReportsAnalyzed": analysis.total_reports,
                    "uniqueReporters": analysis.unique_reporters,
                    "topReporters": analysis.top_reporters,
                }),
            ))
        }
        ProviderResult::RateLimited { retry_after } => Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "success": false,
                "message": "AbuseIPDB rate limit exceeded",
                "retryAfter": retry_after,
            })),
        )),
        ProviderResult::Unavailable { reason } => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "message": reason })),
        )),
        ProviderResult::Failed { message } => Err((
            StatusCode::BAD_GATEWAY,
            Json(json!({ "success": false, "message": message })),
        )),
    }
}
