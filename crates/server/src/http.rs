use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::Instrument;
use ulid::Ulid;

use localaudit_contracts::{BusinessProfile, ParsedReport, SchemaViolation};

use crate::config::{ServerConfig, StartupError};
use crate::extract::{MalformedOutput, extract_report};
use crate::oracle::{OracleClient, OracleClientConfig, OracleError};
use crate::prompt::build_report_prompt;
use crate::rate_limit::RateLimiter;

const REPORT_ROUTE: &str = "/api/generate-report";

#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    oracle: OracleClient,
    rate_limiter: RateLimiter,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn router(config: ServerConfig) -> Result<Router, StartupError> {
    let oracle = OracleClient::new(OracleClientConfig {
        provider: config.oracle_provider,
        base_url: config.oracle_base_url.clone(),
        model: config.oracle_model.clone(),
        api_key: config.oracle_api_key.clone(),
        max_tokens: config.oracle_max_tokens,
        timeout: Duration::from_millis(config.oracle_timeout_ms),
    })
    .map_err(|_| StartupError {
        code: "ERR_ORACLE_CLIENT_INIT",
        message: "failed to initialize oracle client".to_string(),
    })?;

    let rate_limiter = RateLimiter::new(
        Duration::from_secs(config.rate_limit_window_secs.max(1)),
        config.rate_limit_max_keys,
    );

    let state = AppState {
        config,
        oracle,
        rate_limiter,
    };

    Ok(Router::new()
        .route("/api/health", get(health))
        .route("/metrics", get(metrics))
        .route(REPORT_ROUTE, post(generate_report))
        .with_state(state))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: unix_epoch_ms_now(),
    })
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn generate_report(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    req: Result<Json<BusinessProfile>, JsonRejection>,
) -> Result<Json<ParsedReport>, ApiError> {
    let started = Instant::now();
    let request_id = extract_request_id(&headers);
    let client_ip = client_ip(&headers, peer);

    let result = handle_report(&state, &client_ip, &request_id, req).await;

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err((status, _)) => *status,
    };
    crate::metrics::observe_http_request(REPORT_ROUTE, "POST", status.as_u16(), started.elapsed());

    result
}

async fn handle_report(
    state: &AppState,
    client_ip: &str,
    request_id: &str,
    req: Result<Json<BusinessProfile>, JsonRejection>,
) -> Result<Json<ParsedReport>, ApiError> {
    // Rate limiting runs before body inspection; a rejected request must not
    // spend oracle quota.
    if !state
        .rate_limiter
        .allow(client_ip, state.config.rate_limit_max_requests)
    {
        crate::metrics::observe_report_outcome("rate_limited");
        tracing::warn!(request_id = %request_id, outcome = "rate_limited", "report request rejected");
        return Err(json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many report requests from this address. Please try again later.",
        ));
    }

    let Json(profile) = req.map_err(|_| {
        crate::metrics::observe_report_outcome("invalid_input");
        json_error(
            StatusCode::BAD_REQUEST,
            "Request body must be a JSON business profile.",
        )
    })?;

    profile.validate().map_err(|reason| {
        crate::metrics::observe_report_outcome("invalid_input");
        json_error(StatusCode::BAD_REQUEST, reason)
    })?;

    let started = Instant::now();
    let span = tracing::info_span!(
        "report.generate",
        request_id = %request_id,
        business_name = %profile.business_name,
        provider = state.oracle.provider().as_str(),
        outcome = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let result = run_report_stages(state, &profile)
        .instrument(span.clone())
        .await;

    span.record("latency_ms", started.elapsed().as_millis() as i64);
    match result {
        Ok(report) => {
            span.record("outcome", "ok");
            crate::metrics::observe_report_outcome("ok");
            Ok(Json(report))
        }
        Err(failure) => {
            span.record("outcome", failure.outcome());
            crate::metrics::observe_report_outcome(failure.outcome());
            let _entered = span.enter();
            Err(failure_response(&failure))
        }
    }
}

async fn run_report_stages(
    state: &AppState,
    profile: &BusinessProfile,
) -> Result<ParsedReport, ReportFailure> {
    let prompt = build_report_prompt(profile);

    let provider = state.oracle.provider().as_str();
    let raw = match state.oracle.generate(&prompt).await {
        Ok(raw) => {
            crate::metrics::observe_oracle_call(provider, "ok");
            raw
        }
        Err(err) => {
            crate::metrics::observe_oracle_call(provider, "error");
            return Err(ReportFailure::Oracle(err));
        }
    };

    let candidate = extract_report(&raw).map_err(ReportFailure::Malformed)?;
    let report = ParsedReport::from_value(&candidate).map_err(ReportFailure::Schema)?;
    Ok(report)
}

#[derive(Debug)]
enum ReportFailure {
    Oracle(OracleError),
    Malformed(MalformedOutput),
    Schema(SchemaViolation),
}

impl ReportFailure {
    fn outcome(&self) -> &'static str {
        match self {
            ReportFailure::Oracle(_) => "oracle_unavailable",
            ReportFailure::Malformed(_) => "malformed_output",
            ReportFailure::Schema(_) => "schema_violation",
        }
    }
}

fn failure_response(failure: &ReportFailure) -> ApiError {
    match failure {
        ReportFailure::Oracle(err) => {
            tracing::warn!(error = %err, "oracle call failed");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "The audit service is temporarily unavailable. Please try again later.",
            )
        }
        ReportFailure::Malformed(err) => {
            // Raw oracle text is diagnostic-only: truncated, debug level, and
            // never part of the response body.
            tracing::warn!(error = %err, "oracle output could not be parsed");
            tracing::debug!(raw = %truncate(&err.raw, 256), "unparseable oracle output");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "The audit came back in an unexpected format. Please try again.",
            )
        }
        ReportFailure::Schema(err) => {
            tracing::warn!(error = %err, "oracle output failed the report contract");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "The audit came back in an unexpected format. Please try again.",
            )
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn json_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| peer.ip().to_string())
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;

    if raw.len() > MAX_LEN {
        return None;
    }
    raw.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        .then(|| raw.to_string())
}

fn truncate(raw: &str, max_bytes: usize) -> &str {
    if raw.len() <= max_bytes {
        return raw;
    }
    let mut end = max_bytes;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}

fn unix_epoch_ms_now() -> i64 {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    duration.as_millis().min(i64::MAX as u128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)), 54_321)
    }

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.4, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, peer()), "198.51.100.4");
    }

    #[test]
    fn client_ip_falls_back_to_peer_address() {
        assert_eq!(client_ip(&HeaderMap::new(), peer()), "203.0.113.9");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("   "));
        assert_eq!(client_ip(&headers, peer()), "203.0.113.9");
    }

    #[test]
    fn request_id_header_is_sanitized() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req_abc-123"));
        assert_eq!(extract_request_id(&headers), "req_abc-123");

        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("bad id!"));
        let generated = extract_request_id(&headers);
        assert_ne!(generated, "bad id!");
        assert!(generated.parse::<Ulid>().is_ok());
    }

    #[test]
    fn failure_statuses_follow_the_error_taxonomy() {
        let (status, _) = failure_response(&ReportFailure::Oracle(OracleError::Timeout));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = failure_response(&ReportFailure::Malformed(MalformedOutput {
            raw: "prose".to_string(),
        }));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = failure_response(&ReportFailure::Schema(SchemaViolation::Missing(
            "overallScore".to_string(),
        )));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn failure_body_never_carries_raw_oracle_text() {
        let (_, Json(body)) = failure_response(&ReportFailure::Malformed(MalformedOutput {
            raw: "secret oracle prose".to_string(),
        }));
        assert!(!body.error.contains("secret"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 4), "abcd");
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("short", 64), "short");
    }
}
