//! Local liveness endpoint for the dashboard process.
//!
//! `GET /api/health` answers 200 whenever this process is up. Backend
//! reachability, including a malformed backend URL, is reported inside the
//! body only. A 503 means the check itself crashed.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use dashboard_core::config::{
    API_URL_VAR, DEFAULT_ENVIRONMENT, ENVIRONMENT_VAR, OUTPUT_STANDALONE_VAR,
};
use dashboard_core::{probe_backend, BackendStatus};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

pub const BUILD_TIME_VAR: &str = "BUILD_TIME";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";
const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    /// `None` when no backend is configured; reported as status `unknown`.
    pub backend_url: Option<String>,
    pub environment: String,
    pub build_time: Option<String>,
    pub standalone_output: bool,
}

impl ProbeSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let present = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            backend_url: present(API_URL_VAR),
            environment: present(ENVIRONMENT_VAR)
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            build_time: present(BUILD_TIME_VAR),
            standalone_output: lookup(OUTPUT_STANDALONE_VAR).as_deref() == Some("true"),
        }
    }

    /// Standalone deployments listen on every interface.
    pub fn bind_host(&self) -> &'static str {
        if self.standalone_output {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("health check task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    pub environment: String,
    pub backend: BackendReport,
    pub build: BuildReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendReport {
    pub url: Option<String>,
    pub status: &'static str,
    pub response_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub version: &'static str,
    pub build_time: String,
}

#[derive(Debug, Serialize)]
struct FailureReport {
    status: &'static str,
    timestamp: String,
    error: &'static str,
    environment: String,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn status_label(status: BackendStatus) -> &'static str {
    match status {
        BackendStatus::Healthy => "healthy",
        BackendStatus::Unhealthy => "unhealthy",
        BackendStatus::Unreachable => "unreachable",
    }
}

pub async fn check(settings: &ProbeSettings) -> HealthReport {
    let (status, response_ms) = match &settings.backend_url {
        Some(url) => {
            let probe = probe_backend(url).await;
            (status_label(probe.status), probe.response_time.as_millis())
        }
        None => (UNKNOWN, 0),
    };

    HealthReport {
        status: "healthy",
        timestamp: now(),
        version: VERSION,
        environment: settings.environment.clone(),
        backend: BackendReport {
            url: settings.backend_url.clone(),
            status,
            response_time: format!("{response_ms}ms"),
        },
        build: BuildReport {
            version: VERSION,
            build_time: settings
                .build_time
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
        },
    }
}

async fn health(State(settings): State<Arc<ProbeSettings>>) -> Response {
    // Run on its own task so a panic in the check becomes a 503.
    let task = {
        let settings = settings.clone();
        tokio::spawn(async move { check(&settings).await })
    };
    match task.await {
        Ok(report) => ([(header::CACHE_CONTROL, NO_CACHE)], Json(report)).into_response(),
        Err(err) => unhealthy(&settings.environment, err.into()),
    }
}

fn unhealthy(environment: &str, err: ProbeError) -> Response {
    error!(error = %err, "Health check failed");
    let body = FailureReport {
        status: "unhealthy",
        timestamp: now(),
        error: "Internal health check error",
        environment: environment.to_string(),
    };
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CACHE_CONTROL, NO_CACHE)],
        Json(body),
    )
        .into_response()
}

async fn security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("origin-when-cross-origin"),
    );
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
    response
}

pub fn app(settings: ProbeSettings) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .layer(middleware::map_response(security_headers))
        .with_state(Arc::new(settings))
}

pub async fn run(listener: TcpListener, settings: ProbeSettings) -> Result<(), std::io::Error> {
    info!(backend = ?settings.backend_url, environment = %settings.environment, "probe ready");
    axum::serve(listener, app(settings)).await
}
