//! Backend liveness probe.
//!
//! Independent of `Transport`: its own reqwest client, a 5 second timeout, no
//! credential and no retries, so a slow backend cannot stall the probe for
//! the full request timeout and the probe never touches the session.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    /// 2xx from `/health`.
    Healthy,
    /// A response, but not 2xx.
    Unhealthy,
    /// No response within the timeout.
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid backend URL {url:?}: {reason}")]
pub struct InvalidBackendUrl {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendProbe {
    pub status: BackendStatus,
    pub response_time: Duration,
}

/// GET `{base_url}/health`, timing the round trip.
pub async fn probe_backend(base_url: &str) -> BackendProbe {
    probe_with_timeout(base_url, HEALTH_TIMEOUT).await
}

/// `true` when the backend answered `/health` with a 2xx.
pub async fn check_api_health(base_url: &str) -> bool {
    probe_backend(base_url).await.status == BackendStatus::Healthy
}

/// The `/health` URL under `base_url`, which must be an absolute http(s) URL.
pub fn health_url(base_url: &str) -> Result<reqwest::Url, InvalidBackendUrl> {
    let invalid = |reason: String| InvalidBackendUrl {
        url: base_url.to_string(),
        reason,
    };
    let url = reqwest::Url::parse(&format!("{}{HEALTH_PATH}", base_url.trim_end_matches('/')))
        .map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

pub async fn probe_with_timeout(base_url: &str, timeout: Duration) -> BackendProbe {
    let started = Instant::now();
    let url = match health_url(base_url) {
        Ok(url) => url,
        Err(err) => {
            warn!(error = %err, "API health check failed");
            return BackendProbe {
                status: BackendStatus::Unreachable,
                response_time: started.elapsed(),
            };
        }
    };

    let outcome = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client.get(url.clone()).send().await,
        Err(err) => Err(err),
    };

    let status = match outcome {
        Ok(response) if response.status().is_success() => BackendStatus::Healthy,
        Ok(response) => {
            warn!(%url, status = response.status().as_u16(), "API health check failed");
            BackendStatus::Unhealthy
        }
        Err(err) => {
            warn!(%url, error = %err, "API health check failed");
            BackendStatus::Unreachable
        }
    };

    BackendProbe {
        status,
        response_time: started.elapsed(),
    }
}
