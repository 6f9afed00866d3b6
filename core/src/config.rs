//! Client configuration, read once from the environment at start-up.

use std::time::Duration;

pub const API_URL_VAR: &str = "DASHBOARD_API_URL";
pub const OUTPUT_STANDALONE_VAR: &str = "DASHBOARD_OUTPUT_STANDALONE";
pub const ENVIRONMENT_VAR: &str = "DASHBOARD_ENV";

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable settings shared by every request the client makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: String,
    timeout: Duration,
    standalone_output: bool,
    environment: String,
}

/// Summary handed to the UI for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfigInfo {
    pub base_url: String,
    pub timeout: Duration,
    pub is_production: bool,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            standalone_output: false,
            environment: DEFAULT_ENVIRONMENT.to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = lookup(API_URL_VAR)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let standalone_output = lookup(OUTPUT_STANDALONE_VAR).as_deref() == Some("true");
        let environment = lookup(ENVIRONMENT_VAR)
            .filter(|env| !env.is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        Self {
            standalone_output,
            environment,
            ..Self::new(&base_url)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn standalone_output(&self) -> bool {
        self.standalone_output
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn info(&self) -> ApiConfigInfo {
        ApiConfigInfo {
            base_url: self.base_url.clone(),
            timeout: self.timeout,
            is_production: self.is_production(),
        }
    }
}
