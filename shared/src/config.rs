use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::AccessPolicy;
use crate::capabilities::http::{ValidatedUrl, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS};
use crate::error::{AppError, ErrorKind};
use crate::list_view::{DEFAULT_ITEMS_PER_PAGE, DEFAULT_PAGE_WINDOW};

pub const MAX_ITEMS_PER_PAGE: usize = 100;
pub const MAX_PAGE_WINDOW: usize = 15;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(String),

    #[error("invalid api.base_url: {0}")]
    BaseUrl(String),

    #[error("invalid api.timeout_ms: {0}")]
    Timeout(String),
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Configuration, e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Applied by the host's HTTP client; an expired request comes back as
    /// `crux_http::Error::Timeout`.
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub items_per_page: usize,
    pub page_window: usize,
    pub access: AccessPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            page_window: DEFAULT_PAGE_WINDOW,
            access: AccessPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Parses, validates and clamps. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config.clamped())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ValidatedUrl::new(self.api.base_url.as_str()).map_err(|e| ConfigError::BaseUrl(e.to_string()))?;

        if self.api.timeout_ms == 0 {
            return Err(ConfigError::Timeout("must be > 0".into()));
        }
        if self.api.timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::Timeout(format!("must be <= {MAX_TIMEOUT_MS}")));
        }
        Ok(())
    }

    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.items_per_page = self.items_per_page.clamp(1, MAX_ITEMS_PER_PAGE);
        self.page_window = self.page_window.clamp(1, MAX_PAGE_WINDOW);
        self.api.base_url = self.api.base_url.trim_end_matches('/').to_string();
        self
    }
}
