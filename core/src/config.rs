use url::Url;

use crate::error::FetchError;

/// Default Beacon API base URL, overridable via `BEACON_API_URL`.
pub const DEFAULT_BASE_URL: &str = "https://api.getbeacon.ai/api";

/// Display name used for the tracked brand when the workspace has not
/// configured one.
pub const DEFAULT_BRAND_NAME: &str = "Your Brand";

/// Upstream API configuration, injected into the client at construction.
/// Business logic never reads environment variables directly.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Static credential sent as the `X-API-Key` header. `None` lets the
    /// server start; every tool call then fails with a configuration error.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Label used for the primary entity in datasets.
    pub brand_name: String,
}

impl ApiConfig {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: base_url.into(),
            brand_name: DEFAULT_BRAND_NAME.to_string(),
        }
    }

    /// Read `BEACON_API_KEY`, `BEACON_API_URL`, and `BEACON_BRAND_NAME`.
    pub fn from_env() -> Self {
        let mut config = Self::new(
            std::env::var("BEACON_API_KEY").ok(),
            std::env::var("BEACON_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        );
        if let Ok(brand_name) = std::env::var("BEACON_BRAND_NAME") {
            if !brand_name.trim().is_empty() {
                config.brand_name = brand_name;
            }
        }
        config
    }

    pub fn with_brand_name(mut self, brand_name: impl Into<String>) -> Self {
        let brand_name = brand_name.into();
        if !brand_name.trim().is_empty() {
            self.brand_name = brand_name;
        }
        self
    }

    /// The credential, or a `Configuration` error when absent.
    pub fn require_api_key(&self) -> Result<&str, FetchError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                FetchError::Configuration(
                    "BEACON_API_KEY is not set; the Beacon API requires a credential".to_string(),
                )
            })
    }

    /// Validate the base URL shape without issuing a request.
    pub fn validate(&self) -> Result<(), FetchError> {
        Url::parse(&self.base_url).map_err(|e| {
            FetchError::Configuration(format!("invalid base URL '{}': {e}", self.base_url))
        })?;
        Ok(())
    }
}
