use std::time::Duration;

use serde_json::Value;

use beacon_core::config::ApiConfig;
use beacon_core::error::FetchError;

const API_KEY_HEADER: &str = "X-API-Key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated client for the Beacon analytics API. Holds the injected
/// configuration; nothing below this reads the environment.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: ApiConfig,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Issue a single GET against `base_url + path`. No retries; callers
    /// decide whether a failure skips the item or fails the invocation.
    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, FetchError> {
        let api_key = self.config.require_api_key()?.to_string();
        let path = normalize_path(path);

        let mut url = reqwest::Url::parse(&format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            path
        ))
        .map_err(|e| FetchError::Configuration(format!("invalid API URL/path: {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        let response = self
            .http
            .get(url)
            .header(API_KEY_HEADER, api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Transport(format!(
                        "request to {path} timed out after {}s",
                        REQUEST_TIMEOUT.as_secs()
                    ))
                } else {
                    FetchError::Transport(format!(
                        "failed to reach Beacon API at {}: {e}",
                        self.config.base_url
                    ))
                }
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            FetchError::Transport(format!("failed to read API response body: {e}"))
        })?;

        if !status.is_success() {
            return Err(FetchError::Upstream {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).trim().to_string(),
            });
        }

        Ok(parse_response_body(&bytes))
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn parse_response_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}
