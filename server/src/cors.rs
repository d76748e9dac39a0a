use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

/// Build a CORS layer from the `BEACON_CORS_ORIGINS` env var.
///
/// Unset means permissive: MCP connectors run from many hosted origins and
/// the server carries no browser credentials. When the variable names a
/// comma-separated origin list, only those origins are allowed.
pub fn build_cors_layer() -> CorsLayer {
    let origins = std::env::var("BEACON_CORS_ORIGINS")
        .map(|raw| parse_origins(&raw))
        .unwrap_or_default();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|origin| {
            let trimmed = origin.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(trimmed.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_origins;

    #[test]
    fn parse_origins_splits_and_trims() {
        let origins = parse_origins(" https://claude.ai, https://chatgpt.com ,, ");
        assert_eq!(origins, vec!["https://claude.ai", "https://chatgpt.com"]);
    }

    #[test]
    fn empty_value_yields_no_origins() {
        assert!(parse_origins("").is_empty());
        assert!(parse_origins(" , ").is_empty());
    }
}
