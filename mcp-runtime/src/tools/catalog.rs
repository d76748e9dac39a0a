use serde_json::{Value, json};

use crate::ToolError;
use crate::catalog::resolve_catalog;
use crate::client::ApiClient;

/// `beacon_list_catalog` takes no arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListCatalogRequest;

pub async fn run(client: &ApiClient, _request: ListCatalogRequest) -> Result<Value, ToolError> {
    let catalog = resolve_catalog(client).await?;
    Ok(json!({
        "request": { "path": "/domains" },
        "catalog": catalog.to_payload(),
    }))
}
