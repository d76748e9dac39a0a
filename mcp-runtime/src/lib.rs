use chrono::NaiveDate;
use clap::Subcommand;
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

pub mod catalog;
pub mod client;
pub mod tools;

use beacon_core::config::ApiConfig;
use beacon_core::error::{FetchError, codes};
use beacon_core::render::OutputFormat;
use client::ApiClient;
use tools::catalog::ListCatalogRequest;
use tools::citations::CitationsRequest;
use tools::summary::MonthlySummaryRequest;
use tools::visibility::VisibilityScoresRequest;

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "beacon-mcp";

/// Tool envelopes above this size get trimmed before leaving the server; a
/// month of wide visibility data can otherwise dwarf the model's context.
const TOOL_ENVELOPE_MAX_BYTES: usize = 28_000;
const TRUNCATED_LIST_KEEP: usize = 100;

#[derive(Subcommand, Clone, Debug)]
pub enum McpCommands {
    /// Run the Beacon MCP server over stdio
    Serve,
    /// Probe the upstream API with the configured credential
    Check,
}

/// Binary entry point shared by the stdio server and the transport crate.
pub async fn run(config: ApiConfig, command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve => {
            let mut server = McpServer::new(config);
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err,
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Check => {
            let client = ApiClient::new(config);
            if let Err(err) = client.config().validate() {
                let payload = json!({ "error": err.code(), "message": err.to_string() });
                eprintln!("{}", to_pretty_json(&payload));
                return 2;
            }
            match client.get("/domains", &[]).await {
                Ok(payload) => {
                    let domains = catalog::parse_domains(&payload);
                    println!(
                        "{}",
                        to_pretty_json(&json!({
                            "status": "ok",
                            "baseUrl": client.config().base_url,
                            "domains": domains.len(),
                        }))
                    );
                    0
                }
                Err(err) => {
                    let payload = json!({ "error": err.code(), "message": err.to_string() });
                    eprintln!("{}", to_pretty_json(&payload));
                    if matches!(err, FetchError::Configuration(_)) { 2 } else { 1 }
                }
            }
        }
    }
}

/// Handle one HTTP-delivered JSON-RPC payload (single message or batch).
/// Each request builds a fresh server; all state lives in the config.
pub async fn handle_http_jsonrpc(config: ApiConfig, incoming: Value) -> Vec<Value> {
    let server = McpServer::new(config);
    server.handle_incoming_message(incoming).await
}

struct McpServer {
    client: ApiClient,
}

impl McpServer {
    fn new(config: ApiConfig) -> Self {
        Self {
            client: ApiClient::new(config),
        }
    }

    async fn serve_stdio(&mut self) -> Result<(), String> {
        let stdin = io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut stdout = io::stdout();

        loop {
            let incoming = read_framed_json(&mut reader)
                .await
                .map_err(|e| format!("failed to read MCP message: {e}"))?;
            let Some(incoming) = incoming else {
                break;
            };

            let responses = self.handle_incoming_message(incoming).await;
            for response in responses {
                write_framed_json(&mut stdout, &response)
                    .await
                    .map_err(|e| format!("failed to write MCP response: {e}"))?;
            }
        }

        Ok(())
    }

    async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // Most likely a client response; this server issues no outbound
            // requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            self.handle_notification(method).await;
            None
        }
    }

    async fn handle_notification(&self, method: &str) {
        if matches!(
            method,
            "notifications/initialized" | "notifications/cancelled"
        ) {
            return;
        }
        // Unknown notifications are intentionally ignored.
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "prompts/list" => Ok(json!({ "prompts": [] })),
            "resources/list" => Ok(json!({ "resources": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        let instructions =
            "Call beacon_list_catalog first whenever the user names a domain or topic without \
             ids; it returns the \"Domain > Topic\" mapping the other tools need. \
             beacon_get_visibility_scores returns the pivoted visibility dataset (one row per \
             date and model, one column per entity, brand first) with per-entity summary \
             statistics; pick outputFormat=structured for programmatic use. \
             beacon_get_citations lists the ranked source domains and URLs each model cites. \
             beacon_get_visibility_monthly_summary sweeps every topic (optionally filtered by \
             brandFilter/marketFilter) and averages visibility per month. Dates default to the \
             last 30 days (180 days for the monthly summary).";
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "prompts": { "listChanged": false },
                "resources": { "listChanged": false }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": instructions
        })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let outcome = match ToolRequest::parse(name, &args) {
            Ok(request) => self.execute_tool(request).await,
            Err(err) => Err(err),
        };

        Ok(match outcome {
            Ok(payload) => {
                let envelope = enforce_tool_payload_limit(
                    name,
                    json!({
                        "status": "complete",
                        "tool": name,
                        "data": payload
                    }),
                );
                build_tool_call_response(envelope, false)
            }
            Err(err) => {
                let envelope = json!({
                    "status": "error",
                    "tool": name,
                    "error": err.to_value()
                });
                build_tool_call_response(envelope, true)
            }
        })
    }

    async fn execute_tool(&self, request: ToolRequest) -> Result<Value, ToolError> {
        match request {
            ToolRequest::ListCatalog(request) => tools::catalog::run(&self.client, request).await,
            ToolRequest::GetVisibilityScores(request) => {
                tools::visibility::run(&self.client, request).await
            }
            ToolRequest::GetCitations(request) => {
                tools::citations::run(&self.client, request).await
            }
            ToolRequest::GetVisibilityMonthlySummary(request) => {
                tools::summary::run(&self.client, request).await
            }
        }
    }
}

/// The four tool request shapes, parsed and validated before dispatch so
/// the tool implementations only ever see well-formed input.
#[derive(Debug, Clone, PartialEq)]
enum ToolRequest {
    ListCatalog(ListCatalogRequest),
    GetVisibilityScores(VisibilityScoresRequest),
    GetCitations(CitationsRequest),
    GetVisibilityMonthlySummary(MonthlySummaryRequest),
}

impl ToolRequest {
    fn parse(name: &str, args: &Map<String, Value>) -> Result<Self, ToolError> {
        match name {
            "beacon_list_catalog" => Ok(ToolRequest::ListCatalog(ListCatalogRequest)),
            "beacon_get_visibility_scores" => {
                Ok(ToolRequest::GetVisibilityScores(VisibilityScoresRequest {
                    domain_id: required_string(args, "domainId")?,
                    topic_id: required_string(args, "topicId")?,
                    start_date: arg_optional_date(args, "startDate")?,
                    end_date: arg_optional_date(args, "endDate")?,
                    models: arg_optional_model_list(args)?,
                    output_format: arg_output_format(args)?,
                }))
            }
            "beacon_get_citations" => Ok(ToolRequest::GetCitations(CitationsRequest {
                domain_id: required_string(args, "domainId")?,
                topic_id: required_string(args, "topicId")?,
                start_date: arg_optional_date(args, "startDate")?,
                end_date: arg_optional_date(args, "endDate")?,
                models: arg_optional_model_list(args)?,
            })),
            "beacon_get_visibility_monthly_summary" => Ok(
                ToolRequest::GetVisibilityMonthlySummary(MonthlySummaryRequest {
                    start_date: arg_optional_date(args, "startDate")?,
                    end_date: arg_optional_date(args, "endDate")?,
                    models: arg_optional_model_list(args)?,
                    brand_filter: arg_optional_string(args, "brandFilter")?,
                    market_filter: arg_optional_string(args, "marketFilter")?,
                }),
            ),
            _ => Err(ToolError::new(
                codes::UNKNOWN_TOOL,
                format!("Unknown tool '{name}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
    pub docs_hint: Option<String>,
    pub details: Option<Value>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
            docs_hint: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code,
            "message": self.message
        });
        if let Some(field) = &self.field {
            payload["field"] = Value::String(field.clone());
        }
        if let Some(docs_hint) = &self.docs_hint {
            payload["docs_hint"] = Value::String(docs_hint.clone());
        }
        if let Some(details) = &self.details {
            payload["details"] = details.clone();
        }
        payload
    }
}

impl From<FetchError> for ToolError {
    fn from(err: FetchError) -> Self {
        let tool_err = ToolError::new(err.code(), err.to_string());
        match err {
            FetchError::Configuration(_) => tool_err.with_docs_hint(
                "Set BEACON_API_KEY (and optionally BEACON_API_URL) before starting the server.",
            ),
            FetchError::Upstream { status, .. } => {
                tool_err.with_details(json!({ "status": status }))
            }
            FetchError::Transport(_) => tool_err
                .with_docs_hint("Check network reachability of the Beacon API and retry."),
        }
    }
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "beacon_list_catalog",
            description:
                "List every tracked domain and topic with a \"Domain > Topic\" name-to-id \
                 mapping. Call this first when the user names a domain or topic without ids.",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "beacon_get_visibility_scores",
            description:
                "Full visibility dataset for one topic with per-LLM split: one row per date \
                 and model (GLOBAL plus each model), one column per entity with the tracked \
                 brand first, period-over-period variations, and per-entity summary statistics.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "domainId": {
                        "type": "string",
                        "description": "Domain id (resolve via beacon_list_catalog)"
                    },
                    "topicId": {
                        "type": "string",
                        "description": "Topic id (resolve via beacon_list_catalog)"
                    },
                    "startDate": {
                        "type": "string",
                        "description": "YYYY-MM-DD; defaults to 30 days before today"
                    },
                    "endDate": {
                        "type": "string",
                        "description": "YYYY-MM-DD; defaults to today"
                    },
                    "models": {
                        "type": "string",
                        "description": "Comma-separated model filter; defaults to every available model"
                    },
                    "outputFormat": {
                        "type": "string",
                        "enum": ["markdown", "csv", "tsv", "structured"],
                        "default": "markdown"
                    }
                },
                "required": ["domainId", "topicId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "beacon_get_citations",
            description:
                "Ranked citation sources per model for one topic: top domains, top URLs, and \
                 their over-time series, GLOBAL first with rank restarting at 1 per model.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "domainId": { "type": "string" },
                    "topicId": { "type": "string" },
                    "startDate": {
                        "type": "string",
                        "description": "YYYY-MM-DD; defaults to 30 days before today"
                    },
                    "endDate": {
                        "type": "string",
                        "description": "YYYY-MM-DD; defaults to today"
                    },
                    "models": {
                        "type": "string",
                        "description": "Comma-separated model filter; defaults to every available model"
                    }
                },
                "required": ["domainId", "topicId"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "beacon_get_visibility_monthly_summary",
            description:
                "Monthly average visibility across every tracked topic, from raw reports. \
                 Filter with brandFilter (domain name substring) and marketFilter (topic name \
                 substring). Fetches are batched to stay under upstream rate limits.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "startDate": {
                        "type": "string",
                        "description": "YYYY-MM-DD; defaults to 180 days before today"
                    },
                    "endDate": {
                        "type": "string",
                        "description": "YYYY-MM-DD; defaults to today"
                    },
                    "models": {
                        "type": "string",
                        "description": "Comma-separated model filter passed through to the raw report endpoint"
                    },
                    "brandFilter": {
                        "type": "string",
                        "description": "Case-insensitive substring match on domain display names"
                    },
                    "marketFilter": {
                        "type": "string",
                        "description": "Case-insensitive substring match on topic display names"
                    }
                },
                "additionalProperties": false
            }),
        },
    ]
}

fn tools_list_payload() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = args.get(key).ok_or_else(|| {
        ToolError::new(
            codes::VALIDATION_FAILED,
            format!("Missing required field '{key}'"),
        )
        .with_field(key)
    })?;
    match value {
        Value::String(v) if !v.trim().is_empty() => Ok(v.clone()),
        Value::String(_) => Err(ToolError::new(
            codes::VALIDATION_FAILED,
            format!("'{key}' must not be empty"),
        )
        .with_field(key)),
        _ => Err(ToolError::new(
            codes::VALIDATION_FAILED,
            format!("'{key}' must be a string"),
        )
        .with_field(key)),
    }
}

fn arg_optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(ToolError::new(
            codes::VALIDATION_FAILED,
            format!("'{key}' must be a string"),
        )
        .with_field(key)),
    }
}

/// Optional ISO date argument. The table sort relies on fixed-width
/// zero-padded dates, so anything else is rejected up front.
fn arg_optional_date(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ToolError> {
    let Some(raw) = arg_optional_string(args, key)? else {
        return Ok(None);
    };
    if NaiveDate::parse_from_str(&raw, "%Y-%m-%d").is_err() {
        return Err(ToolError::new(
            codes::VALIDATION_FAILED,
            format!("'{key}' must be a YYYY-MM-DD date"),
        )
        .with_field(key)
        .with_docs_hint("Dates are zero-padded ISO strings, e.g. 2026-01-31."));
    }
    Ok(Some(raw))
}

/// `models` is a comma-separated string, matching the upstream query shape.
fn arg_optional_model_list(args: &Map<String, Value>) -> Result<Option<Vec<String>>, ToolError> {
    let Some(raw) = arg_optional_string(args, "models")? else {
        return Ok(None);
    };
    let models: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .map(ToString::to_string)
        .collect();
    Ok(if models.is_empty() { None } else { Some(models) })
}

fn arg_output_format(args: &Map<String, Value>) -> Result<OutputFormat, ToolError> {
    let Some(raw) = arg_optional_string(args, "outputFormat")? else {
        return Ok(OutputFormat::default());
    };
    raw.parse::<OutputFormat>().map_err(|reason| {
        ToolError::new(codes::VALIDATION_FAILED, reason).with_field("outputFormat")
    })
}

fn build_tool_call_response(envelope: Value, is_error: bool) -> Value {
    let text = to_pretty_json(&envelope);
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": envelope
        })
    }
}

/// Trim oversized envelopes: rendered table text first, then record lists.
/// Whatever remains is annotated so the caller knows to narrow the query.
fn enforce_tool_payload_limit(tool: &str, envelope: Value) -> Value {
    let original_bytes = serialized_json_size_bytes(&envelope);
    if original_bytes <= TOOL_ENVELOPE_MAX_BYTES {
        return envelope;
    }

    let mut trimmed = envelope;
    if let Some(content) = trimmed.pointer_mut("/data/dataset/content") {
        if let Some(text) = content.as_str() {
            *content = Value::String(truncate_lines(text, TOOL_ENVELOPE_MAX_BYTES / 2));
        }
    }
    for pointer in [
        "/data/dataset/records/rows",
        "/data/report/topDomains",
        "/data/report/topUrls",
        "/data/report/domainsOverTime",
        "/data/report/urlsOverTime",
        "/data/summary/rows",
        "/data/topicOutcomes",
    ] {
        if serialized_json_size_bytes(&trimmed) <= TOOL_ENVELOPE_MAX_BYTES {
            break;
        }
        if let Some(list) = trimmed.pointer_mut(pointer).and_then(Value::as_array_mut) {
            if list.len() > TRUNCATED_LIST_KEEP {
                list.truncate(TRUNCATED_LIST_KEEP);
            }
        }
    }

    let trimmed_bytes = serialized_json_size_bytes(&trimmed);
    if trimmed_bytes <= TOOL_ENVELOPE_MAX_BYTES {
        trimmed["truncation"] = json!({
            "reason": "payload_size_limit",
            "limit_bytes": TOOL_ENVELOPE_MAX_BYTES,
            "original_bytes": original_bytes,
            "trimmed_bytes": trimmed_bytes,
            "details_hint": "Narrow the date range or model filter to retrieve the full dataset."
        });
        return trimmed;
    }

    json!({
        "status": "complete",
        "tool": tool,
        "truncated": true,
        "truncation": {
            "reason": "payload_size_limit",
            "strategy": "minimal_fallback",
            "limit_bytes": TOOL_ENVELOPE_MAX_BYTES,
            "original_bytes": original_bytes,
            "details_hint": "Narrow the date range or model filter to retrieve the full dataset."
        }
    })
}

fn truncate_lines(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut out = String::with_capacity(max_bytes);
    for line in text.lines() {
        if out.len() + line.len() + 1 > max_bytes {
            break;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("[truncated]");
    out
}

fn serialized_json_size_bytes(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(usize::MAX)
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

async fn read_framed_json(
    reader: &mut BufReader<tokio::io::Stdin>,
) -> Result<Option<Value>, std::io::Error> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if content_length.is_none() {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "unexpected EOF while reading MCP headers",
            ));
        }

        if line == "\r\n" {
            break;
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = line
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "missing Content-Length header",
        )
    })?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    let json: Value = serde_json::from_slice(&payload).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid JSON payload: {e}"),
        )
    })?;
    Ok(Some(json))
}

async fn write_framed_json(
    writer: &mut tokio::io::Stdout,
    value: &Value,
) -> Result<(), std::io::Error> {
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("failed to serialize JSON: {e}"),
        )
    })?;
    let header = format!(
        "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
        body.len()
    );
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use beacon_core::config::ApiConfig;
    use beacon_core::render::OutputFormat;
    use serde_json::{Map, Value, json};

    use super::{
        McpServer, TOOL_ENVELOPE_MAX_BYTES, ToolRequest, build_tool_call_response,
        enforce_tool_payload_limit, serialized_json_size_bytes, tool_definitions,
        tools_list_payload,
    };

    fn server() -> McpServer {
        McpServer::new(ApiConfig::new(None, "http://127.0.0.1:9"))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn tool_definitions_cover_the_four_operations() {
        let names: Vec<&str> = tool_definitions().iter().map(|tool| tool.name).collect();
        assert_eq!(
            names,
            vec![
                "beacon_list_catalog",
                "beacon_get_visibility_scores",
                "beacon_get_citations",
                "beacon_get_visibility_monthly_summary",
            ]
        );
    }

    #[test]
    fn visibility_schema_requires_ids_and_defaults_to_markdown() {
        let defs = tool_definitions();
        let tool = defs
            .iter()
            .find(|tool| tool.name == "beacon_get_visibility_scores")
            .expect("visibility tool must exist");
        assert_eq!(tool.input_schema["required"], json!(["domainId", "topicId"]));
        assert_eq!(
            tool.input_schema["properties"]["outputFormat"]["default"],
            "markdown"
        );
    }

    #[test]
    fn tools_list_payload_exposes_input_schemas() {
        let payload = tools_list_payload();
        let tools = payload["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 4);
        assert!(tools.iter().all(|tool| tool.get("inputSchema").is_some()));
    }

    #[test]
    fn parse_rejects_missing_required_ids() {
        let err = ToolRequest::parse("beacon_get_visibility_scores", &args(json!({})))
            .expect_err("missing ids must fail validation");
        assert_eq!(err.code, "validation_failed");
        assert_eq!(err.field.as_deref(), Some("domainId"));
    }

    #[test]
    fn parse_rejects_non_iso_dates() {
        let err = ToolRequest::parse(
            "beacon_get_visibility_scores",
            &args(json!({
                "domainId": "d1",
                "topicId": "t1",
                "startDate": "01/31/2026"
            })),
        )
        .expect_err("US-style date must fail validation");
        assert_eq!(err.field.as_deref(), Some("startDate"));
    }

    #[test]
    fn parse_splits_comma_separated_models() {
        let request = ToolRequest::parse(
            "beacon_get_citations",
            &args(json!({
                "domainId": "d1",
                "topicId": "t1",
                "models": "gpt-4o, claude,,"
            })),
        )
        .unwrap();
        let ToolRequest::GetCitations(request) = request else {
            panic!("expected citations request");
        };
        assert_eq!(request.models, Some(vec!["gpt-4o".to_string(), "claude".to_string()]));
    }

    #[test]
    fn parse_defaults_output_format_and_rejects_unknown() {
        let request = ToolRequest::parse(
            "beacon_get_visibility_scores",
            &args(json!({ "domainId": "d1", "topicId": "t1" })),
        )
        .unwrap();
        let ToolRequest::GetVisibilityScores(request) = request else {
            panic!("expected visibility request");
        };
        assert_eq!(request.output_format, OutputFormat::Markdown);

        let err = ToolRequest::parse(
            "beacon_get_visibility_scores",
            &args(json!({ "domainId": "d1", "topicId": "t1", "outputFormat": "xml" })),
        )
        .expect_err("unknown format must fail validation");
        assert_eq!(err.field.as_deref(), Some("outputFormat"));
    }

    #[test]
    fn parse_flags_unknown_tools() {
        let err = ToolRequest::parse("beacon_delete_everything", &Map::new())
            .expect_err("unknown tool must be rejected");
        assert_eq!(err.code, "unknown_tool");
    }

    #[tokio::test]
    async fn non_jsonrpc_payload_gets_invalid_request() {
        let responses = server()
            .handle_incoming_message(json!({ "method": "tools/list", "id": 1 }))
            .await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let responses = server()
            .handle_incoming_message(json!({
                "jsonrpc": "2.0",
                "method": "notifications/initialized"
            }))
            .await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn initialize_advertises_tools_and_instructions() {
        let responses = server()
            .handle_incoming_message(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {}
            }))
            .await;
        let result = &responses[0]["result"];
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "beacon-mcp");
        assert!(
            result["instructions"]
                .as_str()
                .unwrap()
                .contains("beacon_list_catalog")
        );
    }

    #[tokio::test]
    async fn tool_call_without_credential_is_a_configuration_error() {
        let responses = server()
            .handle_incoming_message(json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": { "name": "beacon_list_catalog", "arguments": {} }
            }))
            .await;
        let result = &responses[0]["result"];
        assert_eq!(result["isError"], true);
        assert_eq!(
            result["structuredContent"]["error"]["error"],
            "configuration_error"
        );
    }

    #[test]
    fn small_envelopes_pass_through_untouched() {
        let envelope = json!({ "status": "complete", "tool": "beacon_list_catalog", "data": {} });
        assert_eq!(
            enforce_tool_payload_limit("beacon_list_catalog", envelope.clone()),
            envelope
        );
    }

    #[test]
    fn oversized_rendered_content_is_line_truncated() {
        let content = "| a | b |\n".repeat(8_000);
        let envelope = json!({
            "status": "complete",
            "tool": "beacon_get_visibility_scores",
            "data": { "dataset": { "content": content } }
        });
        let trimmed = enforce_tool_payload_limit("beacon_get_visibility_scores", envelope);
        assert!(serialized_json_size_bytes(&trimmed) <= TOOL_ENVELOPE_MAX_BYTES);
        let text = trimmed["data"]["dataset"]["content"].as_str().unwrap();
        assert!(text.ends_with("[truncated]"));
        assert_eq!(trimmed["truncation"]["reason"], "payload_size_limit");
    }

    #[test]
    fn error_envelopes_set_the_is_error_flag() {
        let response = build_tool_call_response(json!({ "status": "error" }), true);
        assert_eq!(response["isError"], true);
        assert_eq!(response["content"][0]["type"], "text");

        let response = build_tool_call_response(json!({ "status": "complete" }), false);
        assert!(response.get("isError").is_none());
    }
}
