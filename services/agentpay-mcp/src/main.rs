//! AgentPay MCP Server
//!
//! A Model Context Protocol (MCP) server that lets an LLM client drive the
//! AgentPay ledger and the orchestrator.
//!
//! ## MCP Protocol
//!
//! MCP uses JSON-RPC 2.0 over stdio. The server reads one request per line
//! from stdin and writes responses to stdout. Logs go to stderr.
//!
//! ## Available Tools
//!
//! ### Ledger
//! - `register_agent`, `record_earning`, `record_spending`, `transfer`
//! - `get_agent_stats`, `check_balance`, `get_earnings_history`
//!
//! ### Pricing
//! - `get_quote`, `calculate_roi`, `count_words`, `list_specialists`
//!
//! ### Orchestration
//! - `check_budget`, `create_execution_plan`, `hire_agent`
//! - `finalize_workflow`, `orchestrator_status`
//!
//! ### Data analysis
//! - `analyze_data`, `clean_data`, `find_patterns`
//!
//! ## Configuration
//!
//! `AGENTPAY_STORE`, `DATABASE_URL`, `ORCHESTRATOR_ID` and
//! `ORCHESTRATOR_BUDGET_CENTS`, read from the environment or `.env`.
//!
//! ## Usage
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "agentpay": {
//!       "command": "agentpay-mcp"
//!     }
//!   }
//! }
//! ```

use std::sync::Arc;

use agentpay_agents::{DeterministicExecutor, Orchestrator, OrchestratorConfig, ToolRegistry};
use agentpay_ledger::{LedgerConfig, LedgerService};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

// ============================================================================
// JSON-RPC Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    /// Absent on notifications
    #[serde(default)]
    id: Option<serde_json::Value>,
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: serde_json::Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message }),
        }
    }
}

// ============================================================================
// MCP Protocol Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ToolResult {
    content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    is_error: bool,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    dotenvy::dotenv().ok();
    tracing::info!("AgentPay MCP Server starting...");

    let tools = build_tools().await?;
    serve(tools).await
}

/// Wire the ledger and orchestrator from the environment
///
/// A store that cannot be reached is replaced by the in-process shadow
/// ledger; the server keeps running with reduced guarantees.
async fn build_tools() -> anyhow::Result<ToolRegistry> {
    let ledger_config = LedgerConfig::from_env()?;
    tracing::info!(
        backend = ?ledger_config.backend,
        url = %ledger_config.database_url_masked(),
        "Ledger configuration loaded"
    );

    let ledger = match ledger_config.connect().await {
        Ok(store) => LedgerService::new(store),
        Err(e) => {
            tracing::warn!(
                kind = e.kind(),
                error = %e,
                "Ledger store unavailable, falling back to in-memory ledger"
            );
            LedgerService::in_memory()
        }
    };

    let orchestrator_config = OrchestratorConfig::from_env()?;
    let orchestrator = Orchestrator::bootstrap(
        &orchestrator_config,
        ledger.clone(),
        Arc::new(DeterministicExecutor::new()),
    )
    .await?;

    Ok(ToolRegistry::new(ledger, Arc::new(orchestrator)))
}

async fn serve(tools: ToolRegistry) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        tracing::debug!("Received: {}", line);

        let Some(response) = handle_line(&tools, line).await else {
            continue;
        };

        let encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!("Failed to encode response: {}", e);
                continue;
            }
        };

        tracing::debug!("Sending: {}", encoded);
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    tracing::info!("stdin closed, shutting down");
    Ok(())
}

async fn handle_line(tools: &ToolRegistry, line: &str) -> Option<JsonRpcResponse> {
    match serde_json::from_str::<JsonRpcRequest>(line) {
        Ok(request) => handle_request(tools, request).await,
        Err(e) => Some(JsonRpcResponse::error(
            serde_json::Value::Null,
            PARSE_ERROR,
            format!("Parse error: {}", e),
        )),
    }
}

/// `None` for notifications, which get no reply
async fn handle_request(tools: &ToolRegistry, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    let Some(id) = request.id else {
        tracing::debug!(method = %request.method, "Notification");
        return None;
    };

    let response = match request.method.as_str() {
        "initialize" => handle_initialize(id),
        "tools/list" => handle_tools_list(tools, id),
        "tools/call" => handle_tools_call(tools, id, request.params).await,
        "notifications/initialized" => JsonRpcResponse::success(id, serde_json::json!({})),
        _ => JsonRpcResponse::error(
            id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ),
    };
    Some(response)
}

fn handle_initialize(id: serde_json::Value) -> JsonRpcResponse {
    let result = serde_json::json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": "agentpay",
            "version": env!("CARGO_PKG_VERSION")
        }
    });

    JsonRpcResponse::success(id, result)
}

fn handle_tools_list(tools: &ToolRegistry, id: serde_json::Value) -> JsonRpcResponse {
    JsonRpcResponse::success(id, serde_json::json!({ "tools": tools.specs() }))
}

async fn handle_tools_call(
    tools: &ToolRegistry,
    id: serde_json::Value,
    params: serde_json::Value,
) -> JsonRpcResponse {
    let Some(tool_name) = params.get("name").and_then(|n| n.as_str()) else {
        return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing tool name".to_string());
    };

    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    let response = tools.call(tool_name, arguments).await;
    let result = ToolResult {
        is_error: !response.success,
        content: vec![ToolContent::Text {
            text: response.to_json_string(),
        }],
    };

    match serde_json::to_value(&result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, format!("Failed to encode result: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn tools() -> ToolRegistry {
        let ledger = LedgerService::in_memory();
        let orchestrator = Orchestrator::bootstrap(
            &OrchestratorConfig::default(),
            ledger.clone(),
            Arc::new(DeterministicExecutor::new()),
        )
        .await
        .unwrap();
        ToolRegistry::new(ledger, Arc::new(orchestrator))
    }

    async fn roundtrip(tools: &ToolRegistry, line: &str) -> serde_json::Value {
        let response = handle_line(tools, line).await.unwrap();
        serde_json::to_value(&response).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_list() {
        let tools = tools().await;

        let init = roundtrip(&tools, r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#).await;
        assert_eq!(init["result"]["serverInfo"]["name"], "agentpay");

        let list = roundtrip(&tools, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).await;
        let names: Vec<&str> = list["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"hire_agent"));
        assert!(list["result"]["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let tools = tools().await;

        let parse = roundtrip(&tools, "{not json").await;
        assert_eq!(parse["error"]["code"], PARSE_ERROR);

        let unknown = roundtrip(&tools, r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#).await;
        assert_eq!(unknown["error"]["code"], METHOD_NOT_FOUND);

        let notification =
            handle_line(&tools, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
        assert!(notification.is_none());
    }

    #[tokio::test]
    async fn test_tool_failure_is_not_a_transport_error() {
        let tools = tools().await;

        let line = r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"get_agent_stats","arguments":{"agent_name":"ghost"}}}"#;
        let response = roundtrip(&tools, line).await;
        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], true);

        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let body: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["error_kind"], "not_found");

        let line = r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"check_budget"}}"#;
        let response = roundtrip(&tools, line).await;
        assert!(response["result"].get("isError").is_none());
    }
}
