//! MCP stdio server exposing `analyze_dislike` as a tool.
//!
//! Every request runs in its own task so a slow generation call never blocks
//! `ping` or a cancellation notice for it.

use anyhow::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::core::coach::Coach;
use crate::core::conversation::ConversationInput;
use crate::mcp::transport::Transport;
use crate::mcp::types::{
    CallToolParams, CallToolResult, CancelledParams, Implementation, InitializeParams,
    InitializeResult, JsonRpcRequest, JsonRpcResponse, ServerCapabilities, Tool, ToolContent,
    ToolsCapability, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND,
    PARSE_ERROR,
};

pub const SERVER_NAME: &str = "dislike-coach";
pub const TOOL_NAME: &str = "analyze_dislike";

const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2024-11-05", "2025-03-26", "2025-06-18"];

pub fn analyze_dislike_tool() -> Tool {
    Tool {
        name: TOOL_NAME.to_string(),
        description: Some(
            "Analyze a disliked LLM response and suggest a better, self-contained follow-up prompt."
                .to_string(),
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "messages": {
                    "type": "array",
                    "description": "Recent conversation turns, oldest first.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "role": { "type": "string", "enum": ["user", "assistant", "system", "tool"] },
                            "content": { "type": "string" }
                        },
                        "required": ["role", "content"]
                    }
                },
                "user_comment": {
                    "type": "string",
                    "description": "Why the user disliked the last answer."
                },
                "task_hint": {
                    "type": "string",
                    "description": "Short hint about the task domain, e.g. \"coding\" or \"UI design\"."
                }
            },
            "required": ["messages"]
        }),
    }
}

#[derive(Clone)]
pub struct McpServer {
    coach: Arc<Coach>,
    in_flight: Arc<Mutex<HashMap<String, AbortHandle>>>,
}

impl McpServer {
    pub fn new(coach: Arc<Coach>) -> Self {
        Self {
            coach,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Read requests until the peer closes the stream, then wait for the
    /// requests still running.
    pub async fn serve<T: Transport + 'static>(&self, transport: Arc<T>) -> Result<()> {
        info!(server = SERVER_NAME, "MCP server listening on stdio");
        let mut tasks = JoinSet::new();

        while let Some(bytes) = transport.receive_line().await? {
            while tasks.try_join_next().is_some() {}

            let line = match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "non UTF-8 JSON-RPC line");
                    transport
                        .send(&JsonRpcResponse::failure(
                            Value::Null,
                            PARSE_ERROR,
                            format!("Parse error: {}", e),
                        ))
                        .await?;
                    continue;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "unparseable JSON-RPC line");
                    transport
                        .send(&JsonRpcResponse::failure(
                            Value::Null,
                            PARSE_ERROR,
                            format!("Parse error: {}", e),
                        ))
                        .await?;
                    continue;
                }
            };

            let Some(id) = request.id.clone() else {
                self.handle_notification(&request).await;
                continue;
            };

            let key = id.to_string();

            // Registration happens under the lock so the task cannot finish
            // and deregister before its handle is recorded.
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.contains_key(&key) {
                drop(in_flight);
                warn!(request_id = %key, "duplicate id for an in-flight request");
                transport
                    .send(&JsonRpcResponse::failure(
                        id,
                        INVALID_REQUEST,
                        format!("Request id {} is already in flight", key),
                    ))
                    .await?;
                continue;
            }

            let server = self.clone();
            let task_transport = transport.clone();
            let task_key = key.clone();
            let handle = tasks.spawn(async move {
                let response = server.handle_request(request).await;
                server.deregister(&task_key).await;
                if let Err(e) = task_transport.send(&response).await {
                    warn!(error = %e, "failed to write response");
                }
            });
            in_flight.insert(key, handle);
        }

        info!(pending = tasks.len(), "input closed, draining in-flight requests");
        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    /// Drop the in-flight entry for `key` only if it belongs to the calling task.
    async fn deregister(&self, key: &str) {
        let mut in_flight = self.in_flight.lock().await;
        let current = tokio::task::id();
        if in_flight.get(key).is_some_and(|h| h.id() == current) {
            in_flight.remove(key);
        }
    }

    async fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/cancelled" => {
                let params = request
                    .params
                    .clone()
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok());
                let Some(params) = params else {
                    warn!("cancellation without a requestId");
                    return;
                };
                let key = params.request_id.to_string();
                if let Some(handle) = self.in_flight.lock().await.remove(&key) {
                    handle.abort();
                    info!(request_id = %key, reason = ?params.reason, "request cancelled");
                } else {
                    debug!(request_id = %key, "cancellation for unknown or finished request");
                }
            }
            "notifications/initialized" => debug!("client initialized"),
            other => debug!(method = other, "ignoring notification"),
        }
    }

    /// Answer one request that carries an id.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);
        if request.jsonrpc != JSONRPC_VERSION {
            return JsonRpcResponse::failure(id, INVALID_REQUEST, "jsonrpc must be \"2.0\"");
        }

        match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, initialize_result(request.params)),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => {
                JsonRpcResponse::success(id, json!({ "tools": [analyze_dislike_tool()] }))
            }
            "tools/call" => self.call_tool(id, request.params).await,
            other => JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        }
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                return JsonRpcResponse::failure(id, INVALID_PARAMS, format!("Invalid params: {}", e))
            }
            None => return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing params"),
        };

        if params.name != TOOL_NAME {
            return JsonRpcResponse::failure(
                id,
                INVALID_PARAMS,
                format!("Unknown tool: {}", params.name),
            );
        }

        let input: ConversationInput = match serde_json::from_value(params.arguments) {
            Ok(input) => input,
            Err(e) => {
                return JsonRpcResponse::failure(
                    id,
                    INVALID_PARAMS,
                    format!("Invalid arguments for {}: {}", TOOL_NAME, e),
                )
            }
        };

        let result = match self.coach.analyze_dislike(&input).await {
            Ok(analysis) => {
                let structured = serde_json::to_value(&analysis).unwrap_or(Value::Null);
                let text = serde_json::to_string_pretty(&analysis).unwrap_or_default();
                CallToolResult {
                    content: vec![ToolContent::Text { text }],
                    structured_content: Some(structured),
                    is_error: false,
                }
            }
            Err(e) => {
                warn!(error = %e, "analyze_dislike failed");
                CallToolResult {
                    content: vec![ToolContent::Text {
                        text: e.to_string(),
                    }],
                    structured_content: None,
                    is_error: true,
                }
            }
        };

        match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::failure(id, INVALID_PARAMS, e.to_string()),
        }
    }
}

fn initialize_result(params: Option<Value>) -> Value {
    let requested = params
        .and_then(|p| serde_json::from_value::<InitializeParams>(p).ok())
        .map(|p| p.protocol_version);

    let protocol_version = match requested {
        Some(v) if SUPPORTED_PROTOCOL_VERSIONS.contains(&v.as_str()) => v,
        _ => SUPPORTED_PROTOCOL_VERSIONS[0].to_string(),
    };

    let result = InitializeResult {
        protocol_version,
        capabilities: ServerCapabilities {
            tools: ToolsCapability::default(),
        },
        server_info: Implementation {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };
    serde_json::to_value(result).unwrap_or(Value::Null)
}
