//! MCP JSON-RPC 2.0 client over child-process stdio.
//!
//! Spawns the external tool-execution server (default `ygn-core mcp`) and
//! exchanges newline-delimited JSON-RPC 2.0 messages over its stdin/stdout.
//! Request ids increase monotonically per client instance; requests are
//! serialized through `&mut self`.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Protocol version announced during the handshake.
const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Default argv for the external tool server.
const DEFAULT_SERVER_COMMAND: &[&str] = &["ygn-core", "mcp"];

/// Grace period before the subprocess is force-killed on stop.
const STOP_GRACE: Duration = Duration::from_secs(5);

// ── Errors ──────────────────────────────────────────────────────

/// Errors from MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// I/O failure talking to the server process.
    #[error("MCP I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("MCP JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server returned a JSON-RPC error response.
    #[error("MCP error {code}: {message}")]
    Server {
        /// JSON-RPC error code.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// Unexpected response shape or transport state.
    #[error("MCP protocol error: {0}")]
    Protocol(String),

    /// An operation was attempted before `start()` (or after `stop()`).
    #[error("MCP subprocess is not running")]
    NotRunning,
}

// ── Wire types ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<serde_json::Value>,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    data: Option<serde_json::Value>,
}

/// A tool discovered via `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDef {
    /// Tool name as reported by the server.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// JSON Schema for the tool's input.
    #[serde(default = "default_empty_object", rename = "inputSchema")]
    pub input_schema: serde_json::Value,
    /// Optional output schema advertised by the server.
    #[serde(default, rename = "outputSchema")]
    pub output_schema: Option<serde_json::Value>,
}

fn default_empty_object() -> serde_json::Value {
    serde_json::json!({})
}

// ── Client ──────────────────────────────────────────────────────

/// JSON-RPC 2.0 client owning an external tool-server subprocess.
pub struct McpClient {
    command: Vec<String>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    reader: Option<BufReader<ChildStdout>>,
    next_id: u64,
    server_info: serde_json::Value,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("command", &self.command)
            .field("running", &self.child.is_some())
            .finish()
    }
}

impl Default for McpClient {
    fn default() -> Self {
        Self::new(None)
    }
}

impl McpClient {
    /// Client for a configurable server argv; `None` uses the default
    /// `ygn-core mcp`.
    pub fn new(command: Option<Vec<String>>) -> Self {
        Self {
            command: command.unwrap_or_else(|| {
                DEFAULT_SERVER_COMMAND.iter().map(|s| (*s).to_owned()).collect()
            }),
            child: None,
            stdin: None,
            reader: None,
            next_id: 0,
            server_info: serde_json::Value::Null,
        }
    }

    /// Server info captured during the handshake.
    pub fn server_info(&self) -> &serde_json::Value {
        &self.server_info
    }

    /// Spawn the server subprocess and perform the initialization
    /// handshake: `initialize` with protocol version and client info, then
    /// the `notifications/initialized` notification.
    ///
    /// # Errors
    ///
    /// Returns [`McpError`] when the process cannot spawn or the handshake
    /// fails.
    pub async fn start(&mut self) -> Result<(), McpError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(McpError::Protocol("empty server command".to_owned()));
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        self.stdin = child.stdin.take();
        self.reader = child.stdout.take().map(BufReader::new);
        self.child = Some(child);

        let result = self
            .call(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "straylight",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                })),
            )
            .await?;
        self.server_info = result;

        self.send_notification("notifications/initialized", None)
            .await?;
        Ok(())
    }

    /// Stop the server: close stdin to signal EOF, wait up to five seconds
    /// for a clean exit, then force-kill.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Io`] only when the final wait fails.
    pub async fn stop(&mut self) -> Result<(), McpError> {
        self.stdin = None; // dropping closes the pipe
        self.reader = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(status) => {
                status?;
            }
            Err(_) => {
                tracing::warn!("MCP server did not exit in time, killing");
                child.start_kill()?;
                child.wait().await?;
            }
        }
        Ok(())
    }

    /// Discover the server's tools via `tools/list`.
    ///
    /// # Errors
    ///
    /// Returns [`McpError`] on transport or protocol failure.
    pub async fn list_tools(&mut self) -> Result<Vec<McpToolDef>, McpError> {
        let result = self.call("tools/list", None).await?;
        let tools_value = result
            .get("tools")
            .cloned()
            .ok_or_else(|| McpError::Protocol("tools/list: missing 'tools' field".to_owned()))?;
        Ok(serde_json::from_value(tools_value)?)
    }

    /// Invoke a tool via `tools/call`, returning the concatenated text of
    /// all `content` items of type `text`.
    ///
    /// # Errors
    ///
    /// Returns [`McpError`] on transport failure or a JSON-RPC error
    /// response.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<String, McpError> {
        let result = self
            .call(
                "tools/call",
                Some(serde_json::json!({"name": name, "arguments": arguments})),
            )
            .await?;
        let texts: Vec<String> = result
            .get("content")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Ok(texts.join("\n"))
    }

    /// Send a request and wait for its response, skipping any interleaved
    /// server notifications.
    async fn call(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        self.next_id = self.next_id.saturating_add(1);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id,
            method,
            params,
        };
        self.write_line(&serde_json::to_vec(&request)?).await?;

        loop {
            let line = self.read_line().await?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let response: JsonRpcResponse = serde_json::from_str(trimmed)?;

            // Notifications have no id; keep reading.
            if response.id.is_none() || response.id.as_ref().is_some_and(|v| v.is_null()) {
                continue;
            }
            if let Some(err) = response.error {
                return Err(McpError::Server {
                    code: err.code,
                    message: err.message,
                    data: err.data,
                });
            }
            return response.result.ok_or_else(|| {
                McpError::Protocol("response has neither result nor error".to_owned())
            });
        }
    }

    /// Send a notification (no id, no response expected).
    async fn send_notification(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification {
            jsonrpc: "2.0",
            method,
            params,
        };
        self.write_line(&serde_json::to_vec(&notification)?).await
    }

    async fn write_line(&mut self, payload: &[u8]) -> Result<(), McpError> {
        let stdin = self.stdin.as_mut().ok_or(McpError::NotRunning)?;
        stdin.write_all(payload).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, McpError> {
        let reader = self.reader.as_mut().ok_or(McpError::NotRunning)?;
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Err(McpError::Protocol(
                "MCP server closed stdout unexpectedly".to_owned(),
            ));
        }
        Ok(line)
    }
}
