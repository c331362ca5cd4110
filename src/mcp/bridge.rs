//! Bridge between MCP tools and the execution pipeline.
//!
//! The orchestration side consumes a plain discover-then-execute surface
//! and never sees JSON-RPC details.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::client::{McpClient, McpToolDef};

/// Anything that can execute a named tool with JSON arguments.
#[async_trait]
pub trait ToolBridge: Send + Sync {
    /// Execute a tool, returning its text result.
    async fn execute(&self, tool_name: &str, arguments: serde_json::Value)
        -> anyhow::Result<String>;
}

/// [`ToolBridge`] over an [`McpClient`], with a cached tool catalog.
pub struct McpToolBridge {
    client: Mutex<McpClient>,
    tools: std::sync::Mutex<Vec<McpToolDef>>,
}

impl McpToolBridge {
    /// Bridge over a started client.
    pub fn new(client: McpClient) -> Self {
        Self {
            client: Mutex::new(client),
            tools: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Discover and cache the server's tools.
    ///
    /// # Errors
    ///
    /// Propagates MCP transport and protocol failures.
    pub async fn discover(&self) -> anyhow::Result<Vec<McpToolDef>> {
        let tools = self.client.lock().await.list_tools().await?;
        if let Ok(mut cached) = self.tools.lock() {
            *cached = tools.clone();
        }
        Ok(tools)
    }

    /// The cached tool catalog from the last [`McpToolBridge::discover`].
    pub fn available_tools(&self) -> Vec<McpToolDef> {
        self.tools.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Stop the underlying client subprocess.
    ///
    /// # Errors
    ///
    /// Propagates the final wait failure from the client.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.client.lock().await.stop().await?;
        Ok(())
    }
}

#[async_trait]
impl ToolBridge for McpToolBridge {
    async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> anyhow::Result<String> {
        Ok(self
            .client
            .lock()
            .await
            .call_tool(tool_name, arguments)
            .await?)
    }
}
