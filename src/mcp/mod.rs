//! Model Context Protocol integration.
//!
//! [`client::McpClient`] speaks newline-delimited JSON-RPC 2.0 to an
//! external tool-execution server over child-process stdio.
//! [`bridge::McpToolBridge`] adapts the client to a plain execute surface,
//! [`interrupt::ToolInterruptHandler`] wraps calls with typed events,
//! normalization, and artifact externalization, and [`server::BrainMcpServer`]
//! is the complementary server exposing this crate's own tools.

pub mod bridge;
pub mod client;
pub mod interrupt;
pub mod normalizer;
pub mod server;

pub use bridge::{McpToolBridge, ToolBridge};
pub use client::{McpClient, McpError, McpToolDef};
pub use interrupt::{ToolEvent, ToolEventKind, ToolInterruptHandler};
pub use normalizer::{NormalizedOutput, PerceptionAligner, SchemaRegistry};
pub use server::BrainMcpServer;
