//! OpenTelemetry instrumentation for MCP tools, resources, and prompts
//!
//! This crate wraps MCP handler functions so that each invocation produces
//! one distributed-tracing span, enriched with:
//!
//! - **Session/user attribution**: resolved per call from an extractor
//!   closure, the request's HTTP headers (`Mcp-Session-Id`, the JWT subject
//!   in `Authorization`), or client-level defaults, in that order
//! - **Call detail**: serialized arguments and return value, status,
//!   wall-clock latency, and error type/message on failure
//! - **OTLP export**: batched span export to a collector endpoint with
//!   structured JSON logging, via the `tracing` / OpenTelemetry bridge
//!
//! Attribution is best-effort: a missing header, malformed token, or
//! declining extractor degrades to the next source, never to a failed call.
//! JWT subjects are read without signature verification and must not be
//! treated as authentication.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mcp_telemetry::{TelemetryClient, TelemetryConfig};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), mcp_telemetry::TelemetryError> {
//! let client = TelemetryClient::init(
//!     TelemetryConfig::builder()
//!         .service_name("search-server")
//!         .environment("production")
//!         .build(),
//! )?;
//!
//! let search = client.tool("search");
//! let result: Result<Vec<String>, std::io::Error> =
//!     search.invoke(json!({"q": "rust", "limit": 5}), |_args| {
//!         Ok(vec!["a".to_string(), "b".to_string()])
//!     });
//!
//! client.flush()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod instrument;

pub mod context;

// Re-exports
pub use client::{SpanScope, TelemetryClient};
pub use config::{TelemetryConfig, TelemetryConfigBuilder, env_vars};
pub use context::{
    ANONYMOUS_USER, Attribution, Extractor, RequestContext, headers, parse_jwt_claims,
    resolve_attribution, user_id_from_token,
};
pub use error::{TelemetryError, TelemetryResult};
pub use instrument::{InstrumentKind, Traced};

/// MCP span attribute keys
pub mod span_attributes {
    /// Tool name for tool-call spans
    pub const MCP_TOOL_NAME: &str = "mcp.tool.name";
    /// Serialized tool-call arguments
    pub const MCP_TOOL_ARGUMENTS: &str = "mcp.tool.arguments";
    /// Serialized tool-call result
    pub const MCP_TOOL_RESULT: &str = "mcp.tool.result";

    /// Resource URI for resource-access spans
    pub const MCP_RESOURCE_URI: &str = "mcp.resource.uri";
    /// Serialized resource-access arguments
    pub const MCP_RESOURCE_ARGUMENTS: &str = "mcp.resource.arguments";
    /// Serialized resource-access result
    pub const MCP_RESOURCE_RESULT: &str = "mcp.resource.result";

    /// Prompt name for prompt spans
    pub const MCP_PROMPT_NAME: &str = "mcp.prompt.name";
    /// Serialized prompt arguments
    pub const MCP_PROMPT_ARGUMENTS: &str = "mcp.prompt.arguments";
    /// Serialized prompt messages
    pub const MCP_PROMPT_MESSAGES: &str = "mcp.prompt.messages";

    /// Serialized input for general-purpose observation spans
    pub const MCP_INPUT: &str = "mcp.input";
    /// Serialized output for general-purpose observation spans
    pub const MCP_OUTPUT: &str = "mcp.output";

    /// Resolved session id (omitted when unresolved)
    pub const MCP_SESSION_ID: &str = "mcp.session.id";
    /// Resolved user id (`"anonymous"` when unresolved)
    pub const MCP_USER_ID: &str = "mcp.user.id";

    /// Call status: success, error, or cancelled
    pub const MCP_STATUS: &str = "mcp.status";
    /// Wall-clock call duration in milliseconds
    pub const MCP_DURATION_MS: &str = "mcp.duration_ms";
    /// Error type when the call failed
    pub const MCP_ERROR_TYPE: &str = "mcp.error.type";
    /// Error message when the call failed
    pub const MCP_ERROR_MESSAGE: &str = "mcp.error.message";
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use super::client::{SpanScope, TelemetryClient};
    pub use super::config::{TelemetryConfig, TelemetryConfigBuilder};
    pub use super::context::{ANONYMOUS_USER, Attribution, RequestContext, resolve_attribution};
    pub use super::error::{TelemetryError, TelemetryResult};
    pub use super::instrument::{InstrumentKind, Traced};
    pub use super::span_attributes;
}
