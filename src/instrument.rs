//! Span instrumentation for MCP handlers
//!
//! [`Traced`] is the explicit higher-order wrapper around a tool, resource,
//! prompt, or arbitrary function: each `invoke`/`invoke_async` produces one
//! span carrying resolved attribution, serialized input and output, status,
//! and wall-clock latency. Errors from the wrapped function pass through
//! unchanged; nothing in here can fail the instrumented call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, Span, debug, field, info_span};

use crate::config::TelemetryConfig;
use crate::context::{Extractor, resolve_attribution};
use crate::span_attributes::*;

/// Span status values recorded under `mcp.status`
mod status {
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
    pub const CANCELLED: &str = "cancelled";
}

/// What kind of MCP callable a [`Traced`] wraps. Selects the attribute keys
/// used for the call's name, arguments, and result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    /// MCP tool call (`mcp.tool.*` attributes)
    Tool,
    /// MCP resource access (`mcp.resource.*` attributes)
    Resource,
    /// MCP prompt call (`mcp.prompt.*` attributes)
    Prompt,
    /// General-purpose observation (`mcp.input`/`mcp.output`)
    Internal,
}

impl InstrumentKind {
    fn args_key(self) -> &'static str {
        match self {
            Self::Tool => MCP_TOOL_ARGUMENTS,
            Self::Resource => MCP_RESOURCE_ARGUMENTS,
            Self::Prompt => MCP_PROMPT_ARGUMENTS,
            Self::Internal => MCP_INPUT,
        }
    }

    fn result_key(self) -> &'static str {
        match self {
            Self::Tool => MCP_TOOL_RESULT,
            Self::Resource => MCP_RESOURCE_RESULT,
            Self::Prompt => MCP_PROMPT_MESSAGES,
            Self::Internal => MCP_OUTPUT,
        }
    }
}

/// Immutable instrumentation wrapper for one named callable.
///
/// Built from [`TelemetryClient`](crate::TelemetryClient) (or directly from a
/// shared config) and reused across calls; concurrent invocations are fully
/// independent. Cloning is cheap, so per-request variants (e.g. with that
/// request's headers) are made with `clone()` + a builder setter.
///
/// # Example
///
/// ```rust
/// use mcp_telemetry::{TelemetryConfig, Traced};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let config = Arc::new(TelemetryConfig::default());
/// let search = Traced::tool("search", config);
///
/// let result: Result<Vec<String>, std::io::Error> =
///     search.invoke(json!({"q": "rust", "limit": 5}), |_args| {
///         Ok(vec!["a".to_string(), "b".to_string()])
///     });
/// assert!(result.is_ok());
/// ```
#[derive(Clone)]
pub struct Traced {
    kind: InstrumentKind,
    name: String,
    config: Arc<TelemetryConfig>,
    headers: Option<HashMap<String, String>>,
    session_extractor: Option<Extractor>,
    user_extractor: Option<Extractor>,
    capture_input: bool,
    capture_output: bool,
}

impl std::fmt::Debug for Traced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traced")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("headers", &self.headers)
            .field("capture_input", &self.capture_input)
            .field("capture_output", &self.capture_output)
            .finish_non_exhaustive()
    }
}

impl Traced {
    /// Create a wrapper with an explicit kind
    #[must_use]
    pub fn new(kind: InstrumentKind, name: impl Into<String>, config: Arc<TelemetryConfig>) -> Self {
        Self {
            kind,
            name: name.into(),
            config,
            headers: None,
            session_extractor: None,
            user_extractor: None,
            capture_input: true,
            capture_output: true,
        }
    }

    /// Wrapper for an MCP tool call
    #[must_use]
    pub fn tool(name: impl Into<String>, config: Arc<TelemetryConfig>) -> Self {
        Self::new(InstrumentKind::Tool, name, config)
    }

    /// Wrapper for an MCP resource access; `uri` names the resource
    #[must_use]
    pub fn resource(uri: impl Into<String>, config: Arc<TelemetryConfig>) -> Self {
        Self::new(InstrumentKind::Resource, uri, config)
    }

    /// Wrapper for an MCP prompt call
    #[must_use]
    pub fn prompt(name: impl Into<String>, config: Arc<TelemetryConfig>) -> Self {
        Self::new(InstrumentKind::Prompt, name, config)
    }

    /// General-purpose wrapper with no MCP-specific semantics
    #[must_use]
    pub fn observe(name: impl Into<String>, config: Arc<TelemetryConfig>) -> Self {
        Self::new(InstrumentKind::Internal, name, config)
    }

    /// Attach request headers consulted for attribution (after extractors,
    /// before config defaults)
    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Attach a session-id extractor over the call arguments
    #[must_use]
    pub fn with_session_extractor(
        mut self,
        extractor: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.session_extractor = Some(Arc::new(extractor));
        self
    }

    /// Attach a user-id extractor over the call arguments
    #[must_use]
    pub fn with_user_extractor(
        mut self,
        extractor: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.user_extractor = Some(Arc::new(extractor));
        self
    }

    /// Record the serialized call arguments on spans (default: true)
    #[must_use]
    pub fn with_capture_input(mut self, capture: bool) -> Self {
        self.capture_input = capture;
        self
    }

    /// Record the serialized return value on spans (default: true)
    #[must_use]
    pub fn with_capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// The name recorded on spans
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke a synchronous function under one span.
    ///
    /// The function's result is passed through unchanged; on `Err` the span
    /// records the error type and message and is marked failed, and the
    /// error is re-returned to the caller.
    pub fn invoke<R, E, F>(&self, args: Value, f: F) -> Result<R, E>
    where
        R: Serialize,
        E: std::fmt::Display,
        F: FnOnce(Value) -> Result<R, E>,
    {
        if !self.config.enabled {
            return f(args);
        }

        let span = self.new_span(&args);
        let completion = Completion::start(span.clone());

        let result = span.in_scope(|| f(args));
        self.record_outcome(&span, &result);
        completion.finish(if result.is_ok() {
            status::SUCCESS
        } else {
            status::ERROR
        });

        result
    }

    /// Invoke an asynchronous function under one span.
    ///
    /// The span lives for the entire asynchronous completion. If the caller
    /// drops the returned future before it finishes, the span is still
    /// closed, marked `cancelled`, with the elapsed duration recorded.
    pub async fn invoke_async<R, E, Fut, F>(&self, args: Value, f: F) -> Result<R, E>
    where
        R: Serialize,
        E: std::fmt::Display,
        Fut: Future<Output = Result<R, E>>,
        F: FnOnce(Value) -> Fut,
    {
        if !self.config.enabled {
            return f(args).await;
        }

        let span = self.new_span(&args);
        let completion = Completion::start(span.clone());

        // Build the future inside the span so synchronous setup is covered too
        let fut = span.in_scope(|| f(args));
        let result = fut.instrument(span.clone()).await;

        self.record_outcome(&span, &result);
        completion.finish(if result.is_ok() {
            status::SUCCESS
        } else {
            status::ERROR
        });

        result
    }

    /// Create the span for one invocation, with attribution and input
    /// attributes already recorded.
    fn new_span(&self, args: &Value) -> Span {
        let span = match self.kind {
            InstrumentKind::Tool => info_span!(
                "mcp.tool",
                otel.name = self.name.as_str(),
                { MCP_TOOL_NAME } = self.name.as_str(),
                { MCP_TOOL_ARGUMENTS } = field::Empty,
                { MCP_TOOL_RESULT } = field::Empty,
                { MCP_SESSION_ID } = field::Empty,
                { MCP_USER_ID } = field::Empty,
                { MCP_STATUS } = field::Empty,
                { MCP_DURATION_MS } = field::Empty,
                { MCP_ERROR_TYPE } = field::Empty,
                { MCP_ERROR_MESSAGE } = field::Empty,
            ),
            InstrumentKind::Resource => info_span!(
                "mcp.resource",
                otel.name = self.name.as_str(),
                { MCP_RESOURCE_URI } = self.name.as_str(),
                { MCP_RESOURCE_ARGUMENTS } = field::Empty,
                { MCP_RESOURCE_RESULT } = field::Empty,
                { MCP_SESSION_ID } = field::Empty,
                { MCP_USER_ID } = field::Empty,
                { MCP_STATUS } = field::Empty,
                { MCP_DURATION_MS } = field::Empty,
                { MCP_ERROR_TYPE } = field::Empty,
                { MCP_ERROR_MESSAGE } = field::Empty,
            ),
            InstrumentKind::Prompt => info_span!(
                "mcp.prompt",
                otel.name = self.name.as_str(),
                { MCP_PROMPT_NAME } = self.name.as_str(),
                { MCP_PROMPT_ARGUMENTS } = field::Empty,
                { MCP_PROMPT_MESSAGES } = field::Empty,
                { MCP_SESSION_ID } = field::Empty,
                { MCP_USER_ID } = field::Empty,
                { MCP_STATUS } = field::Empty,
                { MCP_DURATION_MS } = field::Empty,
                { MCP_ERROR_TYPE } = field::Empty,
                { MCP_ERROR_MESSAGE } = field::Empty,
            ),
            InstrumentKind::Internal => info_span!(
                "mcp.observe",
                otel.name = self.name.as_str(),
                { MCP_INPUT } = field::Empty,
                { MCP_OUTPUT } = field::Empty,
                { MCP_SESSION_ID } = field::Empty,
                { MCP_USER_ID } = field::Empty,
                { MCP_STATUS } = field::Empty,
                { MCP_DURATION_MS } = field::Empty,
                { MCP_ERROR_TYPE } = field::Empty,
                { MCP_ERROR_MESSAGE } = field::Empty,
            ),
        };

        let attribution = resolve_attribution(
            args,
            self.headers.as_ref(),
            self.session_extractor.as_ref(),
            self.user_extractor.as_ref(),
            &self.config,
        );
        // session id is omitted when unresolved, never defaulted
        if let Some(ref session_id) = attribution.session_id {
            span.record(MCP_SESSION_ID, session_id.as_str());
        }
        span.record(MCP_USER_ID, attribution.user_id.as_str());

        if self.capture_input {
            match serde_json::to_string(args) {
                Ok(serialized) => {
                    span.record(self.kind.args_key(), serialized.as_str());
                }
                Err(e) => debug!(error = %e, "failed to serialize call arguments"),
            }
        }

        span
    }

    fn record_outcome<R, E>(&self, span: &Span, result: &Result<R, E>)
    where
        R: Serialize,
        E: std::fmt::Display,
    {
        match result {
            Ok(value) => {
                if self.capture_output {
                    match serde_json::to_string(value) {
                        Ok(serialized) => {
                            span.record(self.kind.result_key(), serialized.as_str());
                        }
                        Err(e) => debug!(error = %e, "failed to serialize return value"),
                    }
                }
            }
            Err(e) => {
                span.record(MCP_ERROR_TYPE, std::any::type_name::<E>());
                span.record(MCP_ERROR_MESSAGE, e.to_string().as_str());
            }
        }
    }
}

/// Records status and wall-clock duration exactly once, on every exit path.
///
/// Dropped without `finish`, it still closes the books: a panic in the
/// wrapped function yields an `error` status, a dropped future a
/// `cancelled` one, and the elapsed duration is recorded either way.
struct Completion {
    span: Span,
    start: Instant,
    finished: bool,
}

impl Completion {
    fn start(span: Span) -> Self {
        Self {
            span,
            start: Instant::now(),
            finished: false,
        }
    }

    fn finish(mut self, status: &str) {
        self.record(status);
        self.finished = true;
    }

    fn record(&self, status: &str) {
        self.span
            .record(MCP_DURATION_MS, self.start.elapsed().as_millis() as i64);
        self.span.record(MCP_STATUS, status);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.finished {
            let status = if std::thread::panicking() {
                status::ERROR
            } else {
                status::CANCELLED
            };
            self.record(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> Arc<TelemetryConfig> {
        Arc::new(TelemetryConfig::default())
    }

    #[test]
    fn test_invoke_passes_through_return_value() {
        let traced = Traced::tool("search", config());
        let result: Result<Vec<String>, std::fmt::Error> =
            traced.invoke(json!({"q": "x"}), |_| {
                Ok(vec!["a".to_string(), "b".to_string()])
            });
        assert_eq!(result.unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_invoke_passes_through_error() {
        let traced = Traced::tool("failing", config());
        let result: Result<(), std::io::Error> =
            traced.invoke(json!({}), |_| Err(std::io::Error::other("boom")));
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_disabled_config_bypasses_instrumentation() {
        let config = Arc::new(TelemetryConfig {
            enabled: false,
            ..TelemetryConfig::default()
        });
        let traced = Traced::tool("noop", config);
        let result: Result<i32, std::fmt::Error> = traced.invoke(json!({}), |_| Ok(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_invoke_async_passes_through() {
        let traced = Traced::prompt("greeting", config());
        let result: Result<String, std::fmt::Error> = traced
            .invoke_async(json!({"who": "world"}), |args| async move {
                Ok(format!("hello {}", args["who"].as_str().unwrap_or("?")))
            })
            .await;
        assert_eq!(result.unwrap(), "hello world");
    }

    #[test]
    fn test_kind_attribute_keys() {
        use crate::span_attributes::*;
        assert_eq!(InstrumentKind::Tool.args_key(), MCP_TOOL_ARGUMENTS);
        assert_eq!(InstrumentKind::Tool.result_key(), MCP_TOOL_RESULT);
        assert_eq!(InstrumentKind::Resource.args_key(), MCP_RESOURCE_ARGUMENTS);
        assert_eq!(InstrumentKind::Prompt.result_key(), MCP_PROMPT_MESSAGES);
        assert_eq!(InstrumentKind::Internal.args_key(), MCP_INPUT);
        assert_eq!(InstrumentKind::Internal.result_key(), MCP_OUTPUT);
    }
}
