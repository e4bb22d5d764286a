//! Client configuration
//!
//! Effective configuration is resolved once at client construction: explicit
//! builder values take precedence over environment variables, which take
//! precedence over the documented defaults. The resulting [`TelemetryConfig`]
//! is immutable and read by every instrumented call.

use crate::error::TelemetryError;

/// Environment variable names read by [`TelemetryConfig::from_env`]
pub mod env_vars {
    /// OTLP collector endpoint URL
    pub const ENDPOINT: &str = "MCP_TELEMETRY_ENDPOINT";
    /// API key sent as a bearer token to the collector
    pub const API_KEY: &str = "MCP_TELEMETRY_API_KEY";
    /// Organization identifier
    pub const ORG_ID: &str = "MCP_TELEMETRY_ORG_ID";
    /// Project identifier
    pub const PROJECT_ID: &str = "MCP_TELEMETRY_PROJECT_ID";
    /// Service name for resource attribution
    pub const SERVICE_NAME: &str = "MCP_TELEMETRY_SERVICE_NAME";
    /// Deployment environment
    pub const ENVIRONMENT: &str = "MCP_TELEMETRY_ENVIRONMENT";
    /// Master enable flag
    pub const ENABLED: &str = "MCP_TELEMETRY_ENABLED";
    /// Debug logging flag
    pub const DEBUG: &str = "MCP_TELEMETRY_DEBUG";
    /// Span export batch size
    pub const BATCH_SIZE: &str = "MCP_TELEMETRY_BATCH_SIZE";
    /// Span export interval in milliseconds
    pub const FLUSH_INTERVAL_MS: &str = "MCP_TELEMETRY_FLUSH_INTERVAL_MS";
    /// Maximum number of spans buffered before the exporter drops new ones
    pub const MAX_QUEUE_SIZE: &str = "MCP_TELEMETRY_MAX_QUEUE_SIZE";
    /// Default session id applied when no per-call source resolves one
    pub const SESSION_ID: &str = "MCP_TELEMETRY_SESSION_ID";
    /// Default user id applied when no per-call source resolves one
    pub const USER_ID: &str = "MCP_TELEMETRY_USER_ID";
}

/// Immutable telemetry configuration
///
/// Use [`TelemetryConfigBuilder`] for ergonomic construction.
///
/// # Example
///
/// ```rust
/// use mcp_telemetry::TelemetryConfig;
///
/// let config = TelemetryConfig::builder()
///     .service_name("search-server")
///     .environment("production")
///     .default_user_id("svc-account")
///     .build();
///
/// assert_eq!(config.service_name, "search-server");
/// ```
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP collector base URL (the `/v1/traces` path is appended on export)
    pub endpoint: String,
    /// API key for the collector, sent as `Authorization: Bearer <key>`
    pub api_key: Option<String>,
    /// Organization identifier attached as a resource attribute
    pub organization_id: String,
    /// Project identifier attached as a resource attribute
    pub project_id: String,
    /// Service name for telemetry identification
    pub service_name: String,
    /// Deployment environment (e.g. "production", "staging")
    pub environment: String,
    /// Whether tracing is enabled at all
    pub enabled: bool,
    /// Widen the default log filter to debug
    pub debug: bool,
    /// Maximum number of spans per export batch
    pub batch_size: usize,
    /// Interval between batch exports, in milliseconds
    pub flush_interval_ms: u64,
    /// Maximum number of spans the batch processor queues before dropping
    pub max_queue_size: usize,
    /// Extra key/value pairs attached to every exported span via the resource
    pub metadata: Vec<(String, String)>,
    /// Fallback session id when neither extractor nor headers resolve one
    pub default_session_id: Option<String>,
    /// Fallback user id when neither extractor nor headers resolve one
    pub default_user_id: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4318".to_string(),
            api_key: None,
            organization_id: "default".to_string(),
            project_id: "default".to_string(),
            service_name: "mcp-server".to_string(),
            environment: "development".to_string(),
            enabled: true,
            debug: false,
            batch_size: 100,
            flush_interval_ms: 5000,
            max_queue_size: 1000,
            metadata: Vec::new(),
            default_session_id: None,
            default_user_id: None,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    /// Load configuration from environment variables, falling back to the
    /// documented defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve configuration through an arbitrary variable lookup.
    ///
    /// `from_env` is this applied to the process environment; tests inject a
    /// map instead.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            endpoint: lookup(env_vars::ENDPOINT).unwrap_or(defaults.endpoint),
            api_key: lookup(env_vars::API_KEY),
            organization_id: lookup(env_vars::ORG_ID).unwrap_or(defaults.organization_id),
            project_id: lookup(env_vars::PROJECT_ID).unwrap_or(defaults.project_id),
            service_name: lookup(env_vars::SERVICE_NAME).unwrap_or(defaults.service_name),
            environment: lookup(env_vars::ENVIRONMENT).unwrap_or(defaults.environment),
            enabled: lookup(env_vars::ENABLED)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.enabled),
            debug: lookup(env_vars::DEBUG)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.debug),
            batch_size: lookup(env_vars::BATCH_SIZE)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch_size),
            flush_interval_ms: lookup(env_vars::FLUSH_INTERVAL_MS)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.flush_interval_ms),
            max_queue_size: lookup(env_vars::MAX_QUEUE_SIZE)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_queue_size),
            metadata: defaults.metadata,
            default_session_id: lookup(env_vars::SESSION_ID),
            default_user_id: lookup(env_vars::USER_ID),
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfiguration`] when `batch_size` is
    /// zero, `flush_interval_ms` is below 100, or `max_queue_size` cannot hold
    /// a full batch.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.batch_size < 1 {
            return Err(TelemetryError::InvalidConfiguration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.flush_interval_ms < 100 {
            return Err(TelemetryError::InvalidConfiguration(
                "flush_interval_ms must be at least 100".to_string(),
            ));
        }
        if self.max_queue_size < self.batch_size {
            return Err(TelemetryError::InvalidConfiguration(
                "max_queue_size must be at least batch_size".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`TelemetryConfig`]
///
/// Unset fields fall back to environment variables, then to defaults.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfigBuilder {
    endpoint: Option<String>,
    api_key: Option<String>,
    organization_id: Option<String>,
    project_id: Option<String>,
    service_name: Option<String>,
    environment: Option<String>,
    enabled: Option<bool>,
    debug: Option<bool>,
    batch_size: Option<usize>,
    flush_interval_ms: Option<u64>,
    max_queue_size: Option<usize>,
    metadata: Vec<(String, String)>,
    default_session_id: Option<String>,
    default_user_id: Option<String>,
}

impl TelemetryConfigBuilder {
    /// Set the OTLP collector endpoint
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the collector API key
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the organization id
    #[must_use]
    pub fn organization_id(mut self, id: impl Into<String>) -> Self {
        self.organization_id = Some(id.into());
        self
    }

    /// Set the project id
    #[must_use]
    pub fn project_id(mut self, id: impl Into<String>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    /// Set the service name
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the deployment environment
    #[must_use]
    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.environment = Some(env.into());
        self
    }

    /// Enable or disable tracing entirely
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Enable or disable debug logging
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Set the span export batch size
    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set the export interval in milliseconds
    #[must_use]
    pub fn flush_interval_ms(mut self, interval: u64) -> Self {
        self.flush_interval_ms = Some(interval);
        self
    }

    /// Set the maximum number of queued spans
    #[must_use]
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = Some(size);
        self
    }

    /// Attach a key/value pair to every exported span
    #[must_use]
    pub fn metadata_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Set the default session id
    #[must_use]
    pub fn default_session_id(mut self, id: impl Into<String>) -> Self {
        self.default_session_id = Some(id.into());
        self
    }

    /// Set the default user id
    #[must_use]
    pub fn default_user_id(mut self, id: impl Into<String>) -> Self {
        self.default_user_id = Some(id.into());
        self
    }

    /// Build the configuration, filling unset fields from the environment
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        self.build_with_lookup(|name| std::env::var(name).ok())
    }

    /// Build against an arbitrary variable lookup.
    ///
    /// Explicit setters win over lookup values, which win over the documented
    /// defaults. `build` is this applied to the process environment.
    pub fn build_with_lookup(self, lookup: impl Fn(&str) -> Option<String>) -> TelemetryConfig {
        let env = TelemetryConfig::from_lookup(lookup);

        TelemetryConfig {
            endpoint: self.endpoint.unwrap_or(env.endpoint),
            api_key: self.api_key.or(env.api_key),
            organization_id: self.organization_id.unwrap_or(env.organization_id),
            project_id: self.project_id.unwrap_or(env.project_id),
            service_name: self.service_name.unwrap_or(env.service_name),
            environment: self.environment.unwrap_or(env.environment),
            enabled: self.enabled.unwrap_or(env.enabled),
            debug: self.debug.unwrap_or(env.debug),
            batch_size: self.batch_size.unwrap_or(env.batch_size),
            flush_interval_ms: self.flush_interval_ms.unwrap_or(env.flush_interval_ms),
            max_queue_size: self.max_queue_size.unwrap_or(env.max_queue_size),
            metadata: self.metadata,
            default_session_id: self.default_session_id.or(env.default_session_id),
            default_user_id: self.default_user_id.or(env.default_user_id),
        }
    }
}
