//! Telemetry client
//!
//! Owns the OTLP export pipeline and the tracing subscriber. Construct one
//! client at process start; instrumentation handles hold an `Arc` of its
//! immutable configuration, so there is no global mutable state beyond the
//! subscriber the `tracing` ecosystem itself requires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, RandomIdGenerator, SdkTracerProvider,
};
use tracing::info;
use tracing_subscriber::{
    Registry, filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::instrument::Traced;

const EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client owning the telemetry pipeline.
///
/// Dropping the client flushes and shuts down the exporter, so it must
/// outlive all instrumented code. Hold it in `main` or the application
/// struct.
///
/// # Example
///
/// ```rust,no_run
/// use mcp_telemetry::{TelemetryClient, TelemetryConfig};
/// use serde_json::json;
///
/// # fn main() -> Result<(), mcp_telemetry::TelemetryError> {
/// let client = TelemetryClient::init(
///     TelemetryConfig::builder().service_name("search-server").build(),
/// )?;
///
/// let search = client.tool("search");
/// let hits: Result<Vec<String>, std::io::Error> =
///     search.invoke(json!({"q": "rust"}), |_args| Ok(vec!["a".to_string()]));
///
/// client.flush()?; // shutdown hook
/// # Ok(())
/// # }
/// ```
pub struct TelemetryClient {
    config: Arc<TelemetryConfig>,
    provider: Option<SdkTracerProvider>,
}

impl std::fmt::Debug for TelemetryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryClient")
            .field("config", &self.config)
            .field("provider", &self.provider.as_ref().map(|_| "SdkTracerProvider"))
            .finish()
    }
}

impl TelemetryClient {
    /// Initialize the client.
    ///
    /// When the config is enabled this builds the OTLP/HTTP exporter with a
    /// batch processor, installs the tracing subscriber (env filter + JSON
    /// fmt to stderr + OpenTelemetry bridge), and registers the provider as
    /// the OpenTelemetry global. A disabled config skips all of that and
    /// every instrumented call becomes a plain pass-through.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] for an invalid configuration, an exporter
    /// that cannot be built, or a subscriber that is already installed.
    pub fn init(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        config.validate()?;
        let config = Arc::new(config);

        if !config.enabled {
            return Ok(Self {
                config,
                provider: None,
            });
        }

        let provider = build_tracer_provider(&config)?;
        init_subscriber(&config, &provider)?;
        opentelemetry::global::set_tracer_provider(provider.clone());

        info!(
            service_name = %config.service_name,
            environment = %config.environment,
            endpoint = %config.endpoint,
            "MCP telemetry initialized"
        );

        Ok(Self {
            config,
            provider: Some(provider),
        })
    }

    /// The effective configuration
    #[must_use]
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Instrumentation wrapper for an MCP tool call
    #[must_use]
    pub fn tool(&self, name: impl Into<String>) -> Traced {
        Traced::tool(name, Arc::clone(&self.config))
    }

    /// Instrumentation wrapper for an MCP resource access
    #[must_use]
    pub fn resource(&self, uri: impl Into<String>) -> Traced {
        Traced::resource(uri, Arc::clone(&self.config))
    }

    /// Instrumentation wrapper for an MCP prompt call
    #[must_use]
    pub fn prompt(&self, name: impl Into<String>) -> Traced {
        Traced::prompt(name, Arc::clone(&self.config))
    }

    /// General-purpose instrumentation wrapper
    #[must_use]
    pub fn observe(&self, name: impl Into<String>) -> Traced {
        Traced::observe(name, Arc::clone(&self.config))
    }

    /// Open a manually managed span.
    ///
    /// The span closes when the returned scope drops, on every exit path.
    #[must_use]
    pub fn span(&self, name: &str) -> SpanScope {
        SpanScope::new(name, self.config.enabled)
    }

    /// Force pending spans to be exported before returning.
    ///
    /// Blocking; intended for shutdown hooks.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ExportFailed`] if the exporter reports a
    /// failure. Callers may log and ignore it; flush failures must never
    /// take down the host.
    pub fn flush(&self) -> Result<(), TelemetryError> {
        if let Some(ref provider) = self.provider {
            provider
                .force_flush()
                .map_err(|e| TelemetryError::ExportFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Flush and shut down the export pipeline.
    ///
    /// Idempotent; also performed on drop.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ExportFailed`] if the final flush or the
    /// provider shutdown reports a failure.
    pub fn shutdown(&mut self) -> Result<(), TelemetryError> {
        if let Some(provider) = self.provider.take() {
            provider
                .force_flush()
                .and_then(|()| provider.shutdown())
                .map_err(|e| TelemetryError::ExportFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            tracing::error!(error = %e, "Error shutting down tracer provider");
        }
    }
}

/// Scoped manual span with guaranteed closure.
///
/// Attributes are set dynamically through the OpenTelemetry bridge; the span
/// ends when the scope (and any entered guards) drop, regardless of panics
/// or early returns.
#[derive(Debug)]
pub struct SpanScope {
    span: tracing::Span,
}

impl SpanScope {
    fn new(name: &str, enabled: bool) -> Self {
        let span = if enabled {
            tracing::info_span!("mcp.span", otel.name = name)
        } else {
            tracing::Span::none()
        };
        Self { span }
    }

    /// Set an attribute on the span
    pub fn set_attribute(
        &self,
        key: impl Into<opentelemetry::Key>,
        value: impl Into<opentelemetry::Value>,
    ) {
        use tracing_opentelemetry::OpenTelemetrySpanExt;
        self.span.set_attribute(key, value);
    }

    /// Run a closure inside the span
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.span.in_scope(f)
    }

    /// The underlying tracing span
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

/// Build the OTLP tracer provider: exporter + batch processor + resource.
fn build_tracer_provider(config: &TelemetryConfig) -> Result<SdkTracerProvider, TelemetryError> {
    use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};

    let mut attributes = vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        KeyValue::new("deployment.environment", config.environment.clone()),
        KeyValue::new("mcp.organization.id", config.organization_id.clone()),
        KeyValue::new("mcp.project.id", config.project_id.clone()),
    ];
    attributes.extend(
        config
            .metadata
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
    );

    let resource = Resource::builder().with_attributes(attributes).build();

    let endpoint = format!("{}/v1/traces", config.endpoint.trim_end_matches('/'));

    let mut exporter_builder = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .with_timeout(EXPORT_TIMEOUT);

    if let Some(ref api_key) = config.api_key {
        exporter_builder = exporter_builder.with_headers(HashMap::from([(
            "Authorization".to_string(),
            format!("Bearer {api_key}"),
        )]));
    }

    let exporter = exporter_builder
        .build()
        .map_err(|e| TelemetryError::OpenTelemetryError(e.to_string()))?;

    let batch_config = BatchConfigBuilder::default()
        .with_max_queue_size(config.max_queue_size)
        .with_max_export_batch_size(config.batch_size)
        .with_scheduled_delay(Duration::from_millis(config.flush_interval_ms))
        .build();

    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch_config)
        .build();

    Ok(SdkTracerProvider::builder()
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .with_span_processor(processor)
        .build())
}

/// Install the layered subscriber: env filter, OpenTelemetry bridge, JSON
/// fmt to stderr (stderr keeps stdout clean for STDIO transports).
fn init_subscriber(
    config: &TelemetryConfig,
    provider: &SdkTracerProvider,
) -> Result<(), TelemetryError> {
    use opentelemetry::trace::TracerProvider as _;

    let default_level = if config.debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| TelemetryError::InvalidConfiguration(format!("Invalid log level: {e}")))?;

    let tracer = provider.tracer("mcp-telemetry");
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .json();

    Registry::default()
        .with(env_filter)
        .with(otel_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::TracingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_rejects_invalid_config() {
        let config = TelemetryConfig {
            batch_size: 0,
            ..TelemetryConfig::default()
        };
        assert!(matches!(
            TelemetryClient::init(config),
            Err(TelemetryError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_init_rejects_queue_smaller_than_batch() {
        let config = TelemetryConfig {
            batch_size: 200,
            max_queue_size: 100,
            ..TelemetryConfig::default()
        };
        assert!(matches!(
            TelemetryClient::init(config),
            Err(TelemetryError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_disabled_client_has_no_provider() {
        let config = TelemetryConfig {
            enabled: false,
            ..TelemetryConfig::default()
        };
        let client = TelemetryClient::init(config).unwrap();
        assert!(client.provider.is_none());
        assert!(client.flush().is_ok());
    }

    #[test]
    fn test_disabled_client_span_scope_is_noop() {
        let config = TelemetryConfig {
            enabled: false,
            ..TelemetryConfig::default()
        };
        let client = TelemetryClient::init(config).unwrap();
        let scope = client.span("manual");
        scope.set_attribute("k", "v");
        let out = scope.in_scope(|| 7);
        assert_eq!(out, 7);
    }

    #[test]
    fn test_disabled_client_invoke_passthrough() {
        let config = TelemetryConfig {
            enabled: false,
            ..TelemetryConfig::default()
        };
        let client = TelemetryClient::init(config).unwrap();
        let traced = client.tool("echo");
        let result: Result<String, std::fmt::Error> =
            traced.invoke(serde_json::json!({"v": 1}), |args| Ok(args.to_string()));
        assert_eq!(result.unwrap(), r#"{"v":1}"#);
    }

    #[test]
    fn test_shutdown_idempotent_when_disabled() {
        let config = TelemetryConfig {
            enabled: false,
            ..TelemetryConfig::default()
        };
        let mut client = TelemetryClient::init(config).unwrap();
        assert!(client.shutdown().is_ok());
        assert!(client.shutdown().is_ok());
    }
}
