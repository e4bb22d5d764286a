//! Telemetry error types

use thiserror::Error;

/// Errors that can occur during telemetry setup and export.
///
/// Only the configuration, initialization, and flush surfaces are fallible.
/// Attribution resolution and per-call span enrichment never return errors:
/// any failure there degrades to a lower-priority source and is logged at
/// debug level, so observability can never break the observed call.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid configuration
    #[error("Invalid telemetry configuration: {0}")]
    InvalidConfiguration(String),

    /// Failed to initialize telemetry
    #[error("Failed to initialize telemetry: {0}")]
    InitializationFailed(String),

    /// Export or flush failed
    #[error("Failed to export telemetry data: {0}")]
    ExportFailed(String),

    /// Tracing subscriber error
    #[error("Tracing subscriber error: {0}")]
    TracingError(String),

    /// OpenTelemetry error
    #[error("OpenTelemetry error: {0}")]
    OpenTelemetryError(String),
}

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;
