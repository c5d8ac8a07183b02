// ============================================================================
// ERROR HANDLING FRAMEWORK
// ============================================================================
// Error types for every layer of the host:
// - ConfigError: startup configuration, always fatal
// - InferenceError: anything that went wrong talking to the engine
// - AnalysisError: what the orchestrator reports for one request
// - HostError: top-level startup/serving failures
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for host-level operations.
pub type HostResult<T> = Result<T, HostError>;

// ----------------------------------------------------------------------------
// Host Errors
// ----------------------------------------------------------------------------

/// The main error type for starting and running the host.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging initialization failed: {0}")]
    Logging(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            HostError::Config(_) => "config",
            HostError::Io(_) => "io",
            HostError::Logging(_) => "logging",
            HostError::Internal(_) => "internal",
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

/// Errors related to configuration loading and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to parse configuration: {message}")]
    ParseError { message: String },

    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        ConfigError::MissingField {
            field: field.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::ParseError {
            message: e.to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Inference Errors
// ----------------------------------------------------------------------------

/// Errors raised by an inference engine or while dispatching to it.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Request to '{endpoint}' failed: {message}")]
    RequestFailed { endpoint: String, message: String },

    #[error("Engine returned HTTP {status_code}: {message}")]
    BadStatus { status_code: u16, message: String },

    #[error("Invalid engine response: {message}")]
    InvalidResponse { message: String },

    #[error("Inference timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Inference task aborted: {message}")]
    TaskFailed { message: String },

    #[error("Engine error: {0}")]
    Engine(String),
}

impl InferenceError {
    pub fn invalid_response(message: impl Into<String>) -> Self {
        InferenceError::InvalidResponse {
            message: message.into(),
        }
    }

    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::RequestFailed { .. } => "request_failed",
            InferenceError::BadStatus { .. } => "bad_status",
            InferenceError::InvalidResponse { .. } => "invalid_response",
            InferenceError::Timeout { .. } => "timeout",
            InferenceError::TaskFailed { .. } => "task_failed",
            InferenceError::Engine(_) => "engine",
        }
    }
}

// ----------------------------------------------------------------------------
// Analysis Errors
// ----------------------------------------------------------------------------

/// Terminal outcomes of an analysis request other than success.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Caller key is not in the allow-list. Nothing was recorded or admitted.
    #[error("Invalid key")]
    Unauthorized,

    /// The engine failed after admission. The permit has been released.
    #[error("Inference failed: {0}")]
    InferenceFailure(#[from] InferenceError),

    /// The admission gate was closed for shutdown before a permit came free.
    #[error("Service is shutting down")]
    Unavailable,
}

impl AnalysisError {
    /// Message safe to hand back to a client; engine diagnostics stay in logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            AnalysisError::Unauthorized => "Invalid key",
            AnalysisError::InferenceFailure(_) => "Analysis failed",
            AnalysisError::Unavailable => "Service is shutting down",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_failure_hides_diagnostics() {
        let err: AnalysisError = InferenceError::BadStatus {
            status_code: 503,
            message: "CUDA out of memory at layer 7".into(),
        }
        .into();

        assert_eq!(err.public_message(), "Analysis failed");
        assert!(err.to_string().contains("CUDA"));
    }

    #[test]
    fn test_config_error_wraps_into_host_error() {
        let err: HostError = ConfigError::invalid_value("max_concurrency", "must be >= 1").into();
        assert_eq!(err.category(), "config");
        assert!(err.to_string().contains("max_concurrency"));
    }
}
