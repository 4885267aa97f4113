use std::time::Duration;

/// Top-level error for the forwarding service.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid configuration:\n  {}", reasons.join("\n  "))]
    Configuration { reasons: Vec<String> },

    #[error("could not shut down gracefully within {timeout:?}")]
    ShutdownTimeout { timeout: Duration },

    #[error("health server error: {reason}")]
    HealthServer { reason: String },

    #[error("source error: {source}")]
    Source {
        #[from]
        source: SourceError,
    },

    #[error("upload error: {source}")]
    Upload {
        #[from]
        source: UploadError,
    },

    #[error("component `{component}` panicked: {reason}")]
    ComponentPanic {
        component: &'static str,
        reason: String,
    },
}

impl ForwardError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reasons: vec![reason.into()],
        }
    }

    pub fn health_server(reason: impl Into<String>) -> Self {
        Self::HealthServer {
            reason: reason.into(),
        }
    }
}

/// Errors produced by a message source while fetching a batch.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("kafka error: {source}")]
    Kafka {
        #[from]
        source: rdkafka::error::KafkaError,
    },

    #[error("source configuration error: {reason}")]
    Configuration { reason: String },

    #[error("source closed")]
    Closed,
}

/// Per-message decode failure. Captured in the report row, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON payload: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid payload: {reason}")]
    Invalid { reason: String },
}

/// Errors from a single upload attempt sequence.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("object store error: {source}")]
    ObjectStore {
        #[from]
        source: object_store::Error,
    },

    #[error("upload attempt timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("upload cancelled")]
    Cancelled,
}

impl UploadError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled => false,
            Self::ObjectStore { .. } | Self::Timeout { .. } => true,
        }
    }
}

pub type Result<T, E = ForwardError> = std::result::Result<T, E>;
