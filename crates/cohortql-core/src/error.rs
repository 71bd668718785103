use thiserror::Error;

/// Core error types for cohort definition handling
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown {kind} value: {value}")]
    UnknownValue { kind: &'static str, value: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new UnknownValue error
    pub fn unknown_value(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownValue {
            kind,
            value: value.into(),
        }
    }

    /// Check if this error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnknownValue { .. } | Self::JsonError(_))
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
