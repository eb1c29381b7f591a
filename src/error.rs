use std::fmt;

/// Result type for layer operations
pub type Result<T> = std::result::Result<T, AdlError>;

/// Main error type for the attention-guided dropout layer
#[derive(Debug, Clone, PartialEq)]
pub enum AdlError {
    /// Input dimensions disagree with the bound feature shape
    ShapeMismatch {
        expected: String,
        actual: String,
    },

    /// Hyperparameter or shape value outside its legal range
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),

    /// Backward requested without a matching forward pass
    TrainingError(String),
}

impl fmt::Display for AdlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdlError::ShapeMismatch { expected, actual } => {
                write!(f, "Shape mismatch: expected {}, got {}", expected, actual)
            }
            AdlError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            AdlError::IoError(msg) => write!(f, "IO error: {}", msg),
            AdlError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AdlError::TrainingError(msg) => write!(f, "Training error: {}", msg),
        }
    }
}

impl std::error::Error for AdlError {}

impl From<std::io::Error> for AdlError {
    fn from(err: std::io::Error) -> Self {
        AdlError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for AdlError {
    fn from(err: bincode::Error) -> Self {
        AdlError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for AdlError {
    fn from(err: serde_json::Error) -> Self {
        AdlError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl AdlError {
    pub fn shape_mismatch<E: Into<String>, A: Into<String>>(expected: E, actual: A) -> Self {
        AdlError::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        AdlError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised by construction-time validation
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, AdlError::InvalidParameter { .. })
    }
}
