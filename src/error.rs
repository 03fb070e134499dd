use thiserror::Error;

/// Result type for racer operations
pub type Result<T> = std::result::Result<T, RacerError>;

/// Main error type for the racer library.
///
/// Every variant is fatal to a training run: callers propagate with `?` and
/// the binary reports the error and exits.
#[derive(Debug, Error)]
pub enum RacerError {
    /// A tensor did not have the shape an operation requires
    #[error("invalid shape: expected {expected}, got {actual}")]
    InvalidShape {
        expected: String,
        actual: String,
    },

    /// More transitions were requested than the replay memory holds
    #[error("insufficient data: requested {requested} transitions but only {available} are stored")]
    InsufficientData {
        requested: usize,
        available: usize,
    },

    /// The underlying simulation failed
    #[error("environment error: {0}")]
    Environment(String),

    /// Invalid hyperparameter or constructor argument
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Action index outside the action space
    #[error("invalid action {action}: must be less than {num_actions}")]
    InvalidAction {
        action: usize,
        num_actions: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for RacerError {
    fn from(err: bincode::Error) -> Self {
        RacerError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for RacerError {
    fn from(err: serde_json::Error) -> Self {
        RacerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for RacerError {
    fn from(err: toml::de::Error) -> Self {
        RacerError::Serialization(err.to_string())
    }
}

// Helper constructors for common error patterns
impl RacerError {
    pub fn invalid_shape<S: Into<String>, T: Into<String>>(expected: S, actual: T) -> Self {
        RacerError::InvalidShape {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn config<S: Into<String>>(reason: S) -> Self {
        RacerError::Configuration(reason.into())
    }

    pub fn environment<S: Into<String>>(reason: S) -> Self {
        RacerError::Environment(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_display() {
        let err = RacerError::InsufficientData { requested: 32, available: 4 };
        assert_eq!(
            err.to_string(),
            "insufficient data: requested 32 transitions but only 4 are stored"
        );
    }

    #[test]
    fn test_invalid_shape_display() {
        let err = RacerError::invalid_shape("[1, 12]", "[2, 12]");
        assert_eq!(err.to_string(), "invalid shape: expected [1, 12], got [2, 12]");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RacerError = io.into();
        assert!(matches!(err, RacerError::Io(_)));
    }
}
