use thiserror::Error;

/// Top-level error type for AgentBrain.
///
/// Startup failures (`Config`, `MissingCredential`, `StoreConnection`) are
/// fatal and abort the process before any turn is processed. The remaining
/// variants surface from the store and the embedding model at runtime.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BrainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("Store connection error: {0}")]
    StoreConnection(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for BrainError {
    fn from(err: toml::de::Error) -> Self {
        BrainError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BrainError {
    fn from(err: toml::ser::Error) -> Self {
        BrainError::Config(err.to_string())
    }
}

/// A specialized `Result` type for AgentBrain operations.
pub type Result<T> = std::result::Result<T, BrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(BrainError, &str)> = vec![
            (
                BrainError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                BrainError::MissingCredential("OPENAI_API_KEY".to_string()),
                "Missing credential: environment variable OPENAI_API_KEY is not set",
            ),
            (
                BrainError::StoreConnection("refused".to_string()),
                "Store connection error: refused",
            ),
            (
                BrainError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                BrainError::Embedding("model missing".to_string()),
                "Embedding error: model missing",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BrainError = io_err.into();
        assert!(matches!(err, BrainError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let brain_err: BrainError = err.unwrap_err().into();
        assert!(matches!(brain_err, BrainError::Config(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
