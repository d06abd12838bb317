//! Error types shared by the docket-sync crates.

use thiserror::Error;

/// Errors raised while building or loading shared types.
#[derive(Debug, Error)]
pub enum SyncTypesError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unknown entity kind label
    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncTypesError::Config("missing url".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing url");

        let err = SyncTypesError::UnknownKind("search.Widget".to_string());
        assert_eq!(err.to_string(), "Unknown entity kind: search.Widget");
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<u64>("nope").unwrap_err();
        let err: SyncTypesError = json_err.into();
        assert!(matches!(err, SyncTypesError::Serialization(_)));
    }
}
