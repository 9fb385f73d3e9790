//! Domain errors for the Scout model state manager.

use thiserror::Error;

/// Domain-level errors that can occur while managing bandit models.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Could not acquire lock for model {model_id} after {attempts} attempts")]
    LockUnavailable { model_id: String, attempts: u32 },

    #[error("Invalid arm: {0}")]
    InvalidArm(i64),

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),

    #[error("Unsupported value for feature '{feature}': {kind}")]
    EncodingError { feature: String, kind: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Decision policy error: {0}")]
    Policy(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl DomainError {
    /// Whether the caller may retry the same request later.
    ///
    /// Lock contention and store outages are transient; everything else is a
    /// property of the request or of the stored model and will fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockUnavailable { .. } | Self::Persistence(_))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let lock = DomainError::LockUnavailable {
            model_id: "m".to_string(),
            attempts: 5,
        };
        assert!(lock.is_retryable());
        assert!(DomainError::Persistence("down".to_string()).is_retryable());

        assert!(!DomainError::ModelNotFound("m".to_string()).is_retryable());
        assert!(!DomainError::InvalidArm(7).is_retryable());
        assert!(!DomainError::EncodingError {
            feature: "f".to_string(),
            kind: "null".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        assert!(matches!(DomainError::from(err), DomainError::Serialization(_)));
    }
}
