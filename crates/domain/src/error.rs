//! Domain error types.

use thiserror::Error;

/// Errors raised by storage and provider implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Stored record is invalid: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by domain services.
///
/// Validation and authorization failures are detected before anything is
/// persisted. Push delivery failures never appear here.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();

        DomainError::Validation(messages.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::ValidationError;

    #[test]
    fn test_domain_error_display() {
        assert_eq!(
            DomainError::Validation("Message content cannot be empty".into()).to_string(),
            "Message content cannot be empty"
        );
        assert_eq!(
            DomainError::NotFound("Message not found".into()).to_string(),
            "Message not found"
        );
        assert_eq!(
            DomainError::Store(StoreError::Backend("pool closed".into())).to_string(),
            "Storage backend error: pool closed"
        );
    }

    #[test]
    fn test_from_validation_errors_uses_messages() {
        let mut errors = validator::ValidationErrors::new();
        let mut err = ValidationError::new("content_empty");
        err.message = Some("Message content cannot be empty".into());
        errors.add("content", err);

        match DomainError::from(errors) {
            DomainError::Validation(msg) => assert_eq!(msg, "Message content cannot be empty"),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_validation_errors_without_message() {
        let mut errors = validator::ValidationErrors::new();
        errors.add("recipient_id", ValidationError::new("required"));

        match DomainError::from(errors) {
            DomainError::Validation(msg) => assert_eq!(msg, "recipient_id is invalid"),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }
}
