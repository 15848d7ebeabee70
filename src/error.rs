//! Error types for the mail triage service.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    pub(crate) fn mail_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "mail".into(),
            id: id.into(),
        }
    }
}

/// Queue publish errors.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Topic is empty")]
    EmptyTopic,

    #[error("Publish to {topic} failed: {reason}")]
    Transport { topic: String, reason: String },

    #[error("Broker rejected publish to {topic} with status {status}: {body}")]
    Rejected {
        topic: String,
        status: u16,
        body: String,
    },

    #[error("Publish to {topic} timed out after {timeout:?}")]
    Timeout { topic: String, timeout: Duration },

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Structural rejection of a worker-produced result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("empty classification")]
    EmptyClassification,

    #[error("empty model_answer")]
    EmptyResult,

    #[error("invalid model_answer json: {0}")]
    MalformedResult(String),
}

/// Errors surfaced by the message lifecycle orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid payload: {0}")]
    Validation(#[from] ValidationError),

    #[error("Mail {id} not found")]
    NotFound { id: String },

    #[error("Mail {id} is already {status}")]
    AlreadyTerminal { id: String, status: String },

    #[error("Persistence error: {0}")]
    Persistence(DatabaseError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] PublishError),

    #[error("Store contract violated: {0}")]
    ContractViolation(String),
}

impl From<DatabaseError> for LifecycleError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { id, .. } => Self::NotFound { id },
            DatabaseError::Serialization(reason) => Self::ContractViolation(reason),
            other => Self::Persistence(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_lifecycle_not_found() {
        let err: LifecycleError = DatabaseError::mail_not_found("m1").into();
        assert!(matches!(err, LifecycleError::NotFound { ref id } if id == "m1"));
    }

    #[test]
    fn constraint_maps_to_persistence() {
        let err: LifecycleError = DatabaseError::Constraint("duplicate id".into()).into();
        assert!(matches!(err, LifecycleError::Persistence(_)));
        assert!(err.to_string().contains("duplicate id"));
    }

    #[test]
    fn corrupt_row_maps_to_contract_violation() {
        let err: LifecycleError =
            DatabaseError::Serialization("mail m1 has invalid attempts -1".into()).into();
        assert!(matches!(err, LifecycleError::ContractViolation(_)));
    }

    #[test]
    fn validation_messages_are_readable() {
        assert_eq!(ValidationError::EmptyClassification.to_string(), "empty classification");
        assert_eq!(ValidationError::EmptyResult.to_string(), "empty model_answer");
    }
}
