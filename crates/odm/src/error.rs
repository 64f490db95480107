//! Error types for the ODM
//!
//! Schema and lifecycle errors always propagate to the caller; cache-layer
//! errors are absorbed internally and fall back to the store.

use thiserror::Error;

/// Result type alias for ODM operations
pub type OdmResult<T> = Result<T, OdmError>;

/// Error types for ODM operations
#[derive(Error, Debug)]
pub enum OdmError {
    // Schema errors: programming/configuration mistakes, fail fast.
    #[error("Model '{0}' is already registered")]
    ModelAlreadyRegistered(String),

    #[error("Model '{0}' is not registered")]
    ModelNotRegistered(String),

    #[error("Field '{field}' is already defined in model '{model}'")]
    FieldAlreadyDefined { model: String, field: String },

    #[error("Field '{field}' is not defined in model '{model}'")]
    FieldNotDefined { model: String, field: String },

    // Data errors
    #[error("Value of field '{model}.{field}' cannot be empty")]
    FieldEmpty { model: String, field: String },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Reference '{0}' not found")]
    ReferenceNotFound(String),

    #[error("Invalid reference format: '{0}'")]
    InvalidReference(String),

    #[error("Entity '{model}:{id}' not found in the database")]
    EntityNotFound { model: String, id: String },

    // Lifecycle errors
    #[error("Entity of model '{0}' must be stored before it can be referenced")]
    EntityNotStored(String),

    #[error("Entity '{0}' has been deleted")]
    EntityDeleted(String),

    #[error("Entity of model '{0}' is not stored and cannot be locked")]
    EntityNotLocked(String),

    #[error("Entity cannot be deleted: {0}")]
    ForbidEntityDelete(String),

    // Concurrency errors
    #[error("Wait for lock '{0}' exceeded the configured timeout")]
    LockWaitExceeded(String),

    // Field/query operation errors
    #[error("Operation '{op}' is not supported by field '{field}'")]
    UnsupportedOperation { field: String, op: &'static str },

    #[error("Invalid logical operator: '{0}'")]
    InvalidLogicalOperator(String),

    #[error("Invalid comparison operator: '{0}'")]
    InvalidComparisonOperator(String),

    #[error("Query error: {0}")]
    Query(String),

    // External collaborators
    #[error("Store error: {0}")]
    Store(String),

    #[error("Event handler error: {0}")]
    Event(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OdmError {
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn event(msg: impl Into<String>) -> Self {
        Self::Event(msg.into())
    }

    pub fn field_not_defined(model: impl Into<String>, field: impl Into<String>) -> Self {
        Self::FieldNotDefined {
            model: model.into(),
            field: field.into(),
        }
    }

    pub fn unsupported(field: impl Into<String>, op: &'static str) -> Self {
        Self::UnsupportedOperation {
            field: field.into(),
            op,
        }
    }
}
