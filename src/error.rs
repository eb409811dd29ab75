//! Error types for model, query and column pipeline operations

use thiserror::Error;

/// Errors that can occur while parsing queries, configuring models or saving records
///
/// Input validation problems are not errors: they are returned as data by
/// `input_errors` and `check_search_value`.
#[derive(Debug, Error)]
pub enum OrmError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    ColumnNotFound(String),

    #[error("Operator not allowed: {0}")]
    OperatorNotAllowed(String),

    #[error("Relationship error: {0}")]
    Relationship(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrmError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn column_not_found(msg: impl Into<String>) -> Self {
        Self::ColumnNotFound(msg.into())
    }

    pub fn operator_not_allowed(msg: impl Into<String>) -> Self {
        Self::OperatorNotAllowed(msg.into())
    }

    pub fn relationship(msg: impl Into<String>) -> Self {
        Self::Relationship(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn action(msg: impl Into<String>) -> Self {
        Self::Action(msg.into())
    }

    pub fn model_not_found(msg: impl Into<String>) -> Self {
        Self::ModelNotFound(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Wrap a backend failure so it propagates unchanged
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }
}

pub type Result<T> = std::result::Result<T, OrmError>;
