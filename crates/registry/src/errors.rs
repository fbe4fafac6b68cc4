//! Error types for the record registry

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Conflict { message: String, record_id: String },

    #[error("{0}")]
    NotFound(String),

    #[error("authentication failed")]
    Unauthorized,

    #[error("Registry storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No unused record id found after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },
}

impl RegistryError {
    pub fn missing_parameters() -> Self {
        Self::Validation("missing parameters".to_string())
    }

    pub fn invalid_domain() -> Self {
        Self::Validation("invalid domain".to_string())
    }

    pub fn invalid_id() -> Self {
        Self::Validation("invalid id".to_string())
    }

    pub fn missing_lookup_key() -> Self {
        Self::Validation("must supply id or domain".to_string())
    }

    pub fn domain_taken(record_id: impl Into<String>) -> Self {
        Self::Conflict {
            message: "domain already registered".to_string(),
            record_id: record_id.into(),
        }
    }

    pub fn record_not_found() -> Self {
        Self::NotFound("record not found".to_string())
    }

    /// True for failures of the service itself rather than of the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Serialization(_) | Self::IdSpaceExhausted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
