//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid {field}: {reason}")]
    InvalidQuery { field: &'static str, reason: String },

    #[error("Failed to decode release payload: {reason}")]
    Decode { reason: String },

    #[error("Failed to parse release manifest: {reason}")]
    Parse { reason: String },
}

impl CoreError {
    pub(crate) fn invalid_query(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
