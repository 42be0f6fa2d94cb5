use thiserror::Error;

/// Input that can never be valid, independent of stored state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("`{field}` must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn out_of_range(field: &'static str, value: u64, min: u64, max: u64) -> Self {
        Self::OutOfRange {
            field,
            value,
            min,
            max,
        }
    }
}
