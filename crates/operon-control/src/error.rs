use thiserror::Error;

/// Errors surfaced by the mutating control-plane APIs.
///
/// Admission and hook outcomes are values, not errors; only bad input and
/// unknown ids end up here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

impl ControlError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;
