use crate::utils::IsTransient;

// ============================================================================
// Processing Failure Taxonomy
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessingError {
    #[error("Undecodable payload: {0}")]
    Decode(String),

    #[error("Invalid order: {0}")]
    Validation(String),

    #[error("Transient processing failure: {0}")]
    Transient(String),
}

/// Whether a failure may be redelivered or must go straight to dead-letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    Retryable,
    NonRetryable,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Retryable => "retryable",
            FailureClass::NonRetryable => "non_retryable",
        }
    }
}

impl ProcessingError {
    pub fn class(&self) -> FailureClass {
        match self {
            ProcessingError::Decode(_) | ProcessingError::Validation(_) => FailureClass::NonRetryable,
            ProcessingError::Transient(_) => FailureClass::Retryable,
        }
    }
}

impl IsTransient for ProcessingError {
    fn is_transient(&self) -> bool {
        self.class() == FailureClass::Retryable
    }
}
