//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Arbitration state no longer satisfies its invariants
    #[error("Invariant violated: {detail}")]
    InvariantViolated { detail: String },
}

impl DomainError {
    /// Creates an invariant violation error.
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::InvariantViolated {
            detail: detail.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_display() {
        let err = DomainError::invariant("two answerers");
        assert_eq!(err.to_string(), "Invariant violated: two answerers");
    }
}
