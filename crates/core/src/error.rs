//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Storage concerns belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A conflict occurred (e.g. an identifier that is already taken).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pick_matching_variant() {
        let cases = [
            (DomainError::validation("v"), "validation failed: v"),
            (DomainError::invariant("i"), "invariant violated: i"),
            (DomainError::invalid_id("x"), "invalid identifier: x"),
            (DomainError::conflict("c"), "conflict: c"),
        ];
        for (err, message) in cases {
            // Exhaustive: every variant needs a constructor case above.
            match &err {
                DomainError::Validation(_)
                | DomainError::InvariantViolation(_)
                | DomainError::InvalidId(_)
                | DomainError::Conflict(_) => {}
            }
            assert_eq!(err.to_string(), message);
        }
    }
}
