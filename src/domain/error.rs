//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

/// Domain-specific errors
///
/// These errors represent business rule violations and domain invariant failures.
/// They are independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Debit would take the balance below zero
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    /// Account is frozen or closed
    #[error("Account is not active (status: {status})")]
    AccountNotActive { status: String },

    /// Invalid amount (zero, negative, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Application was already approved or rejected
    #[error("Application already reviewed (status: {status})")]
    ApplicationAlreadyReviewed { status: String },

    /// Disallowed status change
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Random generator could not find a free value
    #[error("Could not generate a unique {kind} after {attempts} attempts")]
    UniqueValueExhausted { kind: &'static str, attempts: u32 },

    /// Business rule violation
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),
}

impl DomainError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds { required, available }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStatusTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_error() {
        let err = DomainError::insufficient_funds(Decimal::new(100, 0), Decimal::new(50, 0));

        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_already_reviewed_names_status() {
        let err = DomainError::ApplicationAlreadyReviewed {
            status: "approved".to_string(),
        };
        assert!(err.to_string().contains("approved"));
    }

    #[test]
    fn test_unique_exhaustion_message() {
        let err = DomainError::UniqueValueExhausted {
            kind: "card number",
            attempts: 10,
        };
        assert_eq!(
            err.to_string(),
            "Could not generate a unique card number after 10 attempts"
        );
    }
}
