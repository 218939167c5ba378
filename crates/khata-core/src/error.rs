//! # Error Types
//!
//! Domain-specific error types for khata-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  khata-core errors (this file)                                         │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  khata-db errors (separate crate)                                      │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── LedgerError      - What a ledger operation can fail with          │
//! │                                                                         │
//! │  khata-server errors                                                   │
//! │  └── ApiError         - What the HTTP client sees (JSON + status)      │
//! │                                                                         │
//! │  Flow: ValidationError → LedgerError → ApiError → HTTP response        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invoice totals that do not add up.
    ///
    /// ## When This Occurs
    /// - Negative subtotal or total on create/update
    /// - `amount_paid` supplied above the invoice total
    #[error("Invalid invoice amounts: {reason}")]
    InvalidInvoiceAmounts { reason: String },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any ledger side effect is performed.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., malformed email).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// An amount outside `0..=MAX_MONEY_CENTS`.
    pub fn money_out_of_range(field: impl Into<String>) -> Self {
        ValidationError::OutOfRange {
            field: field.into(),
            min: 0,
            max: crate::MAX_MONEY_CENTS,
        }
    }

    /// Shorthand for [`ValidationError::MustBePositive`].
    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidInvoiceAmounts {
            reason: "amount_paid exceeds total".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid invoice amounts: amount_paid exceeds total"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(
            ValidationError::required("customer_id").to_string(),
            "customer_id is required"
        );
        assert_eq!(
            ValidationError::must_be_positive("amount").to_string(),
            "amount must be positive"
        );
    }
}
