//! # Validation Module
//!
//! Input validation for ledger operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP (khata-server)                                          │
//! │  └── Type validation (serde deserialization of request DTOs)           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Business rules, checked before any write happens                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use khata_core::validation::{validate_payment_amount, validate_required};
//! use khata_core::Money;
//!
//! validate_required("customer_id", "c-1").unwrap();
//! assert!(validate_payment_amount(Money::zero()).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::{MAX_INVOICE_ITEMS, MAX_ITEM_QUANTITY, MAX_MONEY_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Checks that a field is present and not blank.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

/// Validates a display name (customer, product, batch).
///
/// ## Rules
/// - Must not be blank
/// - At most 200 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    validate_required(field, name)?;

    if name.trim().chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates an email address.
///
/// Only the shape is checked: a non-empty local part, an `@`, and a domain
/// containing a dot.
///
/// ## Example
/// ```rust
/// use khata_core::validation::validate_email;
///
/// assert!(validate_email("asha@example.in").is_ok());
/// assert!(validate_email("asha.example.in").is_err());
/// ```
pub fn validate_email(email: &str) -> ValidationResult<()> {
    validate_required("email", email)?;

    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };

    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "email".to_string(),
            reason: "expected name@domain".to_string(),
        });
    }

    Ok(())
}

/// Validates a phone number: digits plus optional `+`, spaces and dashes,
/// with 7 to 15 digits.
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    validate_required("phone", phone)?;

    let phone = phone.trim();
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || c == '+' || c == ' ' || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must contain only digits, spaces, '+' and '-'".to_string(),
        });
    }

    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if !(7..=15).contains(&digits) {
        return Err(ValidationError::OutOfRange {
            field: "phone digits".to_string(),
            min: 7,
            max: 15,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// A payment must move a positive amount of money, at most
/// [`MAX_MONEY_CENTS`].
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::must_be_positive("amount"));
    }
    validate_money_ceiling("amount", amount)
}

/// Validates a money field that may be zero but not negative, and not
/// above [`MAX_MONEY_CENTS`].
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    validate_money_ceiling(field, amount)
}

/// Rejects amounts above [`MAX_MONEY_CENTS`].
pub fn validate_money_ceiling(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.cents() > MAX_MONEY_CENTS {
        return Err(ValidationError::money_out_of_range(field));
    }
    Ok(())
}

/// Validates a line item quantity.
///
/// Zero is accepted (the line is kept but moves no stock); negative values
/// and absurd quantities are not.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if !(0..=MAX_ITEM_QUANTITY).contains(&quantity) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates the number of lines on an invoice.
pub fn validate_item_count(count: usize) -> ValidationResult<()> {
    if count > MAX_INVOICE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 0,
            max: MAX_INVOICE_ITEMS as i64,
        });
    }
    Ok(())
}

/// Validates a percentage given in basis points (0–100%).
pub fn validate_percentage_bps(field: &str, bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
