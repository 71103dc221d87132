//! # Validation Module
//!
//! Field-level rules shared by the record constructors in [`crate::types`]
//! and the cart.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: caller / UI          immediate feedback, empty checks        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE          every record constructor runs these     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: store                CHECK constraints (SQLite), versions    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_sku, validate_quantity};
//!
//! assert!(validate_sku("COLA-330").is_ok());
//! assert!(validate_quantity(5).is_ok());
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::{ValidationError, ValidationResult};
use crate::money::Money;
use crate::MAX_ITEM_QUANTITY;

const MAX_NAME_LEN: usize = 200;
const MAX_SKU_LEN: usize = 64;
const MAX_PHONE_LEN: usize = 32;
const MAX_EMAIL_LEN: usize = 254;

// =============================================================================
// String Validators
// =============================================================================

fn require_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a product name. Must be non-blank, at most 200 characters.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    require_text("name", name, MAX_NAME_LEN)
}

/// Validates a SKU.
///
/// SKUs are free text (shop owners type whatever is printed on the label),
/// so the only rules are non-blank and a length cap. Uniqueness is a
/// catalog policy, not a field rule.
///
/// ```rust
/// use tally_core::validation::validate_sku;
///
/// assert!(validate_sku("Leche Entera 1L").is_ok());
/// assert!(validate_sku("   ").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    require_text("sku", sku, MAX_SKU_LEN)
}

pub fn validate_client_name(name: &str) -> ValidationResult<()> {
    require_text("name", name, MAX_NAME_LEN)
}

pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    require_text("phone", phone, MAX_PHONE_LEN)
}

/// Validates an optional email. Blank counts as "not given".
///
/// ## Rules
/// - Must contain `@` with something on both sides
pub fn validate_email(email: Option<&str>) -> ValidationResult<()> {
    let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(());
    };

    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(ValidationError::TooLong {
            field: "email".to_string(),
            max: MAX_EMAIL_LEN,
        });
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidFormat {
            field: "email".to_string(),
            reason: "must look like name@domain".to_string(),
        }),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price. Zero is allowed (free samples); negative is not.
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::must_not_be_negative("price"));
    }
    Ok(())
}

/// Validates a stock level. Stock never goes below zero.
pub fn validate_stock(stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::must_not_be_negative("stock"));
    }
    Ok(())
}

/// Validates a payment amount (must be > 0).
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::must_be_positive("amount"));
    }
    Ok(())
}

/// Validates that a string is a UUID.
pub fn validate_uuid(field: &str, value: &str) -> ValidationResult<()> {
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a valid UUID".to_string(),
        })
}

// =============================================================================
// Unit Tests
// =============================================================================
