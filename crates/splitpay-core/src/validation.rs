//! # Validation Module
//!
//! Input validation for everything that enters the engine from a
//! collaborator or a caller.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization                                               │
//! │  └── Money refuses floats and sub-minor precision                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (shape checks)                                    │
//! │  ├── names, ids, prices, amounts, rates                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Rules (ledger.rs, session.rs, settlement.rs)                  │
//! │  ├── membership, lifecycle state, active-payment uniqueness             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: Database                                                      │
//! │  └── UNIQUE indexes, version tokens                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{ItemDraft, Rate, SplitRates};
use crate::{MAX_ITEMS_PER_RECEIPT, MAX_NAME_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a line item name as read from a receipt.
///
/// ## Rules
/// - Must not be blank
/// - At most 200 characters
///
/// ```rust
/// use splitpay_core::validation::validate_item_name;
///
/// assert!(validate_item_name("Jollof rice").is_ok());
/// assert!(validate_item_name("   ").is_err());
/// ```
pub fn validate_item_name(name: &str) -> ValidationResult<()> {
    validate_text("name", name, MAX_NAME_LEN)
}

/// Validates a participant display name.
pub fn validate_display_name(name: &str) -> ValidationResult<()> {
    validate_text("display_name", name, MAX_NAME_LEN)
}

/// Validates an opaque identifier (participant, session, item, record).
///
/// Identifiers come from other systems; we only require non-blank, bounded.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    validate_text(field, id, 128)
}

fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line item price.
///
/// ## Rules
/// - Must be non-negative (zero is allowed: complimentary items)
///
/// ```rust
/// use splitpay_core::money::Money;
/// use splitpay_core::validation::validate_price;
///
/// assert!(validate_price(Money::from_minor(1099)).is_ok());
/// assert!(validate_price(Money::zero()).is_ok());
/// assert!(validate_price(Money::from_minor(-100)).is_err());
/// ```
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "price".to_string(),
        });
    }

    Ok(())
}

/// Validates a payment amount.
///
/// ## Rules
/// - Must not be negative (>= 0)
/// - Zero is allowed; a member who owns no items settles with 0.00
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a rate in basis points.
///
/// ## Rules
/// - Must be between 0 and 10000 (0% to 100%)
pub fn validate_rate(field: &str, rate: Rate) -> ValidationResult<()> {
    if rate.bps() > Rate::MAX_BPS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: Rate::MAX_BPS as i64,
        });
    }

    Ok(())
}

/// Validates both halves of a rate pair.
pub fn validate_rates(rates: &SplitRates) -> ValidationResult<()> {
    validate_rate("tax_rate", rates.tax)?;
    validate_rate("service_rate", rates.service)
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates a batch of scanned items before it joins a ledger that
/// already holds `existing` items.
///
/// ## Rules
/// - At least one item
/// - At most `MAX_ITEMS_PER_RECEIPT` items on the receipt once the batch lands
/// - Every name valid, every price non-negative
pub fn validate_item_drafts(existing: usize, drafts: &[ItemDraft]) -> ValidationResult<()> {
    if drafts.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if existing + drafts.len() > MAX_ITEMS_PER_RECEIPT {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ITEMS_PER_RECEIPT as i64,
        });
    }

    for draft in drafts {
        validate_item_name(&draft.name)?;
        validate_price(draft.price)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_item_name() {
        assert!(validate_item_name("Kelewele").is_ok());
        assert!(validate_item_name("").is_err());
        assert!(validate_item_name("   ").is_err());
        assert!(validate_item_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(Money::zero()).is_ok());
        assert!(validate_price(Money::from_minor(2500)).is_ok());
        assert_eq!(
            validate_price(Money::from_minor(-1)),
            Err(ValidationError::MustNotBeNegative {
                field: "price".to_string()
            })
        );
    }

    #[test]
    fn test_validate_payment_amount() {
        assert!(validate_payment_amount(Money::from_minor(1)).is_ok());
        assert!(validate_payment_amount(Money::zero()).is_ok());
        assert!(validate_payment_amount(Money::from_minor(-100)).is_err());
    }

    #[test]
    fn test_validate_rates() {
        assert!(validate_rates(&SplitRates::default()).is_ok());
        assert!(validate_rate("tax_rate", Rate::from_bps(10_000)).is_ok());
        assert!(validate_rate("tax_rate", Rate::from_bps(10_001)).is_err());
    }

    #[test]
    fn test_validate_item_drafts() {
        let good = vec![
            ItemDraft::new("Banku & tilapia", Money::from_minor(6500)),
            ItemDraft::new("Water", Money::zero()),
        ];
        assert!(validate_item_drafts(0, &good).is_ok());

        assert!(validate_item_drafts(0, &[]).is_err());

        let negative = vec![ItemDraft::new("Refund?", Money::from_minor(-500))];
        assert!(validate_item_drafts(0, &negative).is_err());

        let unnamed = vec![ItemDraft::new(" ", Money::from_minor(500))];
        assert!(validate_item_drafts(0, &unnamed).is_err());
    }

    #[test]
    fn test_item_limit_counts_existing_items() {
        let batch = vec![ItemDraft::new("Water", Money::from_minor(500)); 2];
        assert!(validate_item_drafts(MAX_ITEMS_PER_RECEIPT - 2, &batch).is_ok());
        assert!(matches!(
            validate_item_drafts(MAX_ITEMS_PER_RECEIPT - 1, &batch),
            Err(ValidationError::OutOfRange { .. })
        ));
    }
}
