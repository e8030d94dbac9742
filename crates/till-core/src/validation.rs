//! # Validation Module
//!
//! Input checks that run before any transaction opens.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Deserialization                                               │
//! │  └── exact decimals ("12.50"), known enum values                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  └── required fields, positivity, lengths, line counts                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Engine transaction                                            │
//! │  └── stock, policy gates, balances (needs current state)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failure here is always a [`ValidationError`] naming the field; nothing
//! has been written yet, so the caller can retry with corrected input.

use crate::error::ValidationError;
use crate::money::{Money, Quantity};
use crate::types::{
    NewProduct, NewSale, OrderItemInput, StockMovementRequest, StockMovementType,
};
use crate::{MAX_AMOUNT, MAX_MODIFIERS, MAX_NOTE_LENGTH, MAX_QUANTITY, MAX_SALE_ITEMS};

pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU.
///
/// ## Rules
/// - 1 to 50 characters after trimming
/// - letters, digits, hyphens and underscores only
///
/// ## Example
/// ```rust
/// use till_core::validation::validate_sku;
///
/// assert!(validate_sku("COKE-330").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("with space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a required, bounded name-like field.
pub fn validate_name(field: &str, value: &str, max: usize) -> ValidationResult<()> {
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

/// Validates an optional free-text note.
pub fn validate_note(field: &str, note: Option<&str>) -> ValidationResult<()> {
    match note {
        Some(text) if text.chars().count() > MAX_NOTE_LENGTH => Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTE_LENGTH,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Quantity must be strictly positive and at most [`MAX_QUANTITY`].
pub fn validate_quantity(field: &str, quantity: Quantity) -> ValidationResult<()> {
    if !quantity.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    validate_quantity_range(field, quantity)
}

/// Quantity magnitude is at most [`MAX_QUANTITY`].
pub fn validate_quantity_range(field: &str, quantity: Quantity) -> ValidationResult<()> {
    if quantity > MAX_QUANTITY || quantity < -MAX_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            max: MAX_QUANTITY.to_string(),
        });
    }
    Ok(())
}

/// Amount magnitude is at most [`MAX_AMOUNT`]. Sign is left to the caller
/// (negative prices and discounts are a policy question).
pub fn validate_amount_range(field: &str, amount: Money) -> ValidationResult<()> {
    if amount > MAX_AMOUNT || amount < -MAX_AMOUNT {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            max: MAX_AMOUNT.to_string(),
        });
    }
    Ok(())
}

/// Amount must be strictly positive (payments, cash movements).
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    validate_amount_range(field, amount)
}

/// Amount must be zero or more (opening float, counted cash).
pub fn validate_non_negative_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    validate_amount_range(field, amount)
}

// =============================================================================
// Request Validators
// =============================================================================

pub fn validate_new_product(product: &NewProduct) -> ValidationResult<()> {
    validate_name("name", &product.name, 200)?;
    validate_amount_range("price", product.price)?;
    if let Some(sku) = &product.sku {
        validate_sku(sku)?;
    }
    if let Some(cost) = product.cost {
        validate_non_negative_amount("cost", cost)?;
    }
    if product.stock_min.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "stock_min".to_string(),
        });
    }
    validate_quantity_range("stock_min", product.stock_min)
}

/// ADJUST may set stock to exactly zero; every other type needs a positive
/// quantity.
pub fn validate_movement_request(request: &StockMovementRequest) -> ValidationResult<()> {
    if request.product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "product_id".to_string(),
        });
    }

    match request.movement_type {
        StockMovementType::Adjust if request.quantity.is_negative() => {
            return Err(ValidationError::MustNotBeNegative {
                field: "quantity".to_string(),
            })
        }
        StockMovementType::Adjust => validate_quantity_range("quantity", request.quantity)?,
        _ => validate_quantity("quantity", request.quantity)?,
    }

    validate_note("note", request.note.as_deref())
}

/// Shape checks for a sale. Discount sign and prices are policy questions
/// and are decided inside the transaction.
pub fn validate_new_sale(sale: &NewSale) -> ValidationResult<()> {
    if sale.items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if sale.items.len() > MAX_SALE_ITEMS {
        return Err(ValidationError::TooMany {
            field: "items".to_string(),
            max: MAX_SALE_ITEMS,
        });
    }

    for (index, line) in sale.items.iter().enumerate() {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: format!("items[{}].product_id", index),
            });
        }
        validate_quantity(&format!("items[{}].quantity", index), line.quantity)?;
        if let Some(price) = line.unit_price {
            validate_amount_range(&format!("items[{}].unit_price", index), price)?;
        }
    }

    validate_amount_range("discount", sale.discount)?;
    validate_note("notes", sale.notes.as_deref())
}

pub fn validate_order_item(item: &OrderItemInput) -> ValidationResult<()> {
    if item.product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "product_id".to_string(),
        });
    }

    validate_quantity("quantity", item.quantity)?;
    validate_note("note", item.note.as_deref())?;
    if let Some(price) = item.unit_price {
        validate_amount_range("unit_price", price)?;
    }

    if item.modifiers.len() > MAX_MODIFIERS {
        return Err(ValidationError::TooMany {
            field: "modifiers".to_string(),
            max: MAX_MODIFIERS,
        });
    }

    for (index, modifier) in item.modifiers.iter().enumerate() {
        validate_name(&format!("modifiers[{}].name", index), &modifier.name, 100)?;
        validate_amount_range(
            &format!("modifiers[{}].price_delta", index),
            modifier.price_delta,
        )?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
