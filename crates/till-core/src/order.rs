//! # Order Lines
//!
//! Line merging, modifier pricing and the per-order stock check.
//!
//! ## Merging
//! ```text
//! add "Latte" ×1 (oat milk)      ──► new line   Latte ×1 [oat milk]
//! add "Latte" ×2 (oat milk)      ──► merged     Latte ×3 [oat milk]
//! add "Latte" ×1 (no modifiers)  ──► new line   Latte ×1 []
//! add "Latte" ×1 note "no foam"  ──► new line   Latte ×1 [] "no foam"
//! ```
//! Two lines merge when product, snapshotted name, note, unit price and
//! modifier signature are all equal.

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Quantity};
use crate::types::{OrderItem, OrderModifier};

/// Order-independent fingerprint of a modifier set.
///
/// ## Example
/// ```rust
/// use till_core::money::Money;
/// use till_core::order::modifier_signature;
/// use till_core::types::OrderModifier;
///
/// let a = [OrderModifier::new("Oat milk", Money::from_cents(50)), OrderModifier::new("extra shot", Money::from_cents(80))];
/// let b = [OrderModifier::new("extra shot", Money::from_cents(80)), OrderModifier::new("oat milk ", Money::from_cents(50))];
/// assert_eq!(modifier_signature(&a), modifier_signature(&b));
/// assert_eq!(modifier_signature(&[]), "");
/// ```
pub fn modifier_signature(modifiers: &[OrderModifier]) -> String {
    let mut parts: Vec<String> = modifiers
        .iter()
        .map(|m| format!("{}:{}", m.name.trim().to_lowercase(), m.price_delta))
        .collect();
    parts.sort();
    parts.join("|")
}

/// Base price plus every modifier delta.
pub fn unit_price_with_modifiers(base: Money, modifiers: &[OrderModifier]) -> Money {
    base + modifiers.iter().map(|m| m.price_delta).sum::<Money>()
}

/// Blank notes are treated as no note.
pub fn normalize_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

/// Identity used to decide whether an addition merges into a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineKey<'a> {
    pub product_id: &'a str,
    pub product_name: &'a str,
    pub note: Option<&'a str>,
    pub unit_price: Money,
    pub modifier_signature: &'a str,
}

impl<'a> LineKey<'a> {
    pub fn of(item: &'a OrderItem) -> Self {
        LineKey {
            product_id: &item.product_id,
            product_name: &item.product_name,
            note: item.note.as_deref(),
            unit_price: item.unit_price,
            modifier_signature: &item.modifier_signature,
        }
    }
}

/// Index of the existing line an addition merges into, if any.
pub fn find_mergeable(items: &[OrderItem], key: &LineKey<'_>) -> Option<usize> {
    items.iter().position(|item| LineKey::of(item) == *key)
}

/// Sum of line totals.
pub fn order_subtotal(items: &[OrderItem]) -> Money {
    items.iter().map(|item| item.line_total).sum()
}

/// Quantity of one product already committed across this order's lines.
pub fn committed_quantity(items: &[OrderItem], product_id: &str) -> Quantity {
    items
        .iter()
        .filter(|item| item.product_id == product_id)
        .map(|item| item.quantity)
        .sum()
}

/// Checks the order's running quantity of a product against stock.
///
/// ## Returns
/// * `Ok(false)` - enough stock
/// * `Ok(true)` - short, but the policy allows it; flag the line
/// * `Err(CoreError::OutOfStock)` - short and the policy forbids it
pub fn check_line_stock(
    product_id: &str,
    available: Quantity,
    committed_after: Quantity,
    allow_sell_without_stock: bool,
) -> CoreResult<bool> {
    if committed_after <= available {
        return Ok(false);
    }

    if allow_sell_without_stock {
        return Ok(true);
    }

    Err(CoreError::OutOfStock {
        product_id: product_id.to_string(),
        available,
        requested: committed_after,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
