//! # Stock Arithmetic
//!
//! The pure half of the stock ledger: how one movement changes a level,
//! when it must be refused, and how a log replays to a level.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ Movement     │ New quantity                 │
//! ├──────────────┼──────────────────────────────┤
//! │ IN    q      │ current + q                  │
//! │ OUT   q      │ current − q                  │
//! │ WASTE q      │ current − q                  │
//! │ ADJUST q     │ q  (absolute, counted value) │
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! The database crate calls [`plan_movement`] while holding the stock row,
//! so the decision is always made against the locked value.

use serde_json::json;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Quantity;
use crate::types::StockMovementType;

/// Result of applying one movement to a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementPlan {
    pub before: Quantity,
    pub after: Quantity,
}

impl MovementPlan {
    /// True when the movement leaves stock below zero.
    #[inline]
    pub fn goes_negative(&self) -> bool {
        self.after.is_negative()
    }

    /// True when the movement lowers stock and ends below zero. Only these
    /// are gated; a movement that raises a negative level is always fine.
    #[inline]
    pub fn lowers_into_negative(&self) -> bool {
        self.after.is_negative() && self.after < self.before
    }

    /// Audit reason and metadata stored with a movement that was allowed to
    /// push stock further below zero. `None` otherwise.
    pub fn negative_stock_audit(
        &self,
        movement_type: StockMovementType,
        requested: Quantity,
    ) -> Option<(String, serde_json::Value)> {
        if !self.lowers_into_negative() {
            return None;
        }

        let reason = format!(
            "{} of {} drove stock from {} to {}",
            movement_type, requested, self.before, self.after
        );
        let metadata = json!({
            "negative_stock_allowed": true,
            "quantity_before": self.before.to_string(),
            "quantity_after": self.after.to_string(),
            "shortfall": (-self.after).to_string(),
        });
        Some((reason, metadata))
    }
}

/// New level after one movement, with no policy applied.
///
/// `None` when the level would leave the representable range.
pub fn apply_movement(
    current: Quantity,
    movement_type: StockMovementType,
    quantity: Quantity,
) -> Option<Quantity> {
    match movement_type {
        StockMovementType::In => current.checked_add(quantity),
        StockMovementType::Out | StockMovementType::Waste => current.checked_sub(quantity),
        StockMovementType::Adjust => Some(quantity),
    }
}

/// Decides a movement against the current (locked) level.
///
/// ## Rules
/// - IN, and ADJUST to a non-negative count, are never refused
/// - OUT/WASTE that end below zero need `allow_negative`
/// - a movement on already negative stock is refused only if it lowers it
///   further
///
/// ## Returns
/// * `Ok(MovementPlan)` - the before/after levels to persist
/// * `Err(CoreError::InsufficientStock)` - the movement lowers stock below
///   zero and `allow_negative` is false
/// * `Err(CoreError::Validation)` - the resulting level overflows
pub fn plan_movement(
    product_id: &str,
    current: Quantity,
    movement_type: StockMovementType,
    quantity: Quantity,
    allow_negative: bool,
) -> CoreResult<MovementPlan> {
    let after = apply_movement(current, movement_type, quantity).ok_or_else(|| {
        CoreError::from(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            max: Quantity::from_hundredths(i64::MAX).to_string(),
        })
    })?;

    let plan = MovementPlan {
        before: current,
        after,
    };

    if plan.lowers_into_negative() && !allow_negative {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            available: current,
            requested: quantity,
        });
    }

    Ok(plan)
}

/// Replays a movement log from zero.
///
/// `None` if the log overflows, which a log of accepted movements never
/// does.
pub fn replay<I>(movements: I) -> Option<Quantity>
where
    I: IntoIterator<Item = (StockMovementType, Quantity)>,
{
    movements
        .into_iter()
        .try_fold(Quantity::zero(), |level, (movement_type, quantity)| {
            apply_movement(level, movement_type, quantity)
        })
}

// =============================================================================
// Unit Tests
// =============================================================================
