//! # Cash Reconciliation
//!
//! Session totals and outstanding-balance math.
//!
//! ## Expected Cash
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  expected_cash = opening_cash_amount                                    │
//! │                + cash payments in the session                           │
//! │                + cash-IN movements                                      │
//! │                − cash-OUT movements                                     │
//! │                                                                         │
//! │  500.00 + 300.00 + 50.00 − 20.00 = 830.00                               │
//! │                                                                         │
//! │  difference = closing_cash_counted − expected_cash                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Card, transfer and other payments are reported per method but never
//! touch the drawer.

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{CashMovementType, CashSession, PaymentMethod};

/// Total received for one payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodTotal {
    pub method: PaymentMethod,
    pub amount: Money,
}

/// Aggregates for one cash session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub session_id: String,
    pub opening_cash_amount: Money,
    /// One entry per method, in `PaymentMethod::ALL` order.
    pub payments_by_method: Vec<MethodTotal>,
    pub payments_total: Money,
    pub cash_payments: Money,
    pub movement_in: Money,
    pub movement_out: Money,
    pub expected_cash: Money,
}

impl SessionTotals {
    pub fn compute(
        session: &CashSession,
        payments: &[(PaymentMethod, Money)],
        movements: &[(CashMovementType, Money)],
    ) -> Self {
        let payments_by_method: Vec<MethodTotal> = PaymentMethod::ALL
            .iter()
            .map(|&method| MethodTotal {
                method,
                amount: payments
                    .iter()
                    .filter(|(m, _)| *m == method)
                    .map(|(_, amount)| *amount)
                    .sum(),
            })
            .collect();

        let payments_total = payments.iter().map(|(_, amount)| *amount).sum();
        let cash_payments = payments_by_method
            .iter()
            .find(|t| t.method == PaymentMethod::Cash)
            .map(|t| t.amount)
            .unwrap_or_default();

        let movement_in: Money = movements
            .iter()
            .filter(|(t, _)| *t == CashMovementType::In)
            .map(|(_, amount)| *amount)
            .sum();
        let movement_out: Money = movements
            .iter()
            .filter(|(t, _)| *t == CashMovementType::Out)
            .map(|(_, amount)| *amount)
            .sum();

        SessionTotals {
            session_id: session.id.clone(),
            opening_cash_amount: session.opening_cash_amount,
            payments_by_method,
            payments_total,
            cash_payments,
            movement_in,
            movement_out,
            expected_cash: session.opening_cash_amount + cash_payments + movement_in
                - movement_out,
        }
    }

    /// Amount received for one method.
    pub fn for_method(&self, method: PaymentMethod) -> Money {
        self.payments_by_method
            .iter()
            .find(|t| t.method == method)
            .map(|t| t.amount)
            .unwrap_or_default()
    }

    /// Counted minus expected; negative means the drawer is short.
    pub fn difference(&self, counted: Money) -> Money {
        counted - self.expected_cash
    }
}

/// What is still owed on a sale. Never negative.
pub fn outstanding_balance(total: Money, paid: Money) -> Money {
    let owed = total - paid;
    if owed.is_positive() {
        owed
    } else {
        Money::zero()
    }
}

/// Result of one pending-sale collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub session_id: String,
    pub collected_count: usize,
    pub collected_total: Money,
    pub payment_ids: Vec<String>,
}

impl CollectionReport {
    pub fn new(session_id: impl Into<String>) -> Self {
        CollectionReport {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, payment_id: String, amount: Money) {
        self.collected_count += 1;
        self.collected_total += amount;
        self.payment_ids.push(payment_id);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CashSessionStatus;
    use chrono::Utc;

    fn session(opening_cents: i64) -> CashSession {
        CashSession {
            id: "cs-1".to_string(),
            business_id: "b-1".to_string(),
            register_id: None,
            status: CashSessionStatus::Open,
            opening_cash_amount: Money::from_cents(opening_cents),
            closing_cash_counted: None,
            expected_cash_total: None,
            difference_amount: None,
            note: None,
            opened_by: "u-1".to_string(),
            closed_by: None,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    #[test]
    fn test_reconciliation_example() {
        let totals = SessionTotals::compute(
            &session(50_000),
            &[(PaymentMethod::Cash, Money::from_units(300))],
            &[
                (CashMovementType::In, Money::from_units(50)),
                (CashMovementType::Out, Money::from_units(20)),
            ],
        );

        assert_eq!(totals.expected_cash, Money::from_units(830));
        assert_eq!(totals.movement_in, Money::from_units(50));
        assert_eq!(totals.movement_out, Money::from_units(20));
        assert_eq!(totals.difference(Money::from_units(825)), Money::from_units(-5));
    }

    #[test]
    fn test_non_cash_payments_do_not_reach_the_drawer() {
        let totals = SessionTotals::compute(
            &session(10_000),
            &[
                (PaymentMethod::Card, Money::from_units(40)),
                (PaymentMethod::Cash, Money::from_units(10)),
                (PaymentMethod::Card, Money::from_units(5)),
                (PaymentMethod::Transfer, Money::from_units(7)),
            ],
            &[],
        );

        assert_eq!(totals.for_method(PaymentMethod::Card), Money::from_units(45));
        assert_eq!(totals.for_method(PaymentMethod::Other), Money::zero());
        assert_eq!(totals.payments_total, Money::from_units(62));
        assert_eq!(totals.cash_payments, Money::from_units(10));
        assert_eq!(totals.expected_cash, Money::from_units(110));
        assert_eq!(totals.payments_by_method.len(), 4);
    }

    #[test]
    fn test_outstanding_balance_never_negative() {
        assert_eq!(
            outstanding_balance(Money::from_units(10), Money::from_units(4)),
            Money::from_units(6)
        );
        assert_eq!(
            outstanding_balance(Money::from_units(10), Money::from_units(10)),
            Money::zero()
        );
        assert_eq!(
            outstanding_balance(Money::from_units(-5), Money::zero()),
            Money::zero()
        );
    }

    #[test]
    fn test_collection_report() {
        let mut report = CollectionReport::new("cs-1");
        report.record("pay-1".into(), Money::from_units(3));
        report.record("pay-2".into(), Money::from_units(4));

        assert_eq!(report.collected_count, 2);
        assert_eq!(report.collected_total, Money::from_units(7));
    }
}
