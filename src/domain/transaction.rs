//! Ledger transactions and manual adjustments

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Amount, Balance, DomainError};

/// Transaction category written for staff adjustments
pub const CATEGORY_MANUAL_ADJUSTMENT: &str = "manual_adjustment";

/// Transaction category written when an account opens with funds
pub const CATEGORY_INITIAL_DEPOSIT: &str = "initial_deposit";

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentDirection {
    Credit,
    Debit,
}

impl AdjustmentDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentDirection::Credit => "credit",
            AdjustmentDirection::Debit => "debit",
        }
    }

    /// Apply the adjustment to a balance, refusing to go below zero
    pub fn apply(&self, balance: Decimal, amount: &Amount) -> Result<Decimal, DomainError> {
        let current = Balance::new(balance).map_err(|_| {
            DomainError::BusinessRuleViolation(format!("account balance is negative ({})", balance))
        })?;

        match self {
            AdjustmentDirection::Credit => Ok(current.credit(amount).value()),
            AdjustmentDirection::Debit => {
                if !current.is_sufficient_for(amount) {
                    return Err(DomainError::insufficient_funds(amount.value(), balance));
                }
                current
                    .debit(amount)
                    .map(|b| b.value())
                    .map_err(|e| DomainError::InvalidAmount(e.to_string()))
            }
        }
    }
}

impl fmt::Display for AdjustmentDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row from the `transactions` table
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub transaction_type: String,
    pub category: String,
    pub description: String,
    pub status: String,
    pub balance_after: Decimal,
    pub reference: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_credit_adds() {
        let amount: Amount = "25.50".parse().unwrap();
        assert_eq!(
            AdjustmentDirection::Credit.apply(dec!(100), &amount),
            Ok(dec!(125.50))
        );
    }

    #[test]
    fn test_debit_subtracts() {
        let amount: Amount = "40".parse().unwrap();
        assert_eq!(
            AdjustmentDirection::Debit.apply(dec!(100), &amount),
            Ok(dec!(60))
        );
    }

    #[test]
    fn test_debit_below_zero_rejected() {
        let amount: Amount = "100.01".parse().unwrap();
        assert_eq!(
            AdjustmentDirection::Debit.apply(dec!(100), &amount),
            Err(DomainError::insufficient_funds(dec!(100.01), dec!(100)))
        );
    }

    #[test]
    fn test_direction_serde() {
        let direction: AdjustmentDirection = serde_json::from_str("\"debit\"").unwrap();
        assert_eq!(direction, AdjustmentDirection::Debit);
        assert!(serde_json::from_str::<AdjustmentDirection>("\"refund\"").is_err());
    }
}
