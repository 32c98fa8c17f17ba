//! Bank accounts and customer profiles

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::DomainError;

/// Product type of a deposit account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Checking,
    Savings,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
        }
    }

    /// Name used in customer-facing emails
    pub fn label(&self) -> &'static str {
        match self {
            AccountType::Checking => "Checking",
            AccountType::Savings => "Savings",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(AccountType::Checking),
            "savings" => Ok(AccountType::Savings),
            other => Err(DomainError::BusinessRuleViolation(format!(
                "unknown account type '{}'",
                other
            ))),
        }
    }
}

/// Lifecycle status of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }

    /// Money movement and card issuance need an active account
    pub fn ensure_active(&self) -> Result<(), DomainError> {
        if *self == AccountStatus::Active {
            Ok(())
        } else {
            Err(DomainError::AccountNotActive {
                status: self.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "frozen" => Ok(AccountStatus::Frozen),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(DomainError::BusinessRuleViolation(format!(
                "unknown account status '{}'",
                other
            ))),
        }
    }
}

/// Row from the `accounts` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_number: String,
    pub routing_number: String,
    pub account_type: String,
    pub balance: Decimal,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn status(&self) -> Result<AccountStatus, DomainError> {
        self.status.parse()
    }

    pub fn account_type(&self) -> Result<AccountType, DomainError> {
        self.account_type.parse()
    }

    pub fn masked_number(&self) -> String {
        mask_number(&self.account_number)
    }
}

/// Row from the `profiles` table
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub application_id: Option<Uuid>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub payment_customer_id: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// Replace everything but the last four characters with `*`
pub fn mask_number(number: &str) -> String {
    let chars: Vec<char> = number.chars().collect();
    let visible = chars.len().min(4);
    let hidden = chars.len() - visible;
    let mut masked = "*".repeat(hidden);
    masked.extend(&chars[hidden..]);
    masked
}

/// Last four characters of a number
pub fn last_four(number: &str) -> String {
    let chars: Vec<char> = number.chars().collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_parse() {
        assert_eq!("checking".parse::<AccountType>().unwrap(), AccountType::Checking);
        assert_eq!("savings".parse::<AccountType>().unwrap(), AccountType::Savings);
        assert!("brokerage".parse::<AccountType>().is_err());
        assert_eq!(AccountType::Savings.label(), "Savings");
    }

    #[test]
    fn test_account_type_serde() {
        let parsed: Vec<AccountType> = serde_json::from_str(r#"["checking","savings"]"#).unwrap();
        assert_eq!(parsed, vec![AccountType::Checking, AccountType::Savings]);
    }

    #[test]
    fn test_only_active_accounts_pass() {
        assert!(AccountStatus::Active.ensure_active().is_ok());
        assert_eq!(
            AccountStatus::Frozen.ensure_active(),
            Err(DomainError::AccountNotActive {
                status: "frozen".to_string()
            })
        );
        assert!(AccountStatus::Closed.ensure_active().is_err());
    }

    #[test]
    fn test_mask_number() {
        assert_eq!(mask_number("1234567890"), "******7890");
        assert_eq!(mask_number("4000001234567899"), "************7899");
        assert_eq!(mask_number("123"), "123");
        assert_eq!(mask_number(""), "");
    }

    #[test]
    fn test_last_four() {
        assert_eq!(last_four("4000001234567899"), "7899");
        assert_eq!(last_four("12"), "12");
    }
}
