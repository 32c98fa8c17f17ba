//! Payment cards

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::DomainError;

/// Card product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    #[default]
    Debit,
    Credit,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Debit => "debit",
            CardType::Credit => "credit",
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(CardType::Debit),
            "credit" => Ok(CardType::Credit),
            other => Err(DomainError::BusinessRuleViolation(format!(
                "unknown card type '{}'",
                other
            ))),
        }
    }
}

/// Card lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Active,
    Frozen,
    Cancelled,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Active => "active",
            CardStatus::Frozen => "frozen",
            CardStatus::Cancelled => "cancelled",
        }
    }

    /// Cancelled is terminal; active and frozen toggle freely.
    pub fn transition_to(&self, next: CardStatus) -> Result<CardStatus, DomainError> {
        match (self, next) {
            (CardStatus::Cancelled, _) => Err(DomainError::invalid_transition(self, next)),
            (current, next) if *current == next => Err(DomainError::invalid_transition(self, next)),
            (_, next) => Ok(next),
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CardStatus::Active),
            "frozen" => Ok(CardStatus::Frozen),
            "cancelled" => Ok(CardStatus::Cancelled),
            other => Err(DomainError::BusinessRuleViolation(format!(
                "unknown card status '{}'",
                other
            ))),
        }
    }
}

/// Card expiry (month/year)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CardExpiry {
    pub month: u32,
    pub year: i32,
}

impl CardExpiry {
    /// Expiry `years` after `issued_at`, keeping the issue month
    pub fn from_issue_date(issued_at: DateTime<Utc>, years: u32) -> Self {
        Self {
            month: issued_at.month(),
            year: issued_at.year() + years as i32,
        }
    }
}

impl fmt::Display for CardExpiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}", self.month, self.year % 100)
    }
}

/// Row from the `cards` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Card {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub card_number: String,
    pub last_four: String,
    pub cardholder_name: String,
    pub expiry_month: i32,
    pub expiry_year: i32,
    pub card_type: String,
    pub status: String,
    pub spending_limit: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn status(&self) -> Result<CardStatus, DomainError> {
        self.status.parse()
    }

    pub fn expiry(&self) -> CardExpiry {
        CardExpiry {
            month: self.expiry_month as u32,
            year: self.expiry_year,
        }
    }
}

/// Luhn check digit for a string of ASCII digits
pub fn luhn_check_digit(payload: &str) -> u32 {
    let sum: u32 = payload
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            // Rightmost payload digit is doubled once the check digit is appended
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    (10 - (sum % 10)) % 10
}

/// Validate a full card number with the Luhn algorithm
pub fn luhn_valid(number: &str) -> bool {
    if number.len() < 2 || !number.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let (payload, check) = number.split_at(number.len() - 1);
    check.parse::<u32>().ok() == Some(luhn_check_digit(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_luhn_known_numbers() {
        // Classic test PANs
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("5555555555554444"));
        assert!(luhn_valid("79927398713"));
        assert!(!luhn_valid("4111111111111112"));
        assert!(!luhn_valid("41111111a1111111"));
    }

    #[test]
    fn test_luhn_check_digit() {
        assert_eq!(luhn_check_digit("7992739871"), 3);
        assert_eq!(luhn_check_digit("411111111111111"), 1);
    }

    #[test]
    fn test_card_status_transitions() {
        assert_eq!(
            CardStatus::Active.transition_to(CardStatus::Frozen),
            Ok(CardStatus::Frozen)
        );
        assert_eq!(
            CardStatus::Frozen.transition_to(CardStatus::Active),
            Ok(CardStatus::Active)
        );
        assert_eq!(
            CardStatus::Frozen.transition_to(CardStatus::Cancelled),
            Ok(CardStatus::Cancelled)
        );
        assert!(CardStatus::Cancelled.transition_to(CardStatus::Active).is_err());
        assert!(CardStatus::Active.transition_to(CardStatus::Active).is_err());
    }

    #[test]
    fn test_expiry_from_issue_date() {
        let issued = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let expiry = CardExpiry::from_issue_date(issued, 4);

        assert_eq!(expiry, CardExpiry { month: 10, year: 2030 });
        assert_eq!(expiry.to_string(), "10/30");
    }

    #[test]
    fn test_card_type_default_is_debit() {
        assert_eq!(CardType::default(), CardType::Debit);
        assert_eq!("credit".parse::<CardType>().unwrap(), CardType::Credit);
    }
}
