//! Command definitions
//!
//! Commands carry validated intent into the handlers; results are what
//! the API returns.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    AccountType, AdjustmentDirection, Amount, CardStatus, CardType,
};
use crate::error::AppError;

pub const MAX_REJECTION_REASON_LEN: usize = 500;
pub const MAX_DESCRIPTION_LEN: usize = 255;
pub const MAX_REFERENCE_LEN: usize = 100;
pub const MAX_CARDHOLDER_NAME_LEN: usize = 26;
pub const MAX_SUBJECT_LEN: usize = 200;
pub const MAX_MESSAGE_LEN: usize = 10_000;

/// Trimmed, non-empty and at most `max` characters
fn required_text(field: &str, value: &str, max: usize) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidRequest(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > max {
        return Err(AppError::InvalidRequest(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}

// =========================================================================
// Applications
// =========================================================================

#[derive(Debug, Clone)]
pub struct ApproveApplicationCommand {
    pub application_id: Uuid,
    pub account_types: Vec<AccountType>,
    pub issue_card: bool,
    pub card_type: CardType,
}

impl ApproveApplicationCommand {
    /// Checking and savings, with a debit card
    pub fn new(application_id: Uuid) -> Self {
        Self {
            application_id,
            account_types: vec![AccountType::Checking, AccountType::Savings],
            issue_card: true,
            card_type: CardType::Debit,
        }
    }

    pub fn with_account_types(mut self, account_types: Vec<AccountType>) -> Self {
        self.account_types = account_types;
        self
    }

    pub fn with_card(mut self, issue_card: bool, card_type: CardType) -> Self {
        self.issue_card = issue_card;
        self.card_type = card_type;
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.account_types.is_empty() {
            return Err(AppError::InvalidRequest(
                "account_types must contain at least one account type".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        if !self.account_types.iter().all(|t| seen.insert(*t)) {
            return Err(AppError::InvalidRequest(
                "account_types must not contain duplicates".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RejectApplicationCommand {
    pub application_id: Uuid,
    pub reason: String,
}

impl RejectApplicationCommand {
    pub fn new(application_id: Uuid, reason: String) -> Self {
        Self {
            application_id,
            reason,
        }
    }

    /// Returns the trimmed reason
    pub fn validate(&self) -> Result<String, AppError> {
        required_text("reason", &self.reason, MAX_REJECTION_REASON_LEN)
    }
}

/// Account as shown right after provisioning
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedAccount {
    pub account_id: Uuid,
    pub account_type: AccountType,
    pub masked_number: String,
}

/// Card as shown right after issuance; never the full number or CVV
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCard {
    pub card_id: Uuid,
    pub account_id: Uuid,
    pub card_type: CardType,
    pub masked_number: String,
    pub last_four: String,
    pub expiry: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalResult {
    pub application_id: Uuid,
    pub user_id: Uuid,
    pub accounts: Vec<ProvisionedAccount>,
    pub card: Option<IssuedCard>,
    pub payment_customer_id: Option<String>,
    pub email_sent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectionResult {
    pub application_id: Uuid,
    pub status: String,
    pub reason: String,
    pub email_sent: bool,
}

// =========================================================================
// Accounts
// =========================================================================

#[derive(Debug, Clone)]
pub struct CreateAccountCommand {
    pub user_id: Uuid,
    pub account_type: AccountType,
    pub initial_deposit: Option<Amount>,
}

impl CreateAccountCommand {
    pub fn new(user_id: Uuid, account_type: AccountType) -> Self {
        Self {
            user_id,
            account_type,
            initial_deposit: None,
        }
    }

    pub fn with_initial_deposit(mut self, amount: Amount) -> Self {
        self.initial_deposit = Some(amount);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAccountResult {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub account_type: AccountType,
    pub masked_number: String,
    pub routing_number: String,
    pub balance: Decimal,
    pub initial_transaction_id: Option<Uuid>,
    pub email_sent: bool,
}

// =========================================================================
// Cards
// =========================================================================

#[derive(Debug, Clone)]
pub struct IssueCardCommand {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub card_type: CardType,
    pub cardholder_name: Option<String>,
    pub spending_limit: Option<Amount>,
}

impl IssueCardCommand {
    pub fn new(user_id: Uuid, account_id: Uuid, card_type: CardType) -> Self {
        Self {
            user_id,
            account_id,
            card_type,
            cardholder_name: None,
            spending_limit: None,
        }
    }

    /// Upper-cased override name, if one was given
    pub fn validated_cardholder_name(&self) -> Result<Option<String>, AppError> {
        self.cardholder_name
            .as_deref()
            .map(|name| {
                required_text("cardholder_name", name, MAX_CARDHOLDER_NAME_LEN)
                    .map(|n| n.to_uppercase())
            })
            .transpose()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueCardResult {
    #[serde(flatten)]
    pub card: IssuedCard,
    pub user_id: Uuid,
    pub cardholder_name: String,
    pub spending_limit: Option<Decimal>,
    pub status: CardStatus,
    pub email_sent: bool,
}

#[derive(Debug, Clone)]
pub struct UpdateCardStatusCommand {
    pub card_id: Uuid,
    pub status: CardStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CardStatusResult {
    pub card_id: Uuid,
    pub previous_status: CardStatus,
    pub status: CardStatus,
}

// =========================================================================
// Adjustments
// =========================================================================

#[derive(Debug, Clone)]
pub struct AdjustTransactionCommand {
    pub account_id: Uuid,
    pub amount: Amount,
    pub direction: AdjustmentDirection,
    pub description: String,
    pub reference: Option<String>,
}

impl AdjustTransactionCommand {
    pub fn new(
        account_id: Uuid,
        amount: Amount,
        direction: AdjustmentDirection,
        description: String,
    ) -> Self {
        Self {
            account_id,
            amount,
            direction,
            description,
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: String) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Returns the trimmed description and reference
    pub fn validate(&self) -> Result<(String, Option<String>), AppError> {
        let description = required_text("description", &self.description, MAX_DESCRIPTION_LEN)?;
        let reference = self
            .reference
            .as_deref()
            .map(|r| required_text("reference", r, MAX_REFERENCE_LEN))
            .transpose()?;
        Ok((description, reference))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentResult {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub direction: AdjustmentDirection,
    pub amount: Amount,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub email_sent: bool,
}

// =========================================================================
// Users & notifications
// =========================================================================

/// Outcome of a best-effort provider cleanup call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProviderCleanup {
    Deleted,
    Skipped { reason: String },
    Failed { error: String },
}

/// Rows removed from one table
#[derive(Debug, Clone, Serialize)]
pub struct TableCleanup {
    pub table: &'static str,
    pub deleted: u64,
}

/// A cleanup step that failed; later steps still ran
#[derive(Debug, Clone, Serialize)]
pub struct FailedStep {
    pub step: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    pub user_id: Uuid,
    pub tables: Vec<TableCleanup>,
    pub failed_steps: Vec<FailedStep>,
    pub applications_unlinked: u64,
    pub profile_deleted: bool,
    pub payment_customer: ProviderCleanup,
    pub auth_user: ProviderCleanup,
    pub email_sent: bool,
}

impl DeletionReport {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            tables: Vec::new(),
            failed_steps: Vec::new(),
            applications_unlinked: 0,
            profile_deleted: false,
            payment_customer: ProviderCleanup::Skipped {
                reason: "not attempted".to_string(),
            },
            auth_user: ProviderCleanup::Skipped {
                reason: "not attempted".to_string(),
            },
            email_sent: false,
        }
    }

    pub fn record_failure(&mut self, step: impl Into<String>, error: impl ToString) {
        self.failed_steps.push(FailedStep {
            step: step.into(),
            error: error.to_string(),
        });
    }

    pub fn rows_deleted(&self) -> u64 {
        self.tables.iter().map(|t| t.deleted).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failed_steps.is_empty()
            && self.profile_deleted
            && !matches!(self.auth_user, ProviderCleanup::Failed { .. })
            && !matches!(self.payment_customer, ProviderCleanup::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SendNotificationCommand {
    pub user_id: Uuid,
    pub subject: String,
    pub message: String,
}

impl SendNotificationCommand {
    /// Returns the trimmed subject and message
    pub fn validate(&self) -> Result<(String, String), AppError> {
        Ok((
            required_text("subject", &self.subject, MAX_SUBJECT_LEN)?,
            required_text("message", &self.message, MAX_MESSAGE_LEN)?,
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationResult {
    pub user_id: Uuid,
    pub template: &'static str,
    pub email_sent: bool,
}
