//! Command Handlers module
//!
//! Back-office operations. Each handler validates its command, runs a
//! short sequence of database writes, then records the audit entry and
//! sends the customer email on a best-effort basis.

mod account_handler;
mod adjustment_handler;
mod approve_application_handler;
mod card_handler;
mod commands;
mod delete_user_handler;
mod notification_handler;
mod provisioning;
mod reject_application_handler;
pub(crate) mod store;


use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::AppError;

pub use account_handler::CreateAccountHandler;
pub use adjustment_handler::{request_hash, AdjustTransactionHandler, AdjustmentOutcome};
pub use approve_application_handler::ApproveApplicationHandler;
pub use card_handler::{IssueCardHandler, UpdateCardStatusHandler};
pub use commands::*;
pub use delete_user_handler::{DeleteUserHandler, USER_OWNED_TABLES};
pub use notification_handler::SendNotificationHandler;
pub use reject_application_handler::RejectApplicationHandler;

/// Header naming the acting staff member
pub const ADMIN_USER_HEADER: &str = "X-Admin-User-Id";

/// Mutating operations must name the staff member performing them
pub fn require_admin(context: &OperationContext) -> Result<Uuid, AppError> {
    context
        .admin_user_id
        .ok_or_else(|| AppError::MissingHeader(ADMIN_USER_HEADER.to_string()))
}
