//! Domain module
//!
//! Core domain types and business rules.

pub mod account;
pub mod amount;
pub mod application;
pub mod card;
pub mod context;
pub mod error;
pub mod generators;
pub mod transaction;

pub use account::{mask_number, AccountStatus, AccountType, Profile};
pub use amount::{Amount, AmountError, Balance};
pub use application::{Application, ApplicationStatus};
pub use card::{CardExpiry, CardStatus, CardType};
pub use context::OperationContext;
pub use error::DomainError;
pub use transaction::AdjustmentDirection;
