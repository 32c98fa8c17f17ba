//! Bank back-office library
//!
//! Re-exports modules for the server binary and integration tests.

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod handlers;
pub mod idempotency;
pub mod integrations;
pub mod jobs;
pub mod notifications;
pub mod state;

pub use api::build_router;
pub use config::Config;
pub use domain::{Amount, AmountError, Balance, DomainError, OperationContext};
pub use error::{AppError, AppResult, ErrorResponse};
pub use state::AppState;
