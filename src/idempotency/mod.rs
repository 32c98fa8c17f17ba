//! Idempotency module
//!
//! Prevents duplicate request processing using idempotency keys.

mod repository;

pub use repository::{
    evaluate_existing, IdempotencyError, IdempotencyKey, IdempotencyOutcome,
    IdempotencyRepository, IdempotencyStatus, PROCESSING_TIMEOUT_MINUTES,
};
