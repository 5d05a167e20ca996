//! Repository functions, one per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! Pure SQL with no domain types.

pub mod workflows;
pub mod executions;
pub mod checkpoints;
pub mod jobs;
