//! `db` crate: Postgres persistence for workflow graphs, execution records,
//! durable step checkpoints and the job queue.
//!
//! Row structs mirror the tables one-to-one; mapping them onto domain types
//! is the caller's job. No business logic lives here.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::DbPool;
