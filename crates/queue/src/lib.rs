//! `queue` crate: durable trigger queue and the background worker.
//!
//! Triggers that should not run on the request path are enqueued as jobs.
//! A [`Worker`] claims jobs one at a time and hands them to the engine.
//! Every job carries its execution id from the moment it is enqueued, so a
//! redelivered job resumes from its checkpoints instead of starting over.

pub mod error;
pub mod job;
pub mod memory;
pub mod postgres;
pub mod worker;

pub use error::QueueError;
pub use job::{Job, JobQueue, JobStatus, QueueConfig};
pub use memory::MemoryJobQueue;
pub use postgres::PgJobQueue;
pub use worker::{Worker, WorkerConfig};
