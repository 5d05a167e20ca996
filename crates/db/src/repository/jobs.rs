//! Job queue repository functions.
//!
//! The queue is backed by the `job_queue` Postgres table.
//! Workers poll the table and use `SELECT … FOR UPDATE SKIP LOCKED`
//! for safe concurrent processing.
//!
//! A claimed job holds a lease: `updated_at` is its last sign of life. A
//! `processing` row whose lease has run out belongs to a dead worker and is
//! claimed again.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::JobRow};

/// Enqueue a new job for the given execution.
///
/// `payload` is the serialised trigger event the worker hands back to the engine.
pub async fn enqueue_job(
    pool: &PgPool,
    execution_id: Uuid,
    workflow_id: &str,
    max_attempts: i32,
    payload: serde_json::Value,
) -> Result<JobRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as::<_, JobRow>(
        r#"
        INSERT INTO job_queue
            (id, execution_id, workflow_id, status, attempts, max_attempts, payload, created_at, updated_at)
        VALUES ($1, $2, $3, 'pending', 0, $4, $5, $6, $6)
        RETURNING id, execution_id, workflow_id, status, attempts, max_attempts, payload, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(execution_id)
    .bind(workflow_id)
    .bind(max_attempts)
    .bind(payload)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Oldest `updated_at` a live lease can have at `now`.
pub fn lease_cutoff(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lease)
        .ok()
        .and_then(|lease| now.checked_sub_signed(lease))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Map an update's `rows_affected` onto `NotFound` when nothing matched.
pub fn expect_affected(rows_affected: u64) -> Result<(), DbError> {
    if rows_affected == 0 {
        Err(DbError::NotFound)
    } else {
        Ok(())
    }
}

/// Atomically claim the oldest pending job, or a `processing` job whose
/// lease expired, and mark it `processing`.
///
/// Expired jobs that already used all their attempts are dead-lettered
/// instead of being handed out again.
///
/// Uses `SELECT … FOR UPDATE SKIP LOCKED` so multiple workers can poll
/// safely without stepping on each other.
///
/// Returns `None` if nothing is claimable. The returned row already
/// reflects the incremented `attempts` counter.
pub async fn fetch_next_job(pool: &PgPool, lease: Duration) -> Result<Option<JobRow>, DbError> {
    let now = Utc::now();
    let cutoff = lease_cutoff(now, lease);
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE job_queue
        SET status = 'dead_lettered', updated_at = $1
        WHERE status = 'processing' AND updated_at < $2 AND attempts >= max_attempts
        "#,
    )
    .bind(now)
    .bind(cutoff)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, execution_id, workflow_id, status, attempts, max_attempts, payload, created_at, updated_at
        FROM job_queue
        WHERE status = 'pending'
           OR (status = 'processing' AND updated_at < $1)
        ORDER BY created_at ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(cutoff)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(job) = row else {
        tx.commit().await?;
        return Ok(None);
    };

    let claimed = sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE job_queue
        SET status = 'processing', attempts = attempts + 1, updated_at = $1
        WHERE id = $2
        RETURNING id, execution_id, workflow_id, status, attempts, max_attempts, payload, created_at, updated_at
        "#,
    )
    .bind(now)
    .bind(job.id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Some(claimed))
}

/// Renew the lease on a job that is still `processing`.
pub async fn touch_job(pool: &PgPool, job_id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE job_queue SET updated_at = $1 WHERE id = $2 AND status = 'processing'",
    )
    .bind(Utc::now())
    .bind(job_id)
    .execute(pool)
    .await?;
    expect_affected(result.rows_affected())
}

/// Mark a job as completed.
pub async fn complete_job(pool: &PgPool, job_id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE job_queue SET status = 'completed', updated_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(job_id)
        .execute(pool)
        .await?;
    expect_affected(result.rows_affected())
}

/// Put a failed job back to `pending`, or dead-letter it once `max_attempts`
/// is reached. Returns the status the job ended up in.
pub async fn fail_job(pool: &PgPool, job_id: Uuid) -> Result<String, DbError> {
    let status: String = sqlx::query_scalar(
        r#"
        UPDATE job_queue
        SET status = CASE WHEN attempts >= max_attempts THEN 'dead_lettered' ELSE 'pending' END,
            updated_at = $1
        WHERE id = $2
        RETURNING status
        "#,
    )
    .bind(Utc::now())
    .bind(job_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(status)
}

/// Dead-letter a job regardless of its remaining attempts.
pub async fn dead_letter_job(pool: &PgPool, job_id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE job_queue SET status = 'dead_lettered', updated_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(job_id)
        .execute(pool)
        .await?;
    expect_affected(result.rows_affected())
}
