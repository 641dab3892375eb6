// Transaction retry wrapper: runs a unit of work in one transaction and
// retries it when the store reports a deadlock or a lock-wait timeout.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, warn};

use crate::config::RetryConfig;
use crate::errors::LedgerError;

/// Future returned by a unit of work; it borrows the live transaction handle.
pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'c>>;

// SQLite: BUSY, LOCKED, BUSY_RECOVERY, LOCKED_SHAREDCACHE, BUSY_SNAPSHOT.
const SQLITE_TRANSIENT_CODES: &[&str] = &["5", "6", "261", "262", "517"];
// MySQL: deadlock found, lock wait timeout exceeded.
const MYSQL_TRANSIENT_CODES: &[&str] = &["1213", "1205"];
const TRANSIENT_MESSAGES: &[&str] = &[
    "deadlock found",
    "lock wait timeout exceeded",
    "database is locked",
    "database table is locked",
];

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Linear backoff step; attempt `n` sleeps `n * backoff_base` before retrying
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(20),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

/// Runs units of work inside retried transactions.
///
/// A unit of work may execute more than once when a transient conflict
/// forces a retry; every attempt runs in its own transaction and a failed
/// attempt is rolled back as a whole.
#[derive(Clone)]
pub struct TransactionRunner {
    pool: SqlitePool,
    policy: RetryPolicy,
}

impl TransactionRunner {
    pub fn new(pool: SqlitePool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    pub async fn with_transaction<T, F>(&self, mut unit: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T> + Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.run_once(&mut unit).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Transaction succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    let backoff = self.policy.backoff_for(attempt);
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Transaction hit a lock conflict, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    if err.is_transient() {
                        error!(attempt, error = %err, "Transaction retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn run_once<T, F>(&self, unit: &mut F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T> + Send,
    {
        let mut tx = self.pool.begin().await?;
        match unit(&mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after unit of work error");
                }
                Err(err)
            }
        }
    }
}

/// Determine whether a storage error is a transient lock conflict.
pub fn is_transient(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code: &str = &code;
                if SQLITE_TRANSIENT_CODES.contains(&code) || MYSQL_TRANSIENT_CODES.contains(&code) {
                    return true;
                }
            }
            message_is_transient(db_err.message())
        }
        sqlx::Error::PoolTimedOut => false,
        other => message_is_transient(&other.to_string()),
    }
}

fn message_is_transient(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_MESSAGES.iter().any(|needle| message.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    async fn memory_pool() -> SqlitePool {
        sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    fn lock_error() -> LedgerError {
        LedgerError::Database(sqlx::Error::Protocol(
            "Deadlock found when trying to get lock".to_string(),
        ))
    }

    #[test]
    fn test_transient_messages() {
        assert!(message_is_transient("Deadlock found when trying to get lock"));
        assert!(message_is_transient("Lock wait timeout exceeded; try restarting"));
        assert!(message_is_transient("(code: 5) database is locked"));
        assert!(!message_is_transient("UNIQUE constraint failed: work_hour_logs.idempotency_key"));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(20));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_retry_success_after_lock_conflicts() {
        let runner = TransactionRunner::new(memory_pool().await, RetryPolicy::default());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = runner
            .with_transaction(move |_conn| {
                let counter = counter.clone();
                Box::pin(async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(lock_error())
                    } else {
                        Ok("committed")
                    }
                })
            })
            .await;

        assert_eq!(result.unwrap(), "committed");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_error() {
        let runner = TransactionRunner::new(memory_pool().await, RetryPolicy::default());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result: Result<(), _> = runner
            .with_transaction(move |_conn| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(lock_error())
                })
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let runner = TransactionRunner::new(memory_pool().await, RetryPolicy::default());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result: Result<(), _> = runner
            .with_transaction(move |_conn| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(LedgerError::validation("reason is required"))
                })
            })
            .await;

        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_unit_of_work_rolls_back() {
        let pool = memory_pool().await;
        sqlx::query("CREATE TABLE t (v INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        let runner = TransactionRunner::new(pool.clone(), RetryPolicy::default());

        let result: Result<(), _> = runner
            .with_transaction(|conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO t (v) VALUES (1)")
                        .execute(&mut *conn)
                        .await?;
                    Err(LedgerError::conflict("abort after insert"))
                })
            })
            .await;
        assert!(result.is_err());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
