use std::time::Duration as StdDuration;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::repositories;
use crate::services::store::StoreError;

/// Hand-off point between finalized attempts and the marking pipeline.
#[async_trait]
pub(crate) trait MarkingQueue: Send + Sync {
    /// Idempotent per attempt. Returns `false` when a job already exists.
    async fn enqueue(&self, attempt_id: &str, now: PrimitiveDateTime) -> Result<bool, StoreError>;

    /// Creates jobs for finalized attempts that never got one.
    async fn enqueue_missing(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<String>, StoreError>;
}

#[derive(Clone)]
pub(crate) struct PgMarkingQueue {
    pool: PgPool,
}

impl PgMarkingQueue {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarkingQueue for PgMarkingQueue {
    async fn enqueue(&self, attempt_id: &str, now: PrimitiveDateTime) -> Result<bool, StoreError> {
        Ok(repositories::marking_jobs::enqueue(&self.pool, attempt_id, now).await?)
    }

    async fn enqueue_missing(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<String>, StoreError> {
        Ok(repositories::marking_jobs::enqueue_missing(&self.pool, now, limit).await?)
    }
}

/// Hand-off after a terminal transition, bounded by `timeout`. Failures and timeouts are
/// logged and counted; the transition itself is never undone and the sweep re-enqueues later.
pub(crate) async fn notify_finalized(
    queue: &dyn MarkingQueue,
    attempt_id: &str,
    now: PrimitiveDateTime,
    timeout: StdDuration,
) -> bool {
    match tokio::time::timeout(timeout, queue.enqueue(attempt_id, now)).await {
        Ok(Ok(created)) => {
            tracing::debug!(attempt_id, created, "Marking job enqueued");
            true
        }
        Ok(Err(err)) => {
            metrics::counter!("marking_enqueue_failures_total").increment(1);
            tracing::error!(
                error = %err,
                attempt_id,
                "Failed to enqueue marking job; the expiry sweep will retry"
            );
            false
        }
        Err(_) => {
            metrics::counter!("marking_enqueue_failures_total").increment(1);
            tracing::error!(
                attempt_id,
                timeout_ms = timeout.as_millis() as u64,
                "Marking enqueue timed out; the expiry sweep will retry"
            );
            false
        }
    }
}
