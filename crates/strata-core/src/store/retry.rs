//! Backoff retry for compare-and-set conflicts.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::config::RetryPolicy;
use crate::error::{StrataError, StrataResult};

/// Run `op` until it stops failing with `ConcurrentUpdateConflict`.
///
/// `op` must re-read the item on every attempt so each retry works against the
/// latest version. Other errors are returned immediately; a conflict that
/// survives every retry becomes `PersistenceContention`.
pub async fn retry_on_conflict<T, F, Fut>(policy: &RetryPolicy, id: &str, op: F) -> StrataResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StrataResult<T>>,
{
    let result = op
        .retry(
            ExponentialBuilder::default()
                .with_max_times(policy.max_retries)
                .with_min_delay(Duration::from_millis(policy.initial_delay_ms))
                .with_max_delay(Duration::from_millis(policy.max_delay_ms)),
        )
        .when(|e: &StrataError| e.is_retryable())
        .notify(|err, dur| {
            tracing::warn!(item_id = %id, delay = ?dur, error = %err, "Concurrent update conflict, retrying");
        })
        .await;

    match result {
        Err(StrataError::ConcurrentUpdateConflict { .. }) => {
            tracing::error!(item_id = %id, attempts = policy.max_retries + 1, "Conflict retries exhausted");
            Err(StrataError::PersistenceContention {
                id: id.to_string(),
                attempts: policy.max_retries + 1,
            })
        }
        other => other,
    }
}
