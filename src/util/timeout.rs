//! Deadline helper for outbound calls.

use std::future::Future;
use std::time::Duration;

use crate::error::TetherError;

/// Run `future`, failing with [`TetherError::Timeout`] (in milliseconds)
/// once `budget` elapses. The inner error passes through unchanged.
pub async fn with_timeout<T>(
    budget: Duration,
    future: impl Future<Output = Result<T, TetherError>>,
) -> Result<T, TetherError> {
    tokio::time::timeout(budget, future).await.unwrap_or_else(|_| {
        let millis = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(timeout_ms = millis, "Call exceeded its deadline");
        Err(TetherError::Timeout(millis))
    })
}
