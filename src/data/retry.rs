use std::time::Duration;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

use super::{DataError, DataResult};

/// Retry a fallible fetch with exponential backoff and jitter.
/// Only errors classified as retryable are attempted again.
pub async fn retry_with_backoff<F, Fut, T>(operation: F, max_attempts: usize) -> DataResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = DataResult<T>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(100)
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(max_attempts);

    RetryIf::spawn(
        retry_strategy,
        || async {
            match operation().await {
                Ok(result) => Ok(result),
                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!("Retryable error: {}", e);
                    } else {
                        tracing::error!("Non-retryable error: {}", e);
                    }
                    Err(e)
                }
            }
        },
        |e: &DataError| e.is_retryable(),
    )
    .await
}
