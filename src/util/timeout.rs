//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::HalError;

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, HalError>>,
) -> Result<T, HalError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(HalError::Timeout(duration.as_millis() as u64)),
    }
}
