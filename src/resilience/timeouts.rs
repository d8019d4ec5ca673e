//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap network operations with a per-operation timeout
//! - Wrap whole calls with the caller's overall deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry
//! - Operation timeouts (`Timeout`) are retryable, deadlines
//!   (`DeadlineExceeded`) end the call

use std::future::Future;
use std::time::Duration;

use crate::error::{ConnectorError, ConnectorResult};

/// Run a network operation, failing with `Timeout` after `limit`.
pub async fn with_timeout<F, T>(limit: Duration, operation: F) -> ConnectorResult<T>
where
    F: Future<Output = ConnectorResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(ConnectorError::Timeout(limit)),
    }
}

/// Run a whole call, failing with `DeadlineExceeded` after `deadline`.
pub async fn with_deadline<F, T>(deadline: Duration, call: F) -> ConnectorResult<T>
where
    F: Future<Output = ConnectorResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ConnectorError::DeadlineExceeded(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires() {
        let result: ConnectorResult<()> = with_timeout(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let expected = Duration::from_millis(100);
        assert!(matches!(result, Err(ConnectorError::Timeout(d)) if d == expected));
    }

    #[tokio::test]
    async fn test_passes_through_result() {
        let result =
            with_deadline(Duration::from_secs(1), async { Ok::<_, ConnectorError>(7) }).await;
        assert_eq!(result.unwrap(), 7);

        let result: ConnectorResult<()> =
            with_deadline(Duration::from_secs(1), async { Err(ConnectorError::NoTargets) }).await;
        assert!(matches!(result, Err(ConnectorError::NoTargets)));
    }
}
