use crate::error::ForgeError;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

/// Await `future` for at most `limit`.
///
/// On expiry the future is dropped and a non-recoverable timeout error naming the
/// operation, the limit and the elapsed time is returned.
pub async fn with_timeout<T, Fut>(operation: &str, limit: Duration, future: Fut) -> Result<T, ForgeError>
where
    Fut: Future<Output = Result<T, ForgeError>>,
{
    let started = Instant::now();
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            let elapsed = started.elapsed();
            warn!(
                "Operation '{}' timed out after {:?} (limit {:?})",
                operation, elapsed, limit
            );
            Err(ForgeError::timeout(operation, limit, elapsed))
        }
    }
}
