use poolwarm_core::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Run a fallible network call under `limit`, turning expiry into
/// [`Error::Timeout`].
pub(crate) async fn with_timeout<T, F>(operation: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(operation, limit)),
    }
}
