//! Async testing utilities

use std::future::Future;
use std::time::Duration;

/// Poll an async condition until it returns true or times out
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use routelink_common::testing::poll_until;
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// let seen = runtime.block_on(async {
///     let flag = Arc::new(AtomicBool::new(false));
///     let setter = Arc::clone(&flag);
///
///     tokio::spawn(async move {
///         tokio::time::sleep(Duration::from_millis(50)).await;
///         setter.store(true, Ordering::SeqCst);
///     });
///
///     poll_until(Duration::from_secs(1), Duration::from_millis(10), move || {
///         let flag = Arc::clone(&flag);
///         async move { flag.load(Ordering::SeqCst) }
///     })
///     .await
/// });
///
/// assert!(seen);
/// ```
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }

    condition().await
}
