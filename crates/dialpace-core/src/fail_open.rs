//! Fail-open utilities for graceful degradation
//!
//! Some writes are bookkeeping around a call rather than the call itself: the
//! finalized metrics log, batch status updates. Losing one of those must not turn
//! a webhook acknowledgement into an error the provider will keep retrying.
//!
//! DO NOT use fail-open for:
//! - Call placement in single-call mode (the caller must see the failure)
//! - Daily cap persistence before a batch starts (quota correctness)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```no_run
/// use dialpace_core::fail_open::fail_open;
/// use dialpace_core::Result;
///
/// async fn append_record() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let result = fail_open("metrics_log", || append_record()).await;
///     // result is None if append_record() failed, otherwise Some(())
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
