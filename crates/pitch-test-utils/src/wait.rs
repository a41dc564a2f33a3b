//! Async wait helpers.

use std::time::Duration;

/// Default upper bound for [`wait_until`].
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_STEP: Duration = Duration::from_millis(10);

/// Wait until `condition` holds, panicking after [`DEFAULT_WAIT_TIMEOUT`].
pub async fn wait_until(condition: impl FnMut() -> bool) {
    wait_until_timeout(DEFAULT_WAIT_TIMEOUT, condition).await;
}

/// Wait until `condition` holds, panicking after `timeout`.
pub async fn wait_until_timeout(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let result = tokio::time::timeout(timeout, async {
        while !condition() {
            tokio::time::sleep(POLL_STEP).await;
        }
    })
    .await;

    assert!(result.is_ok(), "condition not met within {timeout:?}");
}

/// Wait `duration` and then check `condition` still does not hold.
pub async fn assert_stays_false(duration: Duration, mut condition: impl FnMut() -> bool) {
    tokio::time::sleep(duration).await;
    assert!(!condition(), "condition became true within {duration:?}");
}
