//! Wait-for-condition primitive used instead of fixed UI settle delays.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Poll `check` every `interval` until it yields `Some`, or give up after
/// `timeout`. The check always runs at least once.
pub async fn poll_until<T, F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check().await {
            return Some(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn returns_once_condition_holds() {
        let calls = AtomicUsize::new(0);
        let found = poll_until(Duration::from_secs(2), Duration::from_millis(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { (n >= 3).then_some(n) }
        })
        .await;
        assert_eq!(found, Some(3));
    }

    #[tokio::test]
    async fn gives_up_after_timeout() {
        let started = Instant::now();
        let found: Option<()> =
            poll_until(Duration::from_millis(40), Duration::from_millis(10), || async { None }).await;
        assert!(found.is_none());
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn zero_timeout_checks_once() {
        let calls = AtomicUsize::new(0);
        let found = poll_until(Duration::ZERO, Duration::from_millis(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Some("ready") }
        })
        .await;
        assert_eq!(found, Some("ready"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
