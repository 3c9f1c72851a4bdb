//! Async test helpers
//!
//! Every wait here is bounded so a replication bug fails the test instead
//! of hanging it.

use std::future::Future;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout, Duration, Instant};

/// Default bound for replication waits in tests
pub const REPLICATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    Timeout,
    Closed,
}

impl std::fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "receive operation timed out"),
            RecvTimeoutError::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for RecvTimeoutError {}

/// Helper for receiving from a channel with a timeout
pub async fn recv_timeout<T>(
    rx: &mut mpsc::Receiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    timeout(duration, rx.recv())
        .await
        .map_err(|_| RecvTimeoutError::Timeout)?
        .ok_or(RecvTimeoutError::Closed)
}

/// Receive the next broadcast event, skipping over lag notices
pub async fn recv_event<T: Clone>(
    rx: &mut broadcast::Receiver<T>,
    duration: Duration,
) -> Result<T, RecvTimeoutError> {
    let deadline = Instant::now() + duration;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, rx.recv()).await {
            Err(_) => return Err(RecvTimeoutError::Timeout),
            Ok(Ok(event)) => return Ok(event),
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => return Err(RecvTimeoutError::Closed),
        }
    }
}

/// Poll `condition` until it holds or `duration` elapses.
///
/// Returns whether the condition was met.
pub async fn wait_until<F>(duration: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + duration;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// Helper to assert a future completes within duration
pub async fn assert_completes_within<F, T>(duration: Duration, future: F) -> T
where
    F: Future<Output = T>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => panic!("Future did not complete within {:?}", duration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_recv_timeout_success() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.send(42).await.unwrap();
        assert_eq!(recv_timeout(&mut rx, Duration::from_millis(100)).await, Ok(42));
    }

    #[tokio::test]
    async fn test_recv_timeout_closed() {
        let (tx, mut rx) = mpsc::channel::<u8>(1);
        drop(tx);
        assert_eq!(
            recv_timeout(&mut rx, Duration::from_millis(100)).await,
            Err(RecvTimeoutError::Closed)
        );
    }

    #[tokio::test]
    async fn test_recv_event_times_out() {
        let (_tx, mut rx) = broadcast::channel::<u8>(4);
        assert_eq!(
            recv_event(&mut rx, Duration::from_millis(20)).await,
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_recv_event_skips_lag() {
        let (tx, mut rx) = broadcast::channel::<u8>(1);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        assert_eq!(recv_event(&mut rx, Duration::from_millis(100)).await, Ok(2));
    }

    #[tokio::test]
    async fn test_wait_until() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let met = wait_until(Duration::from_secs(1), move || counter.fetch_add(1, Ordering::SeqCst) >= 2).await;
        assert!(met);
        assert!(!wait_until(Duration::from_millis(20), || false).await);
    }
}
