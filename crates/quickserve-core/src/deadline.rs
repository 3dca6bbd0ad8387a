//! Request deadlines.
//!
//! A [`Deadline`] is armed when a [`Context`](crate::Context) is built and is
//! shared by every clone of it. The middleware chain checks it between stages
//! and the timeout arbiter fires it when the request runs out of time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A point in time after which a request must stop doing visible work.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Option<Instant>,
    fired: Arc<AtomicBool>,
}

impl Deadline {
    /// Arms a deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Some(Instant::now() + timeout),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A deadline that never expires on its own.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            at: None,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the instant the deadline expires at, if bounded.
    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    /// Returns the time left before expiry. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Marks the deadline as expired regardless of the clock.
    pub fn fire(&self) {
        self.fired.store(true, Ordering::Release);
    }

    /// Returns `true` once the deadline was fired or its instant has passed.
    pub fn is_expired(&self) -> bool {
        self.fired.load(Ordering::Acquire) || self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Resolves when the deadline instant is reached. Never resolves when unbounded.
    pub async fn expired(&self) {
        match self.at {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires_with_clock() {
        let deadline = Deadline::after(Duration::from_millis(100));
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(deadline.is_expired());
    }

    #[test]
    fn test_fire_is_shared_by_clones() {
        let deadline = Deadline::unbounded();
        let clone = deadline.clone();
        clone.fire();
        assert!(deadline.is_expired());
        assert!(deadline.remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_future_resolves_only_at_instant() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let mut expired = tokio_test::task::spawn(deadline.expired());
        tokio_test::assert_pending!(expired.poll());

        tokio::time::advance(Duration::from_millis(49)).await;
        tokio_test::assert_pending!(expired.poll());

        tokio::time::advance(Duration::from_millis(2)).await;
        tokio_test::assert_ready!(expired.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_future_never_resolves() {
        let deadline = Deadline::unbounded();
        let mut expired = tokio_test::task::spawn(deadline.expired());
        tokio::time::advance(Duration::from_secs(3600)).await;
        tokio_test::assert_pending!(expired.poll());
        assert!(!deadline.is_expired());
    }
}
