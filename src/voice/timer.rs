//! Cancellable one-shot deadlines
//!
//! A [`Deadline`] is owned by whichever component armed it. It is polled from
//! the controller's event loop, so cancelling it (or re-arming it) guarantees
//! the old deadline can never fire.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// A one-shot timer that is either disarmed or waiting for a deadline
#[derive(Debug, Default)]
pub struct Deadline {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Deadline {
    /// Create a disarmed deadline
    #[must_use]
    pub const fn new() -> Self {
        Self { sleep: None }
    }

    /// Arm the deadline `after` from now, replacing any previous arm
    pub fn arm(&mut self, after: Duration) {
        self.sleep = Some(Box::pin(tokio::time::sleep(after)));
    }

    /// Disarm the deadline
    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    /// Whether the deadline is currently armed
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Instant at which the deadline fires, if armed
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|s| s.deadline())
    }

    /// Wait until the deadline fires, then disarm it
    ///
    /// Pending forever while disarmed. Cancel-safe: dropping the future
    /// before it completes leaves the deadline armed.
    pub async fn elapsed(&mut self) {
        if let Some(sleep) = self.sleep.as_mut() {
            sleep.as_mut().await;
        } else {
            future::pending::<()>().await;
        }
        self.sleep = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_once() {
        let mut deadline = Deadline::new();
        deadline.arm(Duration::from_millis(50));
        assert!(deadline.is_armed());

        deadline.elapsed().await;
        assert!(!deadline.is_armed());

        let waited = tokio::time::timeout(Duration::from_secs(5), deadline.elapsed()).await;
        assert!(waited.is_err(), "disarmed deadline must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_deadline_never_fires() {
        let mut deadline = Deadline::new();
        deadline.arm(Duration::from_millis(50));
        deadline.cancel();

        let waited = tokio::time::timeout(Duration::from_secs(1), deadline.elapsed()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_pushes_deadline_out() {
        let mut deadline = Deadline::new();
        deadline.arm(Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(80)).await;
        deadline.arm(Duration::from_millis(100));

        let early = tokio::time::timeout(Duration::from_millis(50), deadline.elapsed()).await;
        assert!(early.is_err());

        let late = tokio::time::timeout(Duration::from_millis(100), deadline.elapsed()).await;
        assert!(late.is_ok());
    }
}
