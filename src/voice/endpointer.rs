//! Silence endpointing
//!
//! Two nested timeouts separate "user paused mid-sentence" from "user walked
//! away". The short tier closes a turn; when it fires on an empty buffer the
//! long tier starts and, if nothing is heard before it fires, ends the
//! session. Only one tier is ever armed.

use std::time::Duration;

use super::timer::Deadline;

/// Which silence tier fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceTier {
    /// End of utterance (short timeout)
    Utterance,
    /// End of session (long timeout)
    Session,
}

/// Two-tier silence timer
#[derive(Debug)]
pub struct SilenceEndpointer {
    utterance_timeout: Duration,
    session_timeout: Duration,
    armed: Option<SilenceTier>,
    deadline: Deadline,
}

impl SilenceEndpointer {
    /// Create an endpointer with the given short and long timeouts
    #[must_use]
    pub const fn new(utterance_timeout: Duration, session_timeout: Duration) -> Self {
        Self {
            utterance_timeout,
            session_timeout,
            armed: None,
            deadline: Deadline::new(),
        }
    }

    /// Arm (or re-arm) the end-of-utterance tier, cancelling any session tier
    pub fn arm_utterance(&mut self) {
        self.armed = Some(SilenceTier::Utterance);
        self.deadline.arm(self.utterance_timeout);
        tracing::trace!(timeout_ms = self.utterance_timeout.as_millis(), "utterance timer armed");
    }

    /// Arm the end-of-session tier, cancelling any utterance tier
    pub fn arm_session(&mut self) {
        self.armed = Some(SilenceTier::Session);
        self.deadline.arm(self.session_timeout);
        tracing::trace!(timeout_ms = self.session_timeout.as_millis(), "session timer armed");
    }

    /// Cancel whichever tier is armed
    pub fn cancel(&mut self) {
        if self.armed.take().is_some() {
            tracing::trace!("silence timer cancelled");
        }
        self.deadline.cancel();
    }

    /// Currently armed tier
    #[must_use]
    pub const fn armed(&self) -> Option<SilenceTier> {
        self.armed
    }

    /// Wait for the armed tier to fire
    ///
    /// Pending forever while nothing is armed. Cancel-safe.
    pub async fn fired(&mut self) -> SilenceTier {
        loop {
            self.deadline.elapsed().await;
            if let Some(tier) = self.armed.take() {
                return tier;
            }
        }
    }
}
