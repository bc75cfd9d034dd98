//! Speech source lifecycle
//!
//! Wraps a [`Recognizer`] with start/stop idempotence, run tracking, error
//! classification and auto-restart. While suppressed (reply audio playing)
//! the source stays stopped and never schedules a restart.

use std::time::Duration;

use super::recognizer::{RecognitionErrorKind, RecognitionEvent, Recognizer, TranscriptFragment};
use super::timer::Deadline;
use crate::config::TimingConfig;
use crate::event::RunId;

/// What the controller needs to know about an accepted recognizer event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSignal {
    /// The run is live
    Started,
    /// A fragment from the current run
    Fragment(TranscriptFragment),
    /// A user-visible recognition fault; a retry is already scheduled
    Fault(RecognitionErrorKind),
    /// The run ended; a restart is scheduled unless suppressed
    Ended,
}

/// Delays governing restarts
#[derive(Debug, Clone, Copy)]
pub struct RestartPolicy {
    /// Delay before restarting after a clean end
    pub restart_delay: Duration,
    /// Delay before retrying after a fault
    pub fault_retry_delay: Duration,
    /// Delay before retrying a failed start
    pub start_retry_delay: Duration,
}

impl From<&TimingConfig> for RestartPolicy {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            restart_delay: timing.restart_delay,
            fault_retry_delay: timing.fault_retry_delay,
            start_retry_delay: timing.start_retry_delay,
        }
    }
}

/// Owns the recognizer and its lifecycle
pub struct SpeechSource {
    recognizer: Box<dyn Recognizer>,
    policy: RestartPolicy,
    generation: u64,
    running: bool,
    suppressed: bool,
    restart: Deadline,
}

impl SpeechSource {
    /// Wrap a recognizer
    #[must_use]
    pub fn new(recognizer: Box<dyn Recognizer>, policy: RestartPolicy) -> Self {
        Self {
            recognizer,
            policy,
            generation: 0,
            running: false,
            suppressed: false,
            restart: Deadline::new(),
        }
    }

    /// Begin recognition if not running and not suppressed
    pub fn start(&mut self) {
        if self.running || self.suppressed {
            return;
        }

        self.restart.cancel();
        self.generation += 1;
        let run = RunId(self.generation);

        match self.recognizer.start(run) {
            Ok(()) => {
                self.running = true;
                tracing::debug!(run = run.0, "speech source started");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to start recognition, retrying");
                self.restart.arm(self.policy.start_retry_delay);
            }
        }
    }

    /// End recognition if running; late events of the stopped run are discarded
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }

        self.running = false;
        self.generation += 1;
        self.recognizer.stop();
        tracing::debug!("speech source stopped");
    }

    /// Stop and hold the source stopped until [`resume`](Self::resume) or
    /// [`release`](Self::release)
    pub fn suppress(&mut self) {
        self.suppressed = true;
        self.restart.cancel();
        self.stop();
    }

    /// Lift suppression and start immediately
    pub fn resume(&mut self) {
        self.suppressed = false;
        self.start();
    }

    /// Lift suppression without forcing a start; the normal restart delay applies
    pub fn release(&mut self) {
        self.suppressed = false;
        if !self.running && !self.restart.is_armed() {
            self.restart.arm(self.policy.restart_delay);
        }
    }

    /// Filter and classify a recognizer event
    ///
    /// Returns `None` for events of stale runs and for transient errors.
    pub fn accept(&mut self, run: RunId, event: RecognitionEvent) -> Option<SourceSignal> {
        if run.0 != self.generation || !self.running {
            tracing::trace!(run = run.0, current = self.generation, ?event, "discarding stale recognizer event");
            return None;
        }

        match event {
            RecognitionEvent::Started => Some(SourceSignal::Started),
            RecognitionEvent::Fragment(fragment) => Some(SourceSignal::Fragment(fragment)),
            RecognitionEvent::Error(kind) if kind.is_transient() => {
                tracing::debug!(%kind, "transient recognition error ignored");
                None
            }
            RecognitionEvent::Error(kind) => {
                tracing::warn!(%kind, "recognition fault");
                if !self.suppressed {
                    self.restart.arm(self.policy.fault_retry_delay);
                }
                Some(SourceSignal::Fault(kind))
            }
            RecognitionEvent::Ended => {
                self.running = false;
                if !self.suppressed && !self.restart.is_armed() {
                    self.restart.arm(self.policy.restart_delay);
                }
                tracing::debug!(run = run.0, "recognition ended");
                Some(SourceSignal::Ended)
            }
        }
    }

    /// Wait for a scheduled restart
    pub async fn restart_due(&mut self) {
        self.restart.elapsed().await;
    }

    /// Whether recognition is running
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Whether restarts are suppressed
    #[must_use]
    pub const fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Whether a restart is scheduled
    #[must_use]
    pub const fn restart_pending(&self) -> bool {
        self.restart.is_armed()
    }

    /// Current run id
    #[must_use]
    pub const fn current_run(&self) -> RunId {
        RunId(self.generation)
    }
}
