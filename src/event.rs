//! The single event queue feeding the turn controller
//!
//! Every collaborator (recognizer, agent channel, playback worker, console)
//! talks to the controller only by posting an [`Event`]. Timer fires are
//! produced by the controller's own loop and share the same enum so that one
//! transition function sees everything.

use tokio::sync::mpsc;

use crate::Result;
use crate::agent::{AgentReply, ChannelFault};
use crate::voice::{RecognitionEvent, SilenceTier};

/// Identifies one recognition run (start to end of the recognizer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RunId(pub u64);

/// Identifies one `ResponsePlayer::play` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaybackId(pub u64);

/// A typed message routed through `TurnController::handle`
#[derive(Debug)]
pub enum Event {
    /// Output of the recognizer for a given run
    Recognition {
        /// Run that produced the event
        run: RunId,
        /// The recognizer event
        event: RecognitionEvent,
    },
    /// Reply from the remote agent
    Reply(AgentReply),
    /// Agent channel failed (malformed frame, disconnect)
    ChannelFault(ChannelFault),
    /// Playback completed, successfully or not
    PlaybackFinished {
        /// The `play` call this completes
        playback: PlaybackId,
        /// Outcome of the playback
        result: Result<()>,
    },
    /// User gesture enabling audio output
    AudioUnlocked,
    /// User asked to reset the conversation
    ResetRequested,
    /// Reset endpoint answered
    ResetFinished(Result<()>),
    /// A silence timer fired
    Silence(SilenceTier),
    /// Recognizer restart delay elapsed
    RestartDue,
    /// No agent reply arrived in time
    ReplyTimeout,
    /// Stop the event loop
    Shutdown,
}

/// Cloneable handle for posting events
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Post an event; dropped silently once the controller has shut down
    pub fn send(&self, event: Event) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!(event = ?e.0, "event loop closed, dropping event");
        }
    }

    /// Whether the receiving side is gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving side of the event queue, owned by the controller
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventQueue {
    /// Wait for the next event
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take an already queued event without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected sender/queue pair
#[must_use]
pub fn event_queue() -> (EventSender, EventQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventQueue { rx })
}
