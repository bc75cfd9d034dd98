//! The live conversation context

use std::fmt;

/// Turn-taking state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// Dormant, waiting for the wake phrase
    #[default]
    Idle,
    /// Capturing an utterance
    Active,
    /// Utterance sent, waiting for the reply
    Processing,
    /// Reply audio playing
    Speaking,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

/// Single conversation context, created once per process and never persisted
#[derive(Debug, Default)]
pub struct Session {
    /// Current state
    pub state: TurnState,
    utterance: Vec<String>,
    /// End the session once the current reply finishes playing
    pub pending_deactivation: bool,
}

impl Session {
    /// A fresh idle session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalized transcript
    pub fn push(&mut self, text: impl Into<String>) {
        self.utterance.push(text.into());
    }

    /// Finalized transcripts of the current turn, in arrival order
    #[must_use]
    pub fn utterance(&self) -> &[String] {
        &self.utterance
    }

    /// The buffered utterance as one string
    #[must_use]
    pub fn text(&self) -> String {
        self.utterance.join(" ")
    }

    /// Whether nothing has been buffered this turn
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.utterance.is_empty()
    }

    /// Take the buffered utterance, leaving the buffer empty
    pub fn take_text(&mut self) -> String {
        let text = self.text();
        self.utterance.clear();
        text
    }

    /// Clear the utterance buffer
    pub fn clear_utterance(&mut self) {
        self.utterance.clear();
    }

    /// Back to idle with nothing buffered
    pub fn reset(&mut self) {
        self.state = TurnState::Idle;
        self.utterance.clear();
        self.pending_deactivation = false;
    }
}
