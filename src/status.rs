//! Status surface
//!
//! The controller reports a [`Status`] at every transition point and logs the
//! conversation itself through [`StatusSink::message`]. Wording lives here;
//! when a status is emitted is the controller's business.

use std::fmt;

/// Human-readable state of the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Dormant, waiting for the wake phrase
    AwaitingWakePhrase {
        /// Phrase to suggest to the user
        phrase: String,
    },
    /// Capturing an utterance
    Listening,
    /// Text heard so far in the current turn
    Heard(String),
    /// Short silence elapsed with nothing said
    StillListening,
    /// Utterance sent, waiting for the agent
    Thinking,
    /// Reply audio playing
    Speaking,
    /// Long silence ended the session
    SessionEnded {
        /// Phrase to suggest to the user
        phrase: String,
    },
    /// Reset confirmed by the agent
    ConversationReset,
    /// Audio output enabled
    VoiceEnabled,
    /// Agent connection lost
    Disconnected,
    /// A recoverable fault
    Fault(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingWakePhrase { phrase } => write!(f, "Say \"{phrase}\" to activate"),
            Self::Listening => f.write_str("Listening..."),
            Self::Heard(text) => write!(f, "\"{text}\""),
            Self::StillListening => f.write_str("Still listening... speak anytime"),
            Self::Thinking => f.write_str("Thinking..."),
            Self::Speaking => f.write_str("Speaking..."),
            Self::SessionEnded { phrase } => {
                write!(f, "Session ended. Say \"{phrase}\" to activate")
            }
            Self::ConversationReset => f.write_str("Conversation reset"),
            Self::VoiceEnabled => f.write_str("Voice responses enabled"),
            Self::Disconnected => f.write_str("Disconnected"),
            Self::Fault(message) => f.write_str(message),
        }
    }
}

impl Status {
    /// Whether this status reports a fault
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_) | Self::Disconnected)
    }
}

/// Who said a conversation line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// The person talking to the agent
    User,
    /// The remote agent
    Assistant,
}

/// Receives status updates and conversation lines
pub trait StatusSink {
    /// A status transition
    fn publish(&self, status: &Status);

    /// A conversation line
    fn message(&self, _speaker: Speaker, _text: &str) {}
}

/// Prints status to the terminal
#[derive(Debug, Default)]
pub struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn publish(&self, status: &Status) {
        if status.is_fault() {
            tracing::warn!(%status, "status");
        } else {
            tracing::debug!(%status, "status");
        }
        println!("[{status}]");
    }

    fn message(&self, speaker: Speaker, text: &str) {
        match speaker {
            Speaker::User => println!("you: {text}"),
            Speaker::Assistant => println!("assistant: {text}"),
        }
    }
}
