//! Beacon Voice - turn-taking client for voice-driven AI agents
//!
//! This library provides the client side of a spoken conversation:
//! - Continuous speech recognition with restart and fault recovery
//! - Wake phrase detection and two-tier silence endpointing
//! - Utterance hand-off to a remote agent over WebSocket
//! - Reply playback gated on an explicit audio unlock
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  Collaborators                        │
//! │  Recognizer  │  Agent channel  │  Speakers  │ Console │
//! └────────────────────┬─────────────────────────────────┘
//!                      │ Event queue
//! ┌────────────────────▼─────────────────────────────────┐
//! │                 TurnController                        │
//! │  SpeechSource │ Wake word │ Endpointer │ Player       │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │                  Status surface                       │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod error;
pub mod event;
pub mod session;
pub mod status;
pub mod voice;

pub use agent::{
    AgentChannel, AgentReply, AgentRequest, ChannelFault, HttpSessionReset, SessionReset,
    WsAgentChannel,
};
pub use config::Config;
pub use controller::{Collaborators, TurnController};
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use event::{Event, EventQueue, EventSender, PlaybackId, RunId, event_queue};
pub use session::{Session, TurnState};
pub use status::{ConsoleStatus, Speaker, Status, StatusSink};
