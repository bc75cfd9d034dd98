//! Daemon - the voice client service
//!
//! Wires the default collaborators (microphone recognizer, WebSocket agent,
//! speakers, HTTP reset, console) to a [`TurnController`] and runs it.

use std::io::BufRead;
use std::sync::Arc;

use crate::agent::{HttpSessionReset, WsAgentChannel};
use crate::controller::{Collaborators, TurnController};
use crate::event::{Event, EventSender, event_queue};
use crate::status::ConsoleStatus;
use crate::voice::{AudioUnlockGate, CloudRecognizer, CpalSink, SpeechToText};
use crate::{Config, Result};

/// The voice client daemon
pub struct Daemon {
    config: Config,
    unlock_audio: bool,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// With `unlock_audio` set, reply audio is enabled without waiting for a
    /// console keypress.
    #[must_use]
    pub const fn new(config: Config, unlock_audio: bool) -> Self {
        Self {
            config,
            unlock_audio,
        }
    }

    /// Connect to the agent and run the turn controller until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if STT is not configured, the agent is unreachable, or
    /// there is no output device
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let (events, queue) = event_queue();

        let stt = SpeechToText::from_config(&self.config.stt)?;
        tracing::info!(provider = %self.config.stt.provider, model = %self.config.stt.model, "STT ready");

        let agent = WsAgentChannel::connect(&self.config.agent.url, events.clone()).await?;
        let sink = CpalSink::new()?;

        let parts = Collaborators {
            recognizer: Box::new(CloudRecognizer::new(stt, events.clone())),
            agent: Box::new(agent),
            sink: Arc::new(sink),
            reset: Arc::new(HttpSessionReset::new(&self.config.agent.reset_url)),
            status: Box::new(ConsoleStatus),
            gate: AudioUnlockGate::global().clone(),
        };

        if self.unlock_audio {
            events.send(Event::AudioUnlocked);
        } else {
            println!("Press Enter to enable voice responses. Type \"reset\" to start over, \"quit\" to exit.");
        }

        spawn_console(events.clone())?;
        spawn_ctrl_c(events.clone());

        let mut controller = TurnController::new(&self.config, parts, events, queue);
        controller.run().await;

        Ok(())
    }
}

/// Map a console line to a controller event beyond the audio unlock
fn console_event(line: &str) -> Option<Event> {
    match line.trim().to_lowercase().as_str() {
        "reset" => Some(Event::ResetRequested),
        "quit" | "exit" => Some(Event::Shutdown),
        _ => None,
    }
}

/// Read stdin on a dedicated thread; any line counts as the unlock gesture
fn spawn_console(events: EventSender) -> Result<()> {
    std::thread::Builder::new()
        .name("beacon-console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if events.is_closed() {
                    break;
                }

                events.send(Event::AudioUnlocked);
                if let Some(event) = console_event(&line) {
                    events.send(event);
                }
            }
            tracing::debug!("console closed");
        })?;
    Ok(())
}

fn spawn_ctrl_c(events: EventSender) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, shutting down");
            events.send(Event::Shutdown);
        }
    });
}
