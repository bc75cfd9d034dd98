//! Turn-taking state machine
//!
//! [`TurnController`] owns every piece of mutable conversation state. All
//! input arrives as an [`Event`] on one queue, and timer fires are merged into
//! the same stream by [`TurnController::next_event`], so [`TurnController::handle`]
//! is the only place the session changes.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::{AgentChannel, AgentReply, ChannelFault, SessionReset};
use crate::config::Config;
use crate::event::{Event, EventQueue, EventSender, PlaybackId};
use crate::session::{Session, TurnState};
use crate::status::{Speaker, Status, StatusSink};
use crate::voice::{
    AudioSink, AudioUnlockGate, Deadline, PhraseSet, RecognitionErrorKind, Recognizer,
    ResponsePlayer, RestartPolicy, SilenceEndpointer, SilenceTier, SourceSignal, SpeechSource,
    TranscriptFragment, WakeWordDetector,
};
use crate::{Error, Result};

/// Utterance sent when the user speaks an exit phrase
const EXIT_UTTERANCE: &str = "goodbye";

/// External capabilities the controller drives
pub struct Collaborators {
    /// Speech recognition backend
    pub recognizer: Box<dyn Recognizer>,
    /// Outbound agent channel
    pub agent: Box<dyn AgentChannel>,
    /// Audio output device
    pub sink: Arc<dyn AudioSink>,
    /// Conversation reset endpoint
    pub reset: Arc<dyn SessionReset>,
    /// Status surface
    pub status: Box<dyn StatusSink>,
    /// Audio unlock gate
    pub gate: AudioUnlockGate,
}

/// The turn-taking controller
pub struct TurnController {
    session: Session,
    source: SpeechSource,
    wake: WakeWordDetector,
    exit_phrases: PhraseSet,
    farewell_phrases: PhraseSet,
    match_interim: bool,
    strip_echo: bool,
    wake_phrase: String,
    endpointer: SilenceEndpointer,
    player: ResponsePlayer,
    agent: Box<dyn AgentChannel>,
    reset: Arc<dyn SessionReset>,
    status: Box<dyn StatusSink>,
    events: EventSender,
    queue: EventQueue,
    reply_deadline: Deadline,
    reply_timeout: Duration,
    playback: Option<PlaybackId>,
    wake_echo: bool,
    reset_pending: bool,
    stopped: bool,
}

impl TurnController {
    /// Build a controller from configuration and collaborators
    ///
    /// `events` must be the sender paired with `queue`; collaborators that
    /// post events should hold clones of it.
    #[must_use]
    pub fn new(
        config: &Config,
        parts: Collaborators,
        events: EventSender,
        queue: EventQueue,
    ) -> Self {
        let timing = &config.timing;
        let player = ResponsePlayer::new(
            parts.sink,
            parts.gate,
            events.clone(),
            timing.playback_grace,
        );

        Self {
            session: Session::new(),
            source: SpeechSource::new(parts.recognizer, RestartPolicy::from(timing)),
            wake: WakeWordDetector::new(PhraseSet::new(&config.wake.phrases)),
            exit_phrases: PhraseSet::new(&config.turn.exit_phrases),
            farewell_phrases: PhraseSet::new(&config.turn.farewell_phrases),
            match_interim: config.wake.match_interim,
            strip_echo: config.wake.strip_echo,
            wake_phrase: config.primary_wake_phrase().to_string(),
            endpointer: SilenceEndpointer::new(timing.utterance_timeout, timing.session_timeout),
            player,
            agent: parts.agent,
            reset: parts.reset,
            status: parts.status,
            events,
            queue,
            reply_deadline: Deadline::new(),
            reply_timeout: timing.reply_timeout,
            playback: None,
            wake_echo: false,
            reset_pending: false,
            stopped: false,
        }
    }

    /// Start listening for the wake phrase
    pub fn start(&mut self) {
        self.publish(&self.idle_status());
        self.source.start();
    }

    /// Run until [`Event::Shutdown`]
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self) {
        self.start();

        while !self.stopped {
            let Some(event) = self.next_event().await else {
                break;
            };
            self.handle(event);
        }

        tracing::info!("turn controller stopped");
    }

    /// Wait for the next queued event or timer fire
    ///
    /// Queued events win over timers that are due at the same time.
    #[allow(clippy::future_not_send)]
    pub async fn next_event(&mut self) -> Option<Event> {
        tokio::select! {
            biased;
            event = self.queue.recv() => event,
            tier = self.endpointer.fired() => Some(Event::Silence(tier)),
            () = self.source.restart_due() => Some(Event::RestartDue),
            () = self.reply_deadline.elapsed() => Some(Event::ReplyTimeout),
        }
    }

    /// Apply one event to the session
    pub fn handle(&mut self, event: Event) {
        tracing::trace!(state = %self.session.state, ?event, "handling event");

        match event {
            Event::Recognition { run, event } => {
                if let Some(signal) = self.source.accept(run, event) {
                    self.on_source(signal);
                }
            }
            Event::Reply(reply) => self.on_reply(reply),
            Event::ChannelFault(fault) => self.on_channel_fault(&fault),
            Event::PlaybackFinished { playback, result } => {
                self.on_playback_finished(playback, result);
            }
            Event::AudioUnlocked => {
                if self.player.unlock() {
                    self.publish(&Status::VoiceEnabled);
                }
            }
            Event::ResetRequested => self.request_reset(),
            Event::ResetFinished(result) => self.on_reset_finished(result),
            Event::Silence(tier) => self.on_silence(tier),
            Event::RestartDue => self.source.start(),
            Event::ReplyTimeout => self.on_reply_timeout(),
            Event::Shutdown => self.shutdown(),
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.session.state
    }

    /// The live session
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The speech source
    #[must_use]
    pub const fn source(&self) -> &SpeechSource {
        &self.source
    }

    /// The reply player
    #[must_use]
    pub const fn player(&self) -> &ResponsePlayer {
        &self.player
    }

    /// Armed silence tier, if any
    #[must_use]
    pub const fn silence_armed(&self) -> Option<SilenceTier> {
        self.endpointer.armed()
    }

    /// Whether a reply is being waited for
    #[must_use]
    pub const fn awaiting_reply(&self) -> bool {
        self.reply_deadline.is_armed()
    }

    /// Whether the loop has been told to stop
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// A sender for this controller's queue
    #[must_use]
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    fn on_source(&mut self, signal: SourceSignal) {
        match signal {
            SourceSignal::Started => {
                tracing::debug!(state = %self.session.state, "listening");
            }
            SourceSignal::Fragment(fragment) => self.on_fragment(fragment),
            SourceSignal::Fault(kind) => self.on_recognition_fault(kind),
            SourceSignal::Ended => {
                if self.session.state == TurnState::Active && !self.session.is_empty() {
                    tracing::debug!("recognizer ended mid-turn, flushing utterance");
                    let text = self.session.take_text();
                    self.send_turn(&text, &text);
                }
            }
        }
    }

    fn on_fragment(&mut self, fragment: TranscriptFragment) {
        match self.session.state {
            TurnState::Idle => self.on_idle_fragment(&fragment),
            TurnState::Active => self.on_active_fragment(&fragment),
            TurnState::Processing | TurnState::Speaking => {
                tracing::trace!(
                    state = %self.session.state,
                    text = fragment.text,
                    "fragment outside a turn discarded"
                );
            }
        }
    }

    fn on_idle_fragment(&mut self, fragment: &TranscriptFragment) {
        if !fragment.is_final && !self.match_interim {
            return;
        }

        if self.wake.detect(&fragment.text, false) {
            self.activate(!fragment.is_final);
        }
    }

    fn on_active_fragment(&mut self, fragment: &TranscriptFragment) {
        // Blank fragments are speech-activity heartbeats
        self.endpointer.arm_utterance();
        if fragment.is_blank() {
            return;
        }

        let text = self.strip_wake_echo(fragment);

        if !fragment.is_final {
            let heard = [self.session.text(), text]
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if !heard.is_empty() {
                self.publish(&Status::Heard(heard));
            }
            return;
        }

        self.wake_echo = false;
        if text.is_empty() {
            return;
        }

        if let Some(phrase) = self.exit_phrases.find(&text) {
            tracing::info!(exit_phrase = phrase, "exit phrase heard");
            self.session.push(text);
            let heard = self.session.take_text();
            self.send_turn(&heard, EXIT_UTTERANCE);
            return;
        }

        self.session.push(text);
        self.publish(&Status::Heard(self.session.text()));
    }

    /// Drop the wake phrase the recognizer repeats right after an interim activation
    fn strip_wake_echo(&self, fragment: &TranscriptFragment) -> String {
        let text = fragment.text.trim();
        if self.wake_echo
            && self.session.is_empty()
            && let Some(rest) = self.wake.strip(text)
        {
            return rest;
        }
        text.to_string()
    }

    fn activate(&mut self, from_interim: bool) {
        self.session.clear_utterance();
        self.session.pending_deactivation = false;
        self.session.state = TurnState::Active;
        self.wake_echo = from_interim && self.strip_echo;
        self.endpointer.arm_utterance();
        self.player.play_cue();
        tracing::info!("session activated");
        self.publish(&Status::Listening);
    }

    fn on_silence(&mut self, tier: SilenceTier) {
        if self.session.state != TurnState::Active {
            tracing::trace!(state = %self.session.state, ?tier, "stale silence timer ignored");
            return;
        }

        match tier {
            SilenceTier::Utterance if self.session.is_empty() => {
                self.publish(&Status::StillListening);
                self.endpointer.arm_session();
            }
            SilenceTier::Utterance => {
                let text = self.session.take_text();
                self.send_turn(&text, &text);
            }
            SilenceTier::Session => {
                tracing::info!("session ended after silence");
                let phrase = self.wake_phrase.clone();
                self.go_idle(&Status::SessionEnded { phrase });
            }
        }
    }

    /// Close the turn: log what was heard and send `utterance` to the agent
    fn send_turn(&mut self, heard: &str, utterance: &str) {
        self.endpointer.cancel();
        self.session.clear_utterance();
        self.session.state = TurnState::Processing;
        self.wake_echo = false;
        self.status.message(Speaker::User, heard);

        match self.agent.send_utterance(utterance) {
            Ok(()) => {
                tracing::info!(utterance, "utterance sent");
                self.reply_deadline.arm(self.reply_timeout);
                self.publish(&Status::Thinking);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to send utterance");
                self.publish(&Status::Fault(e.status_message()));
                self.resume_listening();
            }
        }
    }

    fn on_reply(&mut self, reply: AgentReply) {
        if self.session.state != TurnState::Processing {
            tracing::debug!(state = %self.session.state, "late agent reply discarded");
            return;
        }

        self.reply_deadline.cancel();
        self.status.message(Speaker::Assistant, &reply.text);
        let farewell = self.farewell_phrases.matches(&reply.text);

        if let Some(audio) = reply.audio_payload() {
            self.session.pending_deactivation = farewell;
            self.session.state = TurnState::Speaking;
            self.source.suppress();
            self.publish(&Status::Speaking);
            self.playback = Some(self.player.play(audio));
        } else if farewell {
            tracing::info!("farewell reply without audio, ending session");
            self.go_idle(&self.idle_status());
        } else {
            tracing::debug!("reply without audio, resuming listening");
            self.resume_listening();
        }
    }

    fn on_playback_finished(&mut self, id: PlaybackId, result: Result<()>) {
        let was_playing = self.player.finish(id);

        if self.session.state != TurnState::Speaking || self.playback != Some(id) {
            tracing::debug!(playback = id.0, "stale playback completion ignored");
            // A reset abandoned this reply; the source waited for the audio to stop
            if was_playing && self.playback.is_none() {
                self.source.resume();
            }
            return;
        }
        self.playback = None;

        if let Err(e) = result {
            tracing::warn!(error = %e, "reply playback failed");
            self.publish(&Status::Fault(e.status_message()));
        }

        if self.session.pending_deactivation {
            tracing::info!("farewell played, ending session");
            self.go_idle(&self.idle_status());
            self.source.release();
        } else {
            self.resume_listening();
        }
    }

    fn on_reply_timeout(&mut self) {
        if self.session.state != TurnState::Processing {
            return;
        }

        tracing::warn!(timeout_ms = self.reply_timeout.as_millis(), "no reply from agent");
        let error = Error::Channel("reply timed out".to_string());
        self.publish(&Status::Fault(error.status_message()));
        self.resume_listening();
    }

    fn on_channel_fault(&mut self, fault: &ChannelFault) {
        tracing::warn!(%fault, state = %self.session.state, "agent channel fault");
        match fault {
            ChannelFault::Disconnected => self.publish(&Status::Disconnected),
            ChannelFault::Malformed(_) => {
                let error = Error::Channel(fault.to_string());
                self.publish(&Status::Fault(error.status_message()));
            }
        }

        if self.session.state == TurnState::Processing {
            self.resume_listening();
        }
    }

    fn on_recognition_fault(&mut self, kind: RecognitionErrorKind) {
        let error = Error::Recognition(kind);
        self.publish(&Status::Fault(error.status_message()));
    }

    fn request_reset(&mut self) {
        if self.reset_pending {
            tracing::debug!("reset already in flight");
            return;
        }
        self.reset_pending = true;

        let reset = Arc::clone(&self.reset);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = reset.reset().await;
            events.send(Event::ResetFinished(result));
        });
    }

    fn on_reset_finished(&mut self, result: Result<()>) {
        self.reset_pending = false;

        match result {
            Ok(()) => {
                tracing::info!(state = %self.session.state, "conversation reset");
                self.playback = None;
                self.wake_echo = false;
                self.go_idle(&Status::ConversationReset);
                if self.player.in_flight().is_none() {
                    self.source.resume();
                } else {
                    tracing::debug!("reply audio still playing, source stays paused");
                }
                self.publish(&self.idle_status());
            }
            Err(e) => {
                tracing::warn!(error = %e, "conversation reset failed");
                self.publish(&Status::Fault("Reset failed".to_string()));
            }
        }
    }

    /// Back to capturing a new turn
    fn resume_listening(&mut self) {
        self.reply_deadline.cancel();
        self.session.clear_utterance();
        self.session.pending_deactivation = false;
        self.session.state = TurnState::Active;
        self.endpointer.arm_utterance();
        self.source.resume();
        self.publish(&Status::Listening);
    }

    fn go_idle(&mut self, status: &Status) {
        self.endpointer.cancel();
        self.reply_deadline.cancel();
        self.session.reset();
        self.publish(status);
    }

    fn shutdown(&mut self) {
        self.stopped = true;
        self.endpointer.cancel();
        self.reply_deadline.cancel();
        self.source.stop();
    }

    fn idle_status(&self) -> Status {
        Status::AwaitingWakePhrase {
            phrase: self.wake_phrase.clone(),
        }
    }

    fn publish(&self, status: &Status) {
        tracing::debug!(state = %self.session.state, %status, "status");
        self.status.publish(status);
    }
}
