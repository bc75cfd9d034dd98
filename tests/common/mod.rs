//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use tokio::time::Instant;

use beacon_voice::voice::{
    AudioClip, AudioSink, AudioUnlockGate, RecognitionEvent, Recognizer, SAMPLE_RATE,
    TranscriptFragment, samples_to_wav,
};
use beacon_voice::{
    AgentChannel, AgentReply, Collaborators, Config, Error, Event, EventSender, Result, RunId,
    SessionReset, Speaker, Status, StatusSink, TurnController, event_queue,
};

/// Generate sine wave audio samples
pub fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
pub fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// A short base64 WAV reply payload
pub fn wav_payload() -> String {
    let wav = samples_to_wav(&generate_sine_samples(440.0, 0.1, 0.3), SAMPLE_RATE).unwrap();
    base64::engine::general_purpose::STANDARD.encode(wav)
}

/// Recognizer calls seen by [`FakeRecognizer`]
#[derive(Debug, Default)]
pub struct RecognizerLog {
    pub starts: Vec<RunId>,
    pub stops: usize,
}

/// Recognizer that only records lifecycle calls; tests post its events
pub struct FakeRecognizer(pub Arc<Mutex<RecognizerLog>>);

impl Recognizer for FakeRecognizer {
    fn start(&mut self, run: RunId) -> Result<()> {
        self.0.lock().unwrap().starts.push(run);
        Ok(())
    }

    fn stop(&mut self) {
        self.0.lock().unwrap().stops += 1;
    }
}

/// Agent channel recording every utterance
pub struct FakeAgent {
    pub sent: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

impl AgentChannel for FakeAgent {
    fn send_utterance(&mut self, text: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Channel("agent connection closed".to_string()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Status sink recording statuses and conversation lines
#[derive(Clone, Default)]
pub struct RecordingStatus {
    pub statuses: Arc<Mutex<Vec<Status>>>,
    pub messages: Arc<Mutex<Vec<(Speaker, String)>>>,
}

impl StatusSink for RecordingStatus {
    fn publish(&self, status: &Status) {
        self.statuses.lock().unwrap().push(status.clone());
    }

    fn message(&self, speaker: Speaker, text: &str) {
        self.messages.lock().unwrap().push((speaker, text.to_string()));
    }
}

/// Audio sink that returns immediately, recording each clip's sample rate
#[derive(Default)]
pub struct FakeSink {
    pub played: Mutex<Vec<u32>>,
    pub fail: bool,
}

impl AudioSink for FakeSink {
    fn play(&self, clip: &AudioClip) -> Result<()> {
        self.played.lock().unwrap().push(clip.sample_rate());
        if self.fail {
            return Err(Error::Playback("device unplugged".to_string()));
        }
        Ok(())
    }
}

/// Reset endpoint answering with a fixed outcome
pub struct FakeReset {
    pub ok: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl SessionReset for FakeReset {
    async fn reset(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.ok {
            Ok(())
        } else {
            Err(Error::Channel("reset rejected".to_string()))
        }
    }
}

/// Knobs for [`Harness::with`]
pub struct Options {
    pub config: Config,
    pub agent_fails: bool,
    pub sink_fails: bool,
    pub reset_ok: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config: Config::default(),
            agent_fails: false,
            sink_fails: false,
            reset_ok: true,
        }
    }
}

/// A controller wired to fakes, driven on tokio's paused clock
pub struct Harness {
    pub controller: TurnController,
    pub events: EventSender,
    pub recognizer: Arc<Mutex<RecognizerLog>>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub status: RecordingStatus,
    pub sink: Arc<FakeSink>,
    pub reset: Arc<FakeReset>,
    pub gate: AudioUnlockGate,
}

impl Harness {
    /// Default configuration, audio still locked, controller started
    pub fn new() -> Self {
        Self::with(Options::default())
    }

    /// Default configuration with audio unlocked
    pub async fn unlocked() -> Self {
        let mut harness = Self::new();
        harness.post(Event::AudioUnlocked);
        harness.settle().await;
        harness
    }

    pub fn with(options: Options) -> Self {
        let (events, queue) = event_queue();
        let recognizer = Arc::new(Mutex::new(RecognizerLog::default()));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let status = RecordingStatus::default();
        let sink = Arc::new(FakeSink {
            played: Mutex::new(Vec::new()),
            fail: options.sink_fails,
        });
        let reset = Arc::new(FakeReset {
            ok: options.reset_ok,
            calls: AtomicUsize::new(0),
        });
        let gate = AudioUnlockGate::new();

        let parts = Collaborators {
            recognizer: Box::new(FakeRecognizer(Arc::clone(&recognizer))),
            agent: Box::new(FakeAgent {
                sent: Arc::clone(&sent),
                fail: options.agent_fails,
            }),
            sink: sink.clone(),
            reset: reset.clone(),
            status: Box::new(status.clone()),
            gate: gate.clone(),
        };

        let mut controller = TurnController::new(&options.config, parts, events.clone(), queue);
        controller.start();

        Self {
            controller,
            events,
            recognizer,
            sent,
            status,
            sink,
            reset,
            gate,
        }
    }

    pub fn post(&self, event: Event) {
        self.events.send(event);
    }

    /// Post a recognizer event for the current run
    pub fn recognize(&self, event: RecognitionEvent) {
        let run = self.controller.source().current_run();
        self.post(Event::Recognition { run, event });
    }

    pub fn interim(&self, text: &str) {
        self.recognize(RecognitionEvent::Fragment(TranscriptFragment::interim(text, 0)));
    }

    pub fn final_text(&self, text: &str) {
        self.recognize(RecognitionEvent::Fragment(TranscriptFragment::finalized(text, 0)));
    }

    pub fn reply(&self, text: &str, audio: Option<String>) {
        self.post(Event::Reply(AgentReply {
            text: text.to_string(),
            audio,
        }));
    }

    /// Handle events and timer fires for `duration` of virtual time
    pub async fn advance(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while let Ok(Some(event)) =
            tokio::time::timeout_at(deadline, self.controller.next_event()).await
        {
            self.controller.handle(event);
        }
    }

    /// Let spawned work finish and handle everything already due
    pub async fn settle(&mut self) {
        self.advance(Duration::from_millis(1)).await;
    }

    /// Activate the session with an interim wake phrase
    pub async fn wake(&mut self) {
        self.interim("hello friday");
        self.settle().await;
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.status.statuses.lock().unwrap().clone()
    }

    pub fn last_status(&self) -> Option<Status> {
        self.statuses().last().cloned()
    }

    pub fn count_status(&self, wanted: &Status) -> usize {
        self.statuses().iter().filter(|s| *s == wanted).count()
    }

    pub fn starts(&self) -> usize {
        self.recognizer.lock().unwrap().starts.len()
    }

    /// Reply clips played (reply payloads are 16 kHz, the activation cue is not)
    pub fn replies_played(&self) -> usize {
        let played = self.sink.played.lock().unwrap();
        played.iter().filter(|rate| **rate == SAMPLE_RATE).count()
    }

    /// Activation cues played
    pub fn cues_played(&self) -> usize {
        let played = self.sink.played.lock().unwrap();
        played.iter().filter(|rate| **rate != SAMPLE_RATE).count()
    }

    pub fn buffer(&self) -> Vec<String> {
        self.controller.session().utterance().to_vec()
    }
}
