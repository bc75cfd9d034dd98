//! Recognition capability
//!
//! A [`Recognizer`] runs continuous speech recognition and posts
//! [`RecognitionEvent`]s tagged with the run they belong to. The default
//! backend, [`CloudRecognizer`], captures the microphone, cuts it into speech
//! segments by energy, and sends each segment to a cloud STT API.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::capture::{AudioCapture, CaptureEvent, SAMPLE_RATE, samples_to_wav};
use super::segmenter::{SegmenterState, SpeechSegmenter};
use super::stt::SpeechToText;
use crate::event::{Event, EventSender, RunId};
use crate::{Error, Result};

/// How often a speech-activity heartbeat is posted while the user talks
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

/// One partial or final transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    /// Transcript text (may be blank for interim activity heartbeats)
    pub text: String,
    /// Whether the recognizer will not revise this text
    pub is_final: bool,
    /// Position of the fragment within its run
    pub sequence: u64,
}

impl TranscriptFragment {
    /// An interim (revisable) fragment
    #[must_use]
    pub fn interim(text: impl Into<String>, sequence: u64) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            sequence,
        }
    }

    /// A finalized fragment
    #[must_use]
    pub fn finalized(text: impl Into<String>, sequence: u64) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            sequence,
        }
    }

    /// Whether the text has no visible content
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Recognition error reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Nothing was said before the engine gave up
    NoSpeech,
    /// Network failure reaching the recognition service
    Network,
    /// Microphone access denied
    PermissionDenied,
    /// No usable microphone
    NoMicrophone,
    /// Anything else
    Other(String),
}

impl RecognitionErrorKind {
    /// Map an engine error code (`no-speech`, `network`, `not-allowed`, `audio-capture`)
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "network" => Self::Network,
            "not-allowed" | "service-not-allowed" => Self::PermissionDenied,
            "audio-capture" => Self::NoMicrophone,
            other => Self::Other(other.to_string()),
        }
    }

    /// Transient errors are ignored: no status, no retry
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NoSpeech)
    }

    /// Message for the status surface
    #[must_use]
    pub const fn status_message(&self) -> &'static str {
        match self {
            Self::NoSpeech => "No speech detected",
            Self::Network => "Network error - please check your connection",
            Self::PermissionDenied => "Microphone access denied",
            Self::NoMicrophone => "No microphone found",
            Self::Other(_) => "Speech recognition error",
        }
    }

    fn from_error(error: &Error) -> Self {
        match error {
            Error::Http(_) => Self::Network,
            Error::Stt(msg) if msg.contains(" 401") || msg.contains(" 403") => {
                Self::PermissionDenied
            }
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpeech => f.write_str("no-speech"),
            Self::Network => f.write_str("network"),
            Self::PermissionDenied => f.write_str("not-allowed"),
            Self::NoMicrophone => f.write_str("audio-capture"),
            Self::Other(code) => f.write_str(code),
        }
    }
}

/// Events emitted by a recognizer, in order per run:
/// `Started`, any number of `Fragment`, optional `Error`, `Ended`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// The run is live
    Started,
    /// A transcript fragment
    Fragment(TranscriptFragment),
    /// The engine reported an error
    Error(RecognitionErrorKind),
    /// The run is over
    Ended,
}

/// A continuous, interim-result-emitting recognition capability
pub trait Recognizer {
    /// Begin a recognition run; events must be tagged with `run`
    ///
    /// # Errors
    ///
    /// Returns error if the engine refuses to start
    fn start(&mut self, run: RunId) -> Result<()>;

    /// End the current run, if any
    fn stop(&mut self);
}

struct ActiveRun {
    run: RunId,
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Microphone + energy segmentation + cloud STT
pub struct CloudRecognizer {
    stt: SpeechToText,
    events: EventSender,
    active: Option<ActiveRun>,
}

impl CloudRecognizer {
    /// Create a recognizer posting into `events`
    #[must_use]
    pub const fn new(stt: SpeechToText, events: EventSender) -> Self {
        Self {
            stt,
            events,
            active: None,
        }
    }
}

impl Recognizer for CloudRecognizer {
    fn start(&mut self, run: RunId) -> Result<()> {
        self.stop();

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        std::thread::Builder::new()
            .name("beacon-capture".to_string())
            .spawn(move || capture_thread(&tx, &thread_stop))?;

        let task = tokio::spawn(recognize(run, rx, self.stt.clone(), self.events.clone()));

        tracing::debug!(run = run.0, "recognition run started");
        self.active = Some(ActiveRun { run, stop, task });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::Release);
            active.task.abort();
            self.events.send(Event::Recognition {
                run: active.run,
                event: RecognitionEvent::Ended,
            });
            tracing::debug!(run = active.run.0, "recognition run stopped");
        }
    }
}

impl Drop for CloudRecognizer {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::Release);
            active.task.abort();
        }
    }
}

/// Owns the cpal stream for the lifetime of a run
fn capture_thread(tx: &mpsc::UnboundedSender<CaptureEvent>, stop: &AtomicBool) {
    let mut capture = match AudioCapture::new() {
        Ok(capture) => capture,
        Err(e) => {
            let _ = tx.send(CaptureEvent::Failed(e.to_string()));
            return;
        }
    };

    if let Err(e) = capture.start(tx.clone()) {
        let _ = tx.send(CaptureEvent::Failed(e.to_string()));
        return;
    }

    while !stop.load(Ordering::Acquire) && !tx.is_closed() {
        std::thread::sleep(Duration::from_millis(50));
    }

    capture.stop();
}

async fn recognize(
    run: RunId,
    mut samples: mpsc::UnboundedReceiver<CaptureEvent>,
    stt: SpeechToText,
    events: EventSender,
) {
    let emit = |event| events.send(Event::Recognition { run, event });

    emit(RecognitionEvent::Started);

    let mut segmenter = SpeechSegmenter::new();
    let mut sequence = 0u64;
    let mut last_heartbeat: Option<Instant> = None;

    while let Some(captured) = samples.recv().await {
        let chunk = match captured {
            CaptureEvent::Samples(chunk) => chunk,
            CaptureEvent::Failed(reason) => {
                tracing::warn!(run = run.0, reason, "microphone capture failed");
                emit(RecognitionEvent::Error(RecognitionErrorKind::NoMicrophone));
                break;
            }
        };

        let Some(segment) = segmenter.process(&chunk) else {
            if segmenter.state() == SegmenterState::Speaking
                && last_heartbeat.is_none_or(|t| t.elapsed() >= HEARTBEAT_INTERVAL)
            {
                emit(RecognitionEvent::Fragment(TranscriptFragment::interim("", sequence)));
                sequence += 1;
                last_heartbeat = Some(Instant::now());
            }
            continue;
        };
        last_heartbeat = None;

        match transcribe_segment(&stt, &segment).await {
            Ok(text) if !text.trim().is_empty() => {
                emit(RecognitionEvent::Fragment(TranscriptFragment::finalized(
                    text.trim(),
                    sequence,
                )));
                sequence += 1;
            }
            Ok(_) => emit(RecognitionEvent::Error(RecognitionErrorKind::NoSpeech)),
            Err(e) => {
                tracing::warn!(run = run.0, error = %e, "segment transcription failed");
                emit(RecognitionEvent::Error(RecognitionErrorKind::from_error(&e)));
            }
        }
    }

    emit(RecognitionEvent::Ended);
}

async fn transcribe_segment(stt: &SpeechToText, segment: &[f32]) -> Result<String> {
    let wav = samples_to_wav(segment, SAMPLE_RATE)?;
    stt.transcribe(&wav).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(RecognitionErrorKind::from_code("no-speech"), RecognitionErrorKind::NoSpeech);
        assert_eq!(
            RecognitionErrorKind::from_code("not-allowed"),
            RecognitionErrorKind::PermissionDenied
        );
        assert_eq!(
            RecognitionErrorKind::from_code("audio-capture"),
            RecognitionErrorKind::NoMicrophone
        );
        assert_eq!(
            RecognitionErrorKind::from_code("aborted"),
            RecognitionErrorKind::Other("aborted".to_string())
        );
    }

    #[test]
    fn test_only_no_speech_is_transient() {
        assert!(RecognitionErrorKind::NoSpeech.is_transient());
        assert!(!RecognitionErrorKind::Network.is_transient());
        assert!(!RecognitionErrorKind::Other("x".into()).is_transient());
    }

    #[test]
    fn test_stt_auth_failure_maps_to_permission() {
        let err = Error::Stt("Whisper API error 401 Unauthorized: bad key".to_string());
        assert_eq!(
            RecognitionErrorKind::from_error(&err),
            RecognitionErrorKind::PermissionDenied
        );
    }
}
