//! Voice processing module
//!
//! Speech recognition lifecycle, wake phrase detection, silence endpointing
//! and reply playback. The turn controller (see `controller.rs`) ties them
//! together.

mod capture;
mod endpointer;
mod playback;
mod player;
mod recognizer;
mod segmenter;
mod source;
mod stt;
mod timer;
mod wake_word;

pub use capture::{AudioCapture, CaptureEvent, SAMPLE_RATE, samples_to_wav};
pub use endpointer::{SilenceEndpointer, SilenceTier};
pub use playback::{AudioClip, AudioSink, ClipLease, CpalSink, decode_payload};
pub use player::{AudioUnlockGate, ResponsePlayer};
pub use recognizer::{
    CloudRecognizer, RecognitionErrorKind, RecognitionEvent, Recognizer, TranscriptFragment,
};
pub use segmenter::{SegmenterState, SpeechSegmenter, calculate_energy};
pub use source::{RestartPolicy, SourceSignal, SpeechSource};
pub use stt::SpeechToText;
pub use timer::Deadline;
pub use wake_word::{
    DEFAULT_EXIT_PHRASES, DEFAULT_FAREWELL_PHRASES, DEFAULT_WAKE_PHRASES, PhraseSet,
    WakeWordDetector,
};
