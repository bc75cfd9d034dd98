//! Energy-based speech segmentation
//!
//! Splits the microphone stream into utterance-sized segments for cloud STT:
//! a segment opens when RMS energy crosses the threshold and closes after a
//! run of silence, provided enough speech was heard.

use super::capture::SAMPLE_RATE;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to emit a segment (0.3 s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Silence duration that closes a segment (0.5 s at 16kHz)
const SILENCE_SAMPLES: usize = 8000;

/// Longest segment before it is force-closed (15 s)
const MAX_SEGMENT_SAMPLES: usize = SAMPLE_RATE as usize * 15;

/// State of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech
    Idle,
    /// Speech detected, accumulating a segment
    Speaking,
}

/// Accumulates speech segments from raw samples
#[derive(Debug)]
pub struct SpeechSegmenter {
    state: SegmenterState,
    buffer: Vec<f32>,
    silence_counter: usize,
}

impl SpeechSegmenter {
    /// Create an idle segmenter
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SegmenterState::Idle,
            buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Feed samples; returns a completed segment when speech is followed by silence
    pub fn process(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected");
                }
                None
            }
            SegmenterState::Speaking => {
                self.buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                let closed_by_silence = self.silence_counter > SILENCE_SAMPLES;
                if closed_by_silence && self.buffer.len() > MIN_SPEECH_SAMPLES + self.silence_counter {
                    tracing::debug!(samples = self.buffer.len(), "speech segment complete");
                    return Some(self.take());
                }

                if self.buffer.len() >= MAX_SEGMENT_SAMPLES {
                    tracing::debug!(samples = self.buffer.len(), "speech segment force-closed");
                    return Some(self.take());
                }

                // Too much silence without enough speech: a click, not a word
                if closed_by_silence {
                    tracing::trace!("discarding short noise burst");
                    self.reset();
                }

                None
            }
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    /// Reset to idle, dropping any partial segment
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.buffer.clear();
        self.silence_counter = 0;
    }

    fn take(&mut self) -> Vec<f32> {
        let segment = std::mem::take(&mut self.buffer);
        self.reset();
        segment
    }
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_calculation() {
        let silence = vec![0.0f32; 100];
        assert!(calculate_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(calculate_energy(&loud) > 0.4);

        assert!(calculate_energy(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_short_burst_is_discarded() {
        let mut segmenter = SpeechSegmenter::new();
        assert!(segmenter.process(&vec![0.5f32; 800]).is_none());
        assert_eq!(segmenter.state(), SegmenterState::Speaking);

        assert!(segmenter.process(&vec![0.0f32; 9000]).is_none());
        assert_eq!(segmenter.state(), SegmenterState::Idle);
    }
}
