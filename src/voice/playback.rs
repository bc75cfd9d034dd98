//! Audio decoding and playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine as _;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, SupportedStreamConfigRange};

use crate::{Error, Result};

/// Sample rate used for generated tones
pub const TONE_SAMPLE_RATE: u32 = 24000;

/// Releases its slot in a live-clip counter when dropped
#[derive(Debug)]
pub struct ClipLease {
    live: Arc<AtomicUsize>,
}

impl ClipLease {
    /// Take a slot in `live`
    #[must_use]
    pub fn acquire(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self {
            live: Arc::clone(live),
        }
    }
}

impl Drop for ClipLease {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        tracing::trace!("decoded audio released");
    }
}

/// Decoded mono audio ready for a sink
#[derive(Debug)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
    lease: Option<ClipLease>,
}

impl AudioClip {
    /// Wrap mono samples
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            lease: None,
        }
    }

    /// A sine tone
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn tone(frequency: f32, duration: Duration, amplitude: f32) -> Self {
        let count = (duration.as_secs_f32() * TONE_SAMPLE_RATE as f32) as usize;
        let samples = (0..count)
            .map(|i| {
                let t = i as f32 / TONE_SAMPLE_RATE as f32;
                amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
            })
            .collect();
        Self::new(samples, TONE_SAMPLE_RATE)
    }

    /// Tie this clip to a live-clip counter
    #[must_use]
    pub fn leased(mut self, live: &Arc<AtomicUsize>) -> Self {
        self.lease = Some(ClipLease::acquire(live));
        self
    }

    /// Mono samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback length
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Decode a base64 audio payload (MP3, or WAV when it carries a RIFF header)
///
/// Whitespace inside the payload is ignored.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the payload is not base64, not decodable
/// audio, or contains no samples
pub fn decode_payload(payload: &str) -> Result<AudioClip> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Error::Decode(format!("invalid base64 payload: {e}")))?;

    let clip = if bytes.starts_with(b"RIFF") {
        decode_wav(&bytes)?
    } else {
        decode_mp3(&bytes)?
    };

    if clip.samples.is_empty() {
        return Err(Error::Decode("payload contains no audio".to_string()));
    }

    Ok(clip)
}

/// Decode WAV bytes to mono f32 samples
fn decode_wav(data: &[u8]) -> Result<AudioClip> {
    let mut reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::Decode(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = 2f32.powi(i32::from(spec.bits_per_sample) - 1);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Decode(e.to_string()))?
        }
    };

    Ok(AudioClip::new(downmix(&interleaved, channels), spec.sample_rate))
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(data: &[u8]) -> Result<AudioClip> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&pcm, frame.channels.max(1)));
            }
            // ID3 tags and junk between frames
            Err(minimp3::Error::SkippedData) => {}
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Decode(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(AudioClip::new(samples, sample_rate))
}

/// Average interleaved channels down to mono
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    #[allow(clippy::cast_precision_loss)]
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Blocking audio output
pub trait AudioSink: Send + Sync {
    /// Play a clip to completion
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot play the clip
    fn play(&self, clip: &AudioClip) -> Result<()>;
}

/// Plays clips on the default output device
#[derive(Debug, Default)]
pub struct CpalSink;

impl CpalSink {
    /// Check that an output device exists
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(device = device.name().unwrap_or_default(), "audio playback initialized");
        Ok(Self)
    }
}

fn supports_rate(c: &SupportedStreamConfigRange, channels: u16, rate: u32) -> bool {
    c.channels() == channels
        && c.min_sample_rate() <= SampleRate(rate)
        && c.max_sample_rate() >= SampleRate(rate)
}

impl AudioSink for CpalSink {
    fn play(&self, clip: &AudioClip) -> Result<()> {
        if clip.samples.is_empty() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device".to_string()))?;

        let rate = clip.sample_rate;
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Playback(e.to_string()))?
            .find(|c| supports_rate(c, 1, rate))
            .or_else(|| {
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports_rate(c, 2, rate))
            })
            .ok_or_else(|| Error::Playback(format!("no output config for {rate} Hz")))?;

        let config = supported.with_sample_rate(SampleRate(rate)).config();
        let channels = usize::from(config.channels);

        let samples: Arc<[f32]> = Arc::from(clip.samples.as_slice());
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let pos = position.load(Ordering::Relaxed);
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Release);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                position.store(pos + 1, Ordering::Relaxed);
                            }
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Playback(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        let limit = clip.duration() + Duration::from_millis(500);
        let start = std::time::Instant::now();
        while !finished.load(Ordering::Acquire) {
            if start.elapsed() > limit {
                return Err(Error::Playback("output device stalled".to_string()));
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = samples.len(), sample_rate = rate, "playback complete");
        Ok(())
    }
}
