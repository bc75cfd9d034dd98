//! Reply playback with a guaranteed completion signal
//!
//! Every [`ResponsePlayer::play`] call posts exactly one
//! [`Event::PlaybackFinished`]: immediately when the gate is locked, the
//! payload does not decode, or another reply is still playing; otherwise once
//! the sink returns or the device overruns its time budget.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::playback::{AudioClip, AudioSink, decode_payload};
use crate::event::{Event, EventSender, PlaybackId};
use crate::{Error, Result};

/// Activation tone frequency
const CUE_FREQUENCY: f32 = 800.0;

/// Activation tone length
const CUE_DURATION: Duration = Duration::from_millis(100);

/// Activation tone amplitude
const CUE_AMPLITUDE: f32 = 0.1;

static GLOBAL_GATE: OnceLock<AudioUnlockGate> = OnceLock::new();

/// One-way flag recording that the user enabled audio output
///
/// Starts locked, unlocks at most once and never re-locks. Clones share the
/// same flag.
#[derive(Debug, Clone, Default)]
pub struct AudioUnlockGate {
    unlocked: Arc<AtomicBool>,
}

impl AudioUnlockGate {
    /// A fresh, locked gate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide gate
    #[must_use]
    pub fn global() -> &'static Self {
        GLOBAL_GATE.get_or_init(Self::new)
    }

    /// Unlock the gate; returns true only for the call that flipped it
    pub fn unlock(&self) -> bool {
        let flipped = self
            .unlocked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if flipped {
            tracing::info!("audio output unlocked");
        }
        flipped
    }

    /// Whether audio output is enabled
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::Acquire)
    }
}

/// Plays agent replies one at a time
pub struct ResponsePlayer {
    sink: Arc<dyn AudioSink>,
    gate: AudioUnlockGate,
    events: EventSender,
    grace: Duration,
    next_id: u64,
    in_flight: Option<PlaybackId>,
    live_clips: Arc<AtomicUsize>,
}

impl ResponsePlayer {
    /// Create a player
    ///
    /// `grace` bounds how long past the clip's own length the device may take.
    #[must_use]
    pub fn new(
        sink: Arc<dyn AudioSink>,
        gate: AudioUnlockGate,
        events: EventSender,
        grace: Duration,
    ) -> Self {
        Self {
            sink,
            gate,
            events,
            grace,
            next_id: 0,
            in_flight: None,
            live_clips: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start playing a base64 audio payload
    ///
    /// The returned id matches the single `PlaybackFinished` event this call
    /// produces.
    pub fn play(&mut self, payload: &str) -> PlaybackId {
        self.next_id += 1;
        let id = PlaybackId(self.next_id);

        if let Some(current) = self.in_flight {
            tracing::warn!(playback = id.0, current = current.0, "playback already in flight");
            self.complete(id, Err(Error::Playback("another reply is still playing".to_string())));
            return id;
        }

        if !self.gate.is_unlocked() {
            tracing::warn!(playback = id.0, "audio locked, skipping reply audio");
            self.complete(id, Err(Error::AudioLocked));
            return id;
        }

        let clip = match decode_payload(payload) {
            Ok(clip) => clip.leased(&self.live_clips),
            Err(e) => {
                tracing::warn!(playback = id.0, error = %e, "reply audio did not decode");
                self.complete(id, Err(e));
                return id;
            }
        };

        self.in_flight = Some(id);
        let budget = clip.duration() + self.grace;
        tracing::debug!(
            playback = id.0,
            duration_ms = clip.duration().as_millis(),
            "playing reply audio"
        );

        let sink = Arc::clone(&self.sink);
        let events = self.events.clone();
        tokio::spawn(async move {
            let worker = tokio::task::spawn_blocking(move || {
                let result = sink.play(&clip);
                drop(clip);
                result
            });

            let result = match tokio::time::timeout(budget, worker).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(Error::Playback(format!("playback worker failed: {join}"))),
                Err(_) => Err(Error::Playback("playback timed out".to_string())),
            };

            events.send(Event::PlaybackFinished {
                playback: id,
                result,
            });
        });

        id
    }

    /// Mark a playback as finished; returns whether it was the one in flight
    pub fn finish(&mut self, id: PlaybackId) -> bool {
        if self.in_flight == Some(id) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    /// Play the short activation tone, if audio is unlocked and idle
    pub fn play_cue(&self) {
        if !self.gate.is_unlocked() || self.in_flight.is_some() {
            return;
        }

        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || {
            let tone = AudioClip::tone(CUE_FREQUENCY, CUE_DURATION, CUE_AMPLITUDE);
            if let Err(e) = sink.play(&tone) {
                tracing::debug!(error = %e, "activation cue failed");
            }
        });
    }

    /// Unlock the gate this player checks
    pub fn unlock(&self) -> bool {
        self.gate.unlock()
    }

    /// Id of the playback in flight
    #[must_use]
    pub const fn in_flight(&self) -> Option<PlaybackId> {
        self.in_flight
    }

    /// Number of decoded clips not yet released
    #[must_use]
    pub fn live_clips(&self) -> usize {
        self.live_clips.load(Ordering::Acquire)
    }

    fn complete(&self, id: PlaybackId, result: Result<()>) {
        self.events.send(Event::PlaybackFinished {
            playback: id,
            result,
        });
    }
}
