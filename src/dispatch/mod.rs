//! Playhead-driven light pulses.
//!
//! A host calls [`PlayheadDispatcher::on_tick`] from its playback timer.
//! Impulses the playhead crosses are mapped to a brightness and offered to a
//! [`DebouncedSink`], which forwards at most one command per debounce window
//! to the [`LightDevice`] without blocking the tick.

pub mod brightness;
pub mod device;
pub mod playhead;
pub mod sink;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use brightness::{BrightnessMapping, StrengthRange};
pub use device::{HttpLightDevice, LightDevice, LogDevice};
pub use playhead::{BandTrack, FiredImpulse, PlayheadState};
pub use sink::DebouncedSink;

/// Snapshot of the host's playback position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackClock {
    pub current_time: f32,
    pub is_playing: bool,
    pub total_duration: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Pulse {
    pub band: String,
    pub time: f32,
    pub strength: f32,
    pub brightness: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub debounce_ms: u64,
    pub pulse_duration_ms: u64,
    /// Minimum impulse strength that fires.
    pub threshold: f32,
    #[serde(flatten)]
    pub mapping: BrightnessMapping,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            pulse_duration_ms: 80,
            threshold: 2.0,
            mapping: BrightnessMapping::default(),
        }
    }
}

pub struct PlayheadDispatcher {
    state: PlayheadState,
    mapping: BrightnessMapping,
    threshold: f32,
    sink: DebouncedSink,
    view: Option<(f32, f32)>,
    was_playing: bool,
}

impl PlayheadDispatcher {
    pub fn new(config: &DispatchConfig, device: Arc<dyn LightDevice>) -> Self {
        let sink = DebouncedSink::new(
            device,
            Duration::from_millis(config.debounce_ms),
            Duration::from_millis(config.pulse_duration_ms),
        );
        Self {
            state: PlayheadState::new(),
            mapping: config.mapping,
            threshold: config.threshold,
            sink,
            view: None,
            was_playing: false,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Restrict brightness scaling to impulses within `[start, end]` seconds,
    /// e.g. the visible part of a zoomed waveform. `None` uses whole tracks.
    pub fn set_view(&mut self, view: Option<(f32, f32)>) {
        self.view = view;
    }

    pub fn state(&self) -> &PlayheadState {
        &self.state
    }

    /// Clear fired impulses and rewind, for a newly loaded file.
    pub fn reset(&mut self) {
        self.state.reset();
        self.was_playing = false;
    }

    pub fn on_tick(&mut self, clock: &PlaybackClock, tracks: &[BandTrack]) -> Vec<Pulse> {
        self.on_tick_at(clock, tracks, Instant::now())
    }

    /// Returns the pulses the sink accepted on this tick.
    ///
    /// The tick that stops playback still fires what playback covered up to
    /// the stop. After that the cursor follows the clock without firing, so
    /// scrubbing while paused never flashes the light.
    pub fn on_tick_at(&mut self, clock: &PlaybackClock, tracks: &[BandTrack], now: Instant) -> Vec<Pulse> {
        let stopping = self.was_playing && !clock.is_playing;
        self.was_playing = clock.is_playing;
        if !clock.is_playing && !stopping {
            self.state.seek(clock.current_time);
            return Vec::new();
        }

        let fired = self.state.advance(clock.current_time, tracks, self.threshold);
        if fired.is_empty() {
            return Vec::new();
        }

        let range = self
            .strength_range(tracks)
            .unwrap_or_else(|| StrengthRange::new(self.threshold, self.threshold));

        let mut accepted = Vec::new();
        for impulse in fired {
            let pulse = Pulse {
                brightness: self.mapping.map(impulse.strength, range),
                band: impulse.band,
                time: impulse.time,
                strength: impulse.strength,
            };
            if self.sink.offer(&pulse, now) {
                log::debug!(
                    "{} impulse at {:.3}s -> brightness {}",
                    pulse.band,
                    pulse.time,
                    pulse.brightness
                );
                accepted.push(pulse);
            }
        }
        accepted
    }

    fn strength_range(&self, tracks: &[BandTrack]) -> Option<StrengthRange> {
        let threshold = self.threshold;
        let view = self.view;
        StrengthRange::from_impulses(
            tracks
                .iter()
                .flat_map(|t| t.impulses.iter())
                .filter(|i| i.strength >= threshold)
                .filter(|i| view.map_or(true, |(start, end)| i.time >= start && i.time <= end)),
        )
    }
}
