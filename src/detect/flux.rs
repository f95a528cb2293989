use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

use super::framing::FrameLevels;
use super::{validate_input, DetectionEngine, DetectionParams, DetectionResult, OnsetEvent};
use crate::analysis::WindowFunction;
use crate::error::AnalysisError;
use crate::progress::{Progress, ProgressTicker};

/// Past frames feeding the adaptive threshold.
const MEDIAN_FRAMES: usize = 8;
/// Added to the threshold so near-silence never triggers.
const THRESHOLD_FLOOR: f32 = 0.01;
/// Minimum time between reported onsets.
const MIN_ONSET_GAP_SECS: f32 = 0.05;

/// What a frame-by-frame onset detector says about one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OnsetDecision {
    /// Value of the detector's own detection function for this frame.
    pub descriptor: f32,
    pub is_onset: bool,
}

/// A black-box streaming onset detector, fed one frame at a time.
pub trait OnsetDetector {
    fn process(&mut self, frame: &[f32]) -> OnsetDecision;
}

/// Builds a fresh detector for `(frame_size, sample_rate, threshold)`.
pub type DetectorFactory = dyn Fn(usize, u32, f32) -> Box<dyn OnsetDetector> + Send + Sync;

/// Causal spectral-flux onset detector with a moving median threshold.
pub struct FluxDetector {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    previous: Vec<f32>,
    history: VecDeque<f32>,
    multiplier: f32,
    min_gap: usize,
    since_onset: usize,
}

impl FluxDetector {
    pub fn new(frame_size: usize, sample_rate: u32, multiplier: f32) -> Self {
        let fft_size = frame_size.max(2).next_power_of_two();
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let min_gap = (MIN_ONSET_GAP_SECS * sample_rate as f32 / frame_size.max(1) as f32)
            .ceil()
            .max(1.0) as usize;
        Self {
            fft,
            window: WindowFunction::Hann.coefficients(frame_size.max(1)),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            previous: vec![0.0; fft_size / 2],
            history: VecDeque::with_capacity(MEDIAN_FRAMES),
            multiplier,
            min_gap,
            since_onset: min_gap,
        }
    }

    fn threshold(&self) -> f32 {
        if self.history.is_empty() {
            return THRESHOLD_FLOOR;
        }
        let mut sorted: Vec<f32> = self.history.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted[sorted.len() / 2] * self.multiplier + THRESHOLD_FLOOR
    }
}

impl OnsetDetector for FluxDetector {
    fn process(&mut self, frame: &[f32]) -> OnsetDecision {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = match (frame.get(i), self.window.get(i)) {
                (Some(&s), Some(&w)) => s * w,
                _ => 0.0,
            };
            *slot = Complex::new(sample, 0.0);
        }
        self.fft.process(&mut self.buffer);

        let bins = self.previous.len();
        let mut flux = 0.0f32;
        for (c, prev) in self.buffer[..bins].iter().zip(self.previous.iter_mut()) {
            let mag = c.norm();
            flux += (mag - *prev).max(0.0);
            *prev = mag;
        }
        let flux = flux / bins as f32;

        let is_onset = flux > self.threshold() && self.since_onset >= self.min_gap;
        if is_onset {
            self.since_onset = 0;
        } else {
            self.since_onset += 1;
        }

        if self.history.len() == MEDIAN_FRAMES {
            self.history.pop_front();
        }
        self.history.push_back(flux);

        OnsetDecision {
            descriptor: flux,
            is_onset,
        }
    }
}

/// Wraps an external frame-level onset detector and re-validates each of
/// its onsets against the level and level-change gate.
pub struct ExternalOnsetEngine {
    factory: Arc<DetectorFactory>,
}

impl ExternalOnsetEngine {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(usize, u32, f32) -> Box<dyn OnsetDetector> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl Default for ExternalOnsetEngine {
    fn default() -> Self {
        Self::new(|frame_size, sample_rate, multiplier| {
            Box::new(FluxDetector::new(frame_size, sample_rate, multiplier))
        })
    }
}

impl DetectionEngine for ExternalOnsetEngine {
    fn key(&self) -> &'static str {
        "spectral-flux"
    }

    fn description(&self) -> &'static str {
        "Streaming spectral-flux onset detector, level and dB-rise gated"
    }

    fn default_threshold(&self) -> f32 {
        1.5
    }

    fn detect(
        &self,
        samples: &[f32],
        sample_rate: u32,
        params: &DetectionParams,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<DetectionResult, AnalysisError> {
        validate_input(samples, sample_rate, params)?;
        let frames = FrameLevels::measure(samples, sample_rate, params.hop_size);
        let mut detector = (self.factory)(params.hop_size, sample_rate, self.threshold(params));

        let mut ticker = ProgressTicker::new(frames.len(), progress);
        let mut function = Vec::with_capacity(frames.len());
        let mut events = Vec::new();
        for (i, chunk) in samples.chunks(params.hop_size).enumerate() {
            let decision = detector.process(chunk);
            function.push(decision.descriptor);
            if decision.is_onset {
                if params.gate.admits(frames.db[i], frames.previous_db(i)) {
                    events.push(OnsetEvent {
                        time: frames.times[i],
                        strength: Some(decision.descriptor),
                    });
                } else {
                    log::trace!(
                        "Gated onset at {:.3}s ({:.1} dB, prev {:.1} dB)",
                        frames.times[i],
                        frames.db[i],
                        frames.previous_db(i)
                    );
                }
            }
            ticker.tick();
        }
        ticker.finish();

        Ok(DetectionResult {
            detection_function: function,
            times: frames.times,
            events,
        })
    }
}
