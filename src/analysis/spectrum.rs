use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::audio::SampleBuffer;
use crate::error::AnalysisError;
use crate::progress::{Progress, ProgressTicker, PROGRESS_INTERVAL};

/// Taper applied to each window before the FFT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowFunction {
    #[default]
    Hann,
    Rectangular,
}

impl WindowFunction {
    pub fn coefficients(self, size: usize) -> Vec<f32> {
        match self {
            WindowFunction::Hann => hann_window(size),
            WindowFunction::Rectangular => vec![1.0; size],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// FFT window length; a power of two.
    pub window_size: usize,
    /// Stride between windows, at most `window_size`.
    pub hop_size: usize,
    pub window: WindowFunction,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            hop_size: 512,
            window: WindowFunction::Hann,
        }
    }
}

/// Magnitude spectra, one per hop, in chronological order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SpectralSequence {
    /// `frames[i]` holds `window_size / 2` linear magnitudes.
    pub frames: Vec<Vec<f32>>,
    pub window_size: usize,
    pub hop_size: usize,
    pub sample_rate: u32,
}

impl SpectralSequence {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn bin_count(&self) -> usize {
        self.window_size / 2
    }

    /// Seconds per frame.
    pub fn frame_period(&self) -> f32 {
        self.hop_size as f32 / self.sample_rate as f32
    }

    pub fn time_of(&self, frame: usize) -> f32 {
        frame as f32 * self.frame_period()
    }

    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.window_size as f32
    }

    /// Nearest kept bin to `freq_hz`.
    pub fn nearest_bin(&self, freq_hz: f32) -> usize {
        let bins = self.bin_count();
        if bins == 0 {
            return 0;
        }
        let exact = freq_hz.max(0.0) * self.window_size as f32 / self.sample_rate as f32;
        (exact.round() as usize).min(bins - 1)
    }
}

/// Number of full windows that fit: `floor((len - window) / hop) + 1`.
pub fn frame_count(len: usize, window_size: usize, hop_size: usize) -> usize {
    if hop_size == 0 || len < window_size {
        0
    } else {
        (len - window_size) / hop_size + 1
    }
}

pub fn validate_window(window_size: usize, hop_size: usize) -> Result<(), AnalysisError> {
    if window_size < 2 || !window_size.is_power_of_two() {
        return Err(AnalysisError::WindowNotPowerOfTwo(window_size));
    }
    if hop_size == 0 || hop_size > window_size {
        return Err(AnalysisError::InvalidHop {
            hop: hop_size,
            window: window_size,
        });
    }
    Ok(())
}

/// Slide a `window_size` window across the buffer in `hop_size` steps and
/// keep the first half of each FFT's magnitudes.
///
/// A trailing partial window is dropped. Frames are computed in parallel,
/// one chunk of [`PROGRESS_INTERVAL`] frames at a time, with a progress
/// checkpoint after every chunk.
pub fn analyze(
    buffer: &SampleBuffer,
    window_size: usize,
    hop_size: usize,
    window: WindowFunction,
    progress: &mut dyn FnMut(Progress),
) -> Result<SpectralSequence, AnalysisError> {
    validate_window(window_size, hop_size)?;
    if buffer.is_empty() {
        return Err(AnalysisError::EmptyBuffer);
    }
    if buffer.sample_rate() == 0 {
        return Err(AnalysisError::ZeroSampleRate);
    }

    let samples = buffer.samples();
    let total = frame_count(samples.len(), window_size, hop_size);
    let half = window_size / 2;
    let coefficients = window.coefficients(window_size);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(window_size);

    log::debug!(
        "Spectral analysis: {} frames (window={}, hop={}, {:?})",
        total,
        window_size,
        hop_size,
        window
    );

    let mut ticker = ProgressTicker::new(total, progress);
    let mut frames: Vec<Vec<f32>> = Vec::with_capacity(total);

    let mut chunk_start = 0;
    while chunk_start < total {
        let chunk_end = (chunk_start + PROGRESS_INTERVAL).min(total);
        let chunk: Vec<Vec<f32>> = (chunk_start..chunk_end)
            .into_par_iter()
            .map(|frame_idx| {
                let start = frame_idx * hop_size;
                let mut fft_input: Vec<Complex<f32>> = samples[start..start + window_size]
                    .iter()
                    .zip(coefficients.iter())
                    .map(|(&s, &w)| Complex::new(s * w, 0.0))
                    .collect();
                fft.process(&mut fft_input);
                fft_input[..half].iter().map(|c| c.norm()).collect()
            })
            .collect();
        frames.extend(chunk);
        ticker.advance(chunk_end - chunk_start);
        chunk_start = chunk_end;
    }
    ticker.finish();

    Ok(SpectralSequence {
        frames,
        window_size,
        hop_size,
        sample_rate: buffer.sample_rate(),
    })
}

fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
