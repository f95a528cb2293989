use serde::{Deserialize, Serialize};

use super::derivative::{derivative, DerivativeMode};
use super::impulse::{find_impulses, impulse_strength, Impulse, ImpulseConfig};
use super::spectrum::SpectralSequence;

/// A named slice of the spectrum tracked on its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandDescriptor {
    pub name: String,
    /// Representative frequency in Hz.
    pub frequency: f32,
    /// Display color as `#rrggbb`.
    pub color: String,
}

impl BandDescriptor {
    pub fn new(name: &str, frequency: f32, color: &str) -> Self {
        Self {
            name: name.to_string(),
            frequency,
            color: color.to_string(),
        }
    }
}

/// The fixed band catalog. Consumers address bands by index, so the order
/// never changes.
pub fn default_catalog() -> Vec<BandDescriptor> {
    vec![
        BandDescriptor::new("Bass", 60.0, "#e5484d"),
        BandDescriptor::new("Low-Mid", 250.0, "#f76b15"),
        BandDescriptor::new("Mid", 1000.0, "#ffc53d"),
        BandDescriptor::new("Treble", 4000.0, "#46a758"),
        BandDescriptor::new("High-Treble", 10000.0, "#3e63dd"),
    ]
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposeConfig {
    pub derivative_mode: DerivativeMode,
    /// `k` in frames.
    pub derivative_window: usize,
    pub impulse: ImpulseConfig,
}

impl Default for DecomposeConfig {
    fn default() -> Self {
        Self {
            derivative_mode: DerivativeMode::Centered,
            derivative_window: 2,
            impulse: ImpulseConfig::default(),
        }
    }
}

/// Per-band time series, all indexed by spectral frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BandSeries {
    pub band: BandDescriptor,
    /// Spectral bin the band reads from.
    pub bin: usize,
    pub times: Vec<f32>,
    pub magnitude: Vec<f32>,
    pub derivative: Vec<f32>,
    pub second_derivative: Vec<f32>,
    pub strength: Vec<f32>,
}

impl BandSeries {
    pub fn len(&self) -> usize {
        self.magnitude.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitude.is_empty()
    }

    pub fn impulses(&self, threshold: f32) -> Vec<Impulse> {
        find_impulses(&self.strength, &self.times, threshold)
    }
}

/// Split a spectral sequence into per-band magnitude, slope and impulse
/// strength series.
pub fn decompose(
    sequence: &SpectralSequence,
    catalog: &[BandDescriptor],
    config: &DecomposeConfig,
) -> Vec<BandSeries> {
    let dt = if sequence.sample_rate == 0 {
        0.0
    } else {
        sequence.frame_period()
    };
    let times: Vec<f32> = (0..sequence.len()).map(|i| sequence.time_of(i)).collect();

    catalog
        .iter()
        .map(|band| {
            let bin = sequence.nearest_bin(band.frequency);
            let magnitude: Vec<f32> = sequence
                .frames
                .iter()
                .map(|frame| frame.get(bin).copied().unwrap_or(0.0))
                .collect();

            let first = derivative(&magnitude, config.derivative_mode, config.derivative_window, dt);
            let second = derivative(&first, config.derivative_mode, config.derivative_window, dt);
            let strength = impulse_strength(&magnitude, &config.impulse);

            log::debug!(
                "Band {} -> bin {} ({:.1} Hz), {} frames",
                band.name,
                bin,
                sequence.bin_frequency(bin),
                magnitude.len()
            );

            BandSeries {
                band: band.clone(),
                bin,
                times: times.clone(),
                magnitude,
                derivative: first,
                second_derivative: second,
                strength,
            }
        })
        .collect()
}
