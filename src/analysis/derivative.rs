use serde::{Deserialize, Serialize};

/// How slopes are estimated from a per-frame series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DerivativeMode {
    /// Slope between the frames `k` before and `k` after.
    #[default]
    Centered,
    /// Difference against the frame `k` back.
    Forward,
    /// Mean of the last `k` pointwise differences.
    MovingAverage,
}

impl std::str::FromStr for DerivativeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "centered" => Ok(DerivativeMode::Centered),
            "forward" => Ok(DerivativeMode::Forward),
            "moving-average" => Ok(DerivativeMode::MovingAverage),
            other => Err(format!(
                "unknown derivative mode '{}' (expected centered, forward or moving-average)",
                other
            )),
        }
    }
}

/// Per-second derivative of `series`, sampled every `dt` seconds.
///
/// Out-of-range neighbours are clamped to the nearest valid index; a span
/// that collapses to zero frames yields 0. The output always has the
/// input's length.
pub fn derivative(series: &[f32], mode: DerivativeMode, window: usize, dt: f32) -> Vec<f32> {
    let n = series.len();
    if n == 0 {
        return Vec::new();
    }
    let k = window.max(1);
    let last = n - 1;
    let dt = if dt > 0.0 { dt } else { 1.0 };

    (0..n)
        .map(|i| match mode {
            DerivativeMode::Centered => {
                let lo = i.saturating_sub(k);
                let hi = (i + k).min(last);
                slope(series, lo, hi, dt)
            }
            DerivativeMode::Forward => {
                let lo = i.saturating_sub(k);
                slope(series, lo, i, dt)
            }
            DerivativeMode::MovingAverage => {
                let from = (i + 1).saturating_sub(k);
                let sum: f32 = (from..=i)
                    .map(|j| {
                        let prev = j.saturating_sub(1);
                        (series[j] - series[prev]) / dt
                    })
                    .sum();
                sum / (i - from + 1) as f32
            }
        })
        .collect()
}

fn slope(series: &[f32], lo: usize, hi: usize, dt: f32) -> f32 {
    if hi == lo {
        0.0
    } else {
        (series[hi] - series[lo]) / ((hi - lo) as f32 * dt)
    }
}
