use serde::{Deserialize, Serialize};

use super::level::{to_db, NoiseGate};

/// Scale that turns a median absolute deviation into a standard-deviation
/// estimate for normally distributed data.
const MAD_SCALE: f32 = 1.4826;

/// Smallest spread of dB rises; strength then reads as dB of rise.
const MIN_SPREAD_DB: f32 = 1.0;
/// Smallest spread of linear rises, relative to the series peak.
const MIN_SPREAD_FRACTION: f32 = 0.01;
/// Absolute spread floor so silence never divides by zero.
const MIN_SPREAD: f32 = 1e-6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpulseConfig {
    /// Frames in the centered median/MAD window over per-frame rises.
    pub window_size: usize,
    /// Width of the moving average applied first.
    pub smoothing: usize,
    /// Normalize dB levels instead of linear magnitudes.
    pub log_domain: bool,
    pub gate: NoiseGate,
}

impl Default for ImpulseConfig {
    fn default() -> Self {
        Self {
            window_size: 43,
            smoothing: 3,
            log_domain: true,
            gate: NoiseGate::default(),
        }
    }
}

/// A point on the timeline where a band's strength peaks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Impulse {
    pub time: f32,
    pub strength: f32,
}

/// Normalized impulse strength for a magnitude series.
///
/// Scores how far each frame's rise over the previous frame stands out from
/// the rises around it, so a sustained step in level scores as strongly as
/// a short burst. Every call starts from scratch; no normalization state is
/// kept.
pub fn impulse_strength(magnitude: &[f32], config: &ImpulseConfig) -> Vec<f32> {
    let smoothed = moving_average(magnitude, config.smoothing);
    let (domain, min_spread) = if config.log_domain {
        let db: Vec<f32> = smoothed.iter().map(|&m| to_db(m)).collect();
        (db, MIN_SPREAD_DB)
    } else {
        let peak = smoothed.iter().fold(0.0f32, |acc, &m| acc.max(m.abs()));
        (smoothed, (peak * MIN_SPREAD_FRACTION).max(MIN_SPREAD))
    };

    let rises = rectified_rise(&domain);
    let mut strength = local_robust_score(&rises, config.window_size, min_spread);

    let levels: Vec<f32> = magnitude.iter().map(|&m| to_db(m)).collect();
    for (i, value) in strength.iter_mut().enumerate() {
        let previous = if i == 0 { levels[0] } else { levels[i - 1] };
        let first_frame_rise = i == 0 && config.gate.min_db_delta <= 0.0;
        let admitted = config.gate.admits_level(levels[i])
            && (first_frame_rise || (i > 0 && config.gate.admits_change(levels[i], previous)));
        if !admitted {
            *value = 0.0;
        }
    }
    strength
}

/// Centered moving average, window clamped at the edges.
pub fn moving_average(series: &[f32], width: usize) -> Vec<f32> {
    if width <= 1 || series.is_empty() {
        return series.to_vec();
    }
    let n = series.len();
    let back = (width - 1) / 2;
    let ahead = width / 2;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(back);
            let hi = (i + ahead).min(n - 1);
            series[lo..=hi].iter().sum::<f32>() / (hi - lo + 1) as f32
        })
        .collect()
}

/// `max(0, x[i] - x[i-1])`, zero for the first frame.
fn rectified_rise(series: &[f32]) -> Vec<f32> {
    (0..series.len())
        .map(|i| if i == 0 { 0.0 } else { (series[i] - series[i - 1]).max(0.0) })
        .collect()
}

/// `max(0, (x - median) / max(1.4826*MAD, min_spread))` over a centered window.
fn local_robust_score(series: &[f32], window: usize, min_spread: f32) -> Vec<f32> {
    let n = series.len();
    let half = window.max(1) / 2;
    let mut scratch = Vec::with_capacity(2 * half + 1);
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(n - 1);
            scratch.clear();
            scratch.extend_from_slice(&series[lo..=hi]);
            let med = median(&mut scratch);
            for v in scratch.iter_mut() {
                *v = (*v - med).abs();
            }
            let spread = (median(&mut scratch) * MAD_SCALE).max(min_spread);
            ((series[i] - med) / spread).max(0.0)
        })
        .collect()
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) * 0.5
    } else {
        values[mid]
    }
}

/// Local maxima of `strength` at or above `threshold`.
///
/// Plateaus report their first frame only.
pub fn find_impulses(strength: &[f32], times: &[f32], threshold: f32) -> Vec<Impulse> {
    let n = strength.len().min(times.len());
    let mut out = Vec::new();
    for i in 0..n {
        let s = strength[i];
        if s <= 0.0 || s < threshold {
            continue;
        }
        let rises = i == 0 || s > strength[i - 1];
        let holds = i + 1 == n || s >= strength[i + 1];
        if rises && holds {
            out.push(Impulse {
                time: times[i],
                strength: s,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_gate() -> NoiseGate {
        NoiseGate {
            min_db: -80.0,
            min_db_delta: f32::NEG_INFINITY,
        }
    }

    #[test]
    fn moving_average_keeps_length_and_smooths() {
        let out = moving_average(&[0.0, 0.0, 3.0, 0.0, 0.0], 3);
        assert_eq!(out.len(), 5);
        assert_eq!(out[2], 1.0);
        assert_eq!(out[1], 1.0);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn spike_scores_above_flat_background() {
        let mut magnitude = vec![0.1f32; 40];
        magnitude[20] = 1.0;
        let config = ImpulseConfig {
            window_size: 15,
            smoothing: 1,
            log_domain: false,
            gate: open_gate(),
        };
        let strength = impulse_strength(&magnitude, &config);
        assert_eq!(strength.len(), 40);
        assert!(strength[20] > 10.0);
        assert_eq!(strength[5], 0.0);
    }

    #[test]
    fn quiet_frames_are_gated_out() {
        let mut magnitude = vec![1e-5f32; 30];
        magnitude[15] = 1e-3; // -60 dB, below a -40 dB floor
        let config = ImpulseConfig {
            window_size: 9,
            smoothing: 1,
            log_domain: true,
            gate: NoiseGate {
                min_db: -40.0,
                min_db_delta: 0.0,
            },
        };
        assert!(impulse_strength(&magnitude, &config).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn small_level_changes_are_gated_out() {
        let mut magnitude = vec![0.5f32; 30];
        magnitude[15] = 0.55; // under 1 dB above its neighbour
        let config = ImpulseConfig {
            window_size: 9,
            smoothing: 1,
            log_domain: false,
            gate: NoiseGate {
                min_db: -80.0,
                min_db_delta: 3.0,
            },
        };
        assert_eq!(impulse_strength(&magnitude, &config)[15], 0.0);
    }

    #[test]
    fn silence_does_not_divide_by_zero() {
        let config = ImpulseConfig {
            gate: open_gate(),
            ..ImpulseConfig::default()
        };
        let strength = impulse_strength(&vec![0.0; 16], &config);
        assert!(strength.iter().all(|s| s.is_finite() && *s == 0.0));
    }

    #[test]
    fn sustained_step_scores_its_rise() {
        // +24 dB step that stays up.
        let magnitude: Vec<f32> = (0..80).map(|i| if i < 40 { 0.05 } else { 0.8 }).collect();
        let strength = impulse_strength(&magnitude, &ImpulseConfig::default());
        let times: Vec<f32> = (0..80).map(|i| i as f32).collect();
        let found = find_impulses(&strength, &times, 2.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].time, 40.0);
        assert!(found[0].strength > 5.0 && found[0].strength < 6.0);
        assert!(strength[45..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn burst_over_silence_stays_bounded() {
        let mut magnitude = vec![0.0f32; 60];
        for m in &mut magnitude[30..34] {
            *m = 200.0;
        }
        for log_domain in [true, false] {
            let config = ImpulseConfig {
                log_domain,
                ..ImpulseConfig::default()
            };
            let strength = impulse_strength(&magnitude, &config);
            let peak = strength.iter().fold(0.0f32, |a, &s| a.max(s));
            assert!(peak >= 2.0, "log_domain={} peak={}", log_domain, peak);
            assert!(peak <= 200.0, "log_domain={} peak={}", log_domain, peak);
        }
    }

    #[test]
    fn finds_local_maxima_above_threshold() {
        let strength = [0.0, 1.0, 3.0, 1.0, 0.5, 2.0, 2.0, 0.0];
        let times: Vec<f32> = (0..8).map(|i| i as f32 * 0.1).collect();
        let found = find_impulses(&strength, &times, 1.5);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].strength, 3.0);
        assert!((found[0].time - 0.2).abs() < 1e-6);
        assert!((found[1].time - 0.5).abs() < 1e-6);
    }
}
