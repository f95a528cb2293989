use super::framing::FrameLevels;
use super::{validate_input, DetectionEngine, DetectionParams, DetectionResult, OnsetEvent};
use crate::error::AnalysisError;
use crate::progress::{Progress, ProgressTicker};

/// Flags frames whose level is an outlier against the whole clip.
///
/// Mean and standard deviation are taken over every frame before any frame
/// is scored, so the result depends on the full recording.
pub struct ZScoreEngine;

impl DetectionEngine for ZScoreEngine {
    fn key(&self) -> &'static str {
        "z-score"
    }

    fn description(&self) -> &'static str {
        "Frame level z-score against the whole clip"
    }

    fn default_threshold(&self) -> f32 {
        2.0
    }

    fn detect(
        &self,
        samples: &[f32],
        sample_rate: u32,
        params: &DetectionParams,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<DetectionResult, AnalysisError> {
        validate_input(samples, sample_rate, params)?;
        let threshold = self.threshold(params);
        let frames = FrameLevels::measure(samples, sample_rate, params.hop_size);
        let (mean, std_dev) = population_stats(&frames.levels);

        let mut ticker = ProgressTicker::new(frames.len(), progress);
        let mut scores = Vec::with_capacity(frames.len());
        let mut events = Vec::new();
        for i in 0..frames.len() {
            let z = if std_dev > 0.0 {
                (frames.levels[i] - mean) / std_dev
            } else {
                0.0
            };
            if z.abs() > threshold && params.gate.admits_level(frames.db[i]) {
                events.push(OnsetEvent {
                    time: frames.times[i],
                    strength: Some(z.abs()),
                });
            }
            scores.push(z);
            ticker.tick();
        }
        ticker.finish();

        Ok(DetectionResult {
            detection_function: scores,
            times: frames.times,
            events,
        })
    }
}

fn population_stats(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean as f32, variance.sqrt() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::test_signals::*;
    use crate::progress;

    #[test]
    fn population_stats_of_known_values() {
        let (mean, std_dev) = population_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-6);
        assert!((std_dev - 2.0).abs() < 1e-6);
    }

    #[test]
    fn constant_signal_scores_zero() {
        let samples = vec![0.5; 4096];
        let params = DetectionParams {
            hop_size: HOP,
            ..DetectionParams::default()
        };
        let result = ZScoreEngine
            .detect(&samples, SAMPLE_RATE, &params, &mut progress::ignore)
            .unwrap();
        assert!(result.detection_function.iter().all(|&z| z == 0.0));
        assert!(result.events.is_empty());
    }

    #[test]
    fn burst_frames_are_outliers() {
        let params = DetectionParams {
            hop_size: HOP,
            ..DetectionParams::default()
        };
        let buffer = sine_burst();
        let result = ZScoreEngine
            .detect(buffer.samples(), SAMPLE_RATE, &params, &mut progress::ignore)
            .unwrap();
        assert_eq!(result.events.len(), 8);
        assert!((result.events[0].time - onset_time()).abs() < 1e-6);
    }
}
