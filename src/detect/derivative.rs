use super::framing::{first_difference, FrameLevels};
use super::{validate_input, DetectionEngine, DetectionParams, DetectionResult, OnsetEvent};
use crate::error::AnalysisError;
use crate::progress::{Progress, ProgressTicker};

/// Flags frames where the frame-to-frame level change is large.
pub struct FirstDerivativeEngine;

/// Flags frames where the change of the level change is large.
pub struct SecondDerivativeEngine;

impl DetectionEngine for FirstDerivativeEngine {
    fn key(&self) -> &'static str {
        "derivative"
    }

    fn description(&self) -> &'static str {
        "Absolute first difference of frame levels"
    }

    fn default_threshold(&self) -> f32 {
        0.01
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
        let slope = first_difference(&frames.levels);
        Ok(threshold_abs(frames, slope, self.threshold(params), params, progress))
    }
}

impl DetectionEngine for SecondDerivativeEngine {
    fn key(&self) -> &'static str {
        "second-derivative"
    }

    fn description(&self) -> &'static str {
        "Absolute second difference of frame levels"
    }

    fn default_threshold(&self) -> f32 {
        0.01
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
        let curvature = first_difference(&first_difference(&frames.levels));
        Ok(threshold_abs(frames, curvature, self.threshold(params), params, progress))
    }
}

fn threshold_abs(
    frames: FrameLevels,
    function: Vec<f32>,
    threshold: f32,
    params: &DetectionParams,
    progress: &mut dyn FnMut(Progress),
) -> DetectionResult {
    let mut ticker = ProgressTicker::new(function.len(), progress);
    let mut events = Vec::new();
    for (i, &value) in function.iter().enumerate() {
        if value.abs() > threshold && params.gate.admits_level(frames.db[i]) {
            events.push(OnsetEvent {
                time: frames.times[i],
                strength: Some(value.abs()),
            });
        }
        ticker.tick();
    }
    ticker.finish();

    DetectionResult {
        detection_function: function,
        times: frames.times,
        events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::test_signals::*;
    use crate::progress;

    fn params() -> DetectionParams {
        DetectionParams {
            hop_size: HOP,
            ..DetectionParams::default()
        }
    }

    #[test]
    fn first_derivative_fires_at_burst_start_only() {
        let buffer = sine_burst();
        let result = FirstDerivativeEngine
            .detect(buffer.samples(), SAMPLE_RATE, &params(), &mut progress::ignore)
            .unwrap();
        // The fall back to silence is below the level gate.
        assert_eq!(result.events.len(), 1);
        assert!((result.events[0].time - onset_time()).abs() < 1e-6);
    }

    #[test]
    fn second_derivative_fires_around_burst_start() {
        let buffer = sine_burst();
        let result = SecondDerivativeEngine
            .detect(buffer.samples(), SAMPLE_RATE, &params(), &mut progress::ignore)
            .unwrap();
        assert!(!result.events.is_empty());
        let hop_time = HOP as f32 / SAMPLE_RATE as f32;
        assert!((result.events[0].time - onset_time()).abs() < 1e-6);
        assert!(result.events.iter().all(|e| e.time <= onset_time() + hop_time + 1e-6));
    }
}
