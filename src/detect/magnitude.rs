use super::framing::FrameLevels;
use super::{validate_input, DetectionEngine, DetectionParams, DetectionResult, OnsetEvent};
use crate::error::AnalysisError;
use crate::progress::{Progress, ProgressTicker};

/// Flags frames whose mean level rises sharply over the previous frame.
pub struct MagnitudeEngine;

impl DetectionEngine for MagnitudeEngine {
    fn key(&self) -> &'static str {
        "magnitude"
    }

    fn description(&self) -> &'static str {
        "Frame level rise over the previous frame"
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
        let threshold = self.threshold(params);
        let frames = FrameLevels::measure(samples, sample_rate, params.hop_size);

        let mut ticker = ProgressTicker::new(frames.len(), progress);
        let mut events = Vec::new();
        for i in 0..frames.len() {
            if i > 0 {
                let rise = frames.levels[i] - frames.levels[i - 1];
                if rise > threshold && params.gate.admits_level(frames.db[i]) {
                    events.push(OnsetEvent {
                        time: frames.times[i],
                        strength: Some(rise),
                    });
                }
            }
            ticker.tick();
        }
        ticker.finish();

        Ok(DetectionResult {
            detection_function: frames.levels,
            times: frames.times,
            events,
        })
    }
}
