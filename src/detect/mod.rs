//! Interchangeable onset-detection engines.
//!
//! Every engine takes raw mono samples and returns a [`DetectionResult`]:
//! a detection function sampled once per hop plus the discrete onsets
//! derived from it. Engines are looked up by key in an [`EngineRegistry`],
//! so adding one never touches the call sites.

pub mod derivative;
pub mod flux;
pub mod framing;
pub mod magnitude;
pub mod zscore;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::analysis::level::NoiseGate;
use crate::audio::SampleBuffer;
use crate::error::AnalysisError;
use crate::progress::Progress;

pub use derivative::{FirstDerivativeEngine, SecondDerivativeEngine};
pub use flux::{ExternalOnsetEngine, FluxDetector, OnsetDecision, OnsetDetector};
pub use magnitude::MagnitudeEngine;
pub use zscore::ZScoreEngine;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Frame length in samples; frames do not overlap.
    pub hop_size: usize,
    pub gate: NoiseGate,
    /// Engine-specific threshold; `None` uses the engine default.
    pub threshold: Option<f32>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            hop_size: 512,
            gate: NoiseGate::default(),
            threshold: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OnsetEvent {
    pub time: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionResult {
    pub detection_function: Vec<f32>,
    pub times: Vec<f32>,
    /// Time-ordered, all within `times[0]..=times[last]`.
    pub events: Vec<OnsetEvent>,
}

pub trait DetectionEngine: Send + Sync {
    fn key(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn default_threshold(&self) -> f32;

    fn detect(
        &self,
        samples: &[f32],
        sample_rate: u32,
        params: &DetectionParams,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<DetectionResult, AnalysisError>;

    fn threshold(&self, params: &DetectionParams) -> f32 {
        params.threshold.unwrap_or_else(|| self.default_threshold())
    }
}

/// Shared input checks for every engine.
pub fn validate_input(
    samples: &[f32],
    sample_rate: u32,
    params: &DetectionParams,
) -> Result<(), AnalysisError> {
    if samples.is_empty() {
        return Err(AnalysisError::EmptyBuffer);
    }
    if sample_rate == 0 {
        return Err(AnalysisError::ZeroSampleRate);
    }
    if params.hop_size == 0 {
        return Err(AnalysisError::ZeroHop);
    }
    Ok(())
}

#[derive(Clone)]
pub struct EngineRegistry {
    engines: BTreeMap<&'static str, Arc<dyn DetectionEngine>>,
}

impl EngineRegistry {
    pub fn empty() -> Self {
        Self {
            engines: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(MagnitudeEngine);
        registry.register(FirstDerivativeEngine);
        registry.register(SecondDerivativeEngine);
        registry.register(ZScoreEngine);
        registry.register(ExternalOnsetEngine::default());
        registry
    }

    /// Add an engine, replacing any engine with the same key.
    pub fn register<E: DetectionEngine + 'static>(&mut self, engine: E) {
        let key = engine.key();
        if self.engines.insert(key, Arc::new(engine)).is_some() {
            log::warn!("Replaced detection engine '{}'", key);
        }
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn DetectionEngine>, AnalysisError> {
        self.engines
            .get(key)
            .cloned()
            .ok_or_else(|| AnalysisError::UnknownEngine(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.engines.keys().copied()
    }

    pub fn engines(&self) -> impl Iterator<Item = &Arc<dyn DetectionEngine>> {
        self.engines.values()
    }

    pub fn detect(
        &self,
        key: &str,
        buffer: &SampleBuffer,
        params: &DetectionParams,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<DetectionResult, AnalysisError> {
        let engine = self.get(key)?;
        let result = engine.detect(buffer.samples(), buffer.sample_rate(), params, progress)?;
        log::debug!(
            "Engine {}: {} frames, {} events",
            key,
            result.times.len(),
            result.events.len()
        );
        Ok(result)
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}


#[cfg(test)]
mod tests {
    use super::test_signals::*;
    use super::*;
    use crate::progress;

    fn params() -> DetectionParams {
        DetectionParams {
            hop_size: HOP,
            ..DetectionParams::default()
        }
    }

    #[test]
    fn every_engine_finds_the_burst_onset() {
        let registry = EngineRegistry::with_defaults();
        let buffer = sine_burst();
        let hop_time = HOP as f32 / SAMPLE_RATE as f32;
        for key in registry.keys() {
            let result = registry
                .detect(key, &buffer, &params(), &mut progress::ignore)
                .unwrap();
            assert!(
                result
                    .events
                    .iter()
                    .any(|e| (e.time - onset_time()).abs() <= hop_time),
                "{key} missed the onset: {:?}",
                result.events
            );
        }
    }

    #[test]
    fn no_engine_fires_on_silence() {
        let registry = EngineRegistry::with_defaults();
        for key in registry.keys() {
            let result = registry
                .detect(key, &silence(), &params(), &mut progress::ignore)
                .unwrap();
            assert!(result.events.is_empty(), "{key} fired on silence");
        }
    }

    #[test]
    fn results_cover_the_clip_with_ordered_events() {
        let registry = EngineRegistry::with_defaults();
        let buffer = sine_burst();
        let frames = buffer.len().div_ceil(HOP);
        for key in registry.keys() {
            let result = registry
                .detect(key, &buffer, &params(), &mut progress::ignore)
                .unwrap();
            assert_eq!(result.times.len(), frames, "{key}");
            assert_eq!(result.detection_function.len(), result.times.len(), "{key}");
            let first = result.times[0];
            let last = *result.times.last().unwrap();
            assert!(result.events.windows(2).all(|w| w[0].time <= w[1].time));
            assert!(result.events.iter().all(|e| e.time >= first && e.time <= last));
        }
    }

    #[test]
    fn engines_report_bounded_progress() {
        let registry = EngineRegistry::with_defaults();
        let buffer = sine_burst();
        let frames = buffer.len().div_ceil(HOP);
        for key in registry.keys() {
            let mut seen = Vec::new();
            let mut sink = |p: Progress| seen.push(p);
            registry.detect(key, &buffer, &params(), &mut sink).unwrap();
            let last = seen.last().copied().unwrap();
            assert_eq!(last, Progress { processed: frames, total: frames }, "{key}");
            assert!(seen.len() <= frames / crate::progress::PROGRESS_INTERVAL + 1);
        }
    }

    #[test]
    fn invalid_input_is_rejected() {
        let registry = EngineRegistry::with_defaults();
        let empty = SampleBuffer::new(Vec::new(), SAMPLE_RATE);
        let bad_hop = DetectionParams {
            hop_size: 0,
            ..DetectionParams::default()
        };
        let no_rate = SampleBuffer::new(sine_burst().samples().to_vec(), 0);
        for key in registry.keys() {
            assert_eq!(
                registry.detect(key, &empty, &params(), &mut progress::ignore).unwrap_err(),
                AnalysisError::EmptyBuffer
            );
            assert_eq!(
                registry.detect(key, &sine_burst(), &bad_hop, &mut progress::ignore).unwrap_err(),
                AnalysisError::ZeroHop
            );
            assert_eq!(
                registry.detect(key, &no_rate, &params(), &mut progress::ignore).unwrap_err(),
                AnalysisError::ZeroSampleRate
            );
        }
    }

    #[test]
    fn unknown_engine_is_an_error() {
        let registry = EngineRegistry::with_defaults();
        assert_eq!(
            registry.get("tarot").err(),
            Some(AnalysisError::UnknownEngine("tarot".into()))
        );
        assert_eq!(registry.keys().count(), 5);
    }
}
