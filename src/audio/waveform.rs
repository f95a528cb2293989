use serde::Serialize;

use super::SampleBuffer;
use crate::error::AnalysisError;
use crate::progress::{Progress, ProgressTicker};

/// Min/max/RMS of one slice of the clip, for overview plots.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct WaveformBucket {
    pub min: f32,
    pub max: f32,
    pub rms: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct WaveformSummary {
    pub buckets: Vec<WaveformBucket>,
    /// Seconds covered by each bucket.
    pub bucket_duration: f32,
    pub peak_amplitude: f32,
    pub peak_rms: f32,
}

/// Reduce a buffer to at most `buckets` min/max/RMS slices.
pub fn summarize(
    buffer: &SampleBuffer,
    buckets: usize,
    progress: &mut dyn FnMut(Progress),
) -> Result<WaveformSummary, AnalysisError> {
    if buckets == 0 {
        return Err(AnalysisError::ZeroBuckets);
    }
    if buffer.is_empty() {
        return Err(AnalysisError::EmptyBuffer);
    }
    if buffer.sample_rate() == 0 {
        return Err(AnalysisError::ZeroSampleRate);
    }

    let samples = buffer.samples();
    let chunk_len = samples.len().div_ceil(buckets);
    let total = samples.len().div_ceil(chunk_len);
    let mut ticker = ProgressTicker::new(total, progress);

    let mut out = Vec::with_capacity(total);
    for chunk in samples.chunks(chunk_len) {
        let (min, max) = chunk
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        let rms = (chunk.iter().map(|s| s * s).sum::<f32>() / chunk.len() as f32).sqrt();
        out.push(WaveformBucket { min, max, rms });
        ticker.tick();
    }
    ticker.finish();

    let peak_amplitude = out
        .iter()
        .map(|b| b.min.abs().max(b.max.abs()))
        .fold(0.0f32, f32::max);
    let peak_rms = out.iter().map(|b| b.rms).fold(0.0f32, f32::max);

    Ok(WaveformSummary {
        buckets: out,
        bucket_duration: chunk_len as f32 / buffer.sample_rate() as f32,
        peak_amplitude,
        peak_rms,
    })
}
