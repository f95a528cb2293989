use serde::Serialize;

use crate::analysis::{self, BandDescriptor, BandSeries, DecomposeConfig, SpectralSequence, SpectrumConfig};
use crate::audio::waveform::{self, WaveformSummary};
use crate::audio::SampleBuffer;
use crate::detect::{DetectionParams, DetectionResult, EngineRegistry};
use crate::error::AnalysisError;
use crate::progress::Progress;

/// Each kind has its own queue and worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum JobKind {
    WaveformSummary,
    SpectralAnalysis,
    OnsetDetection,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::WaveformSummary,
        JobKind::SpectralAnalysis,
        JobKind::OnsetDetection,
    ];

    pub fn name(self) -> &'static str {
        match self {
            JobKind::WaveformSummary => "waveform-summary",
            JobKind::SpectralAnalysis => "spectral-analysis",
            JobKind::OnsetDetection => "onset-detection",
        }
    }
}

/// Work handed to a worker. The request owns its sample buffer handle.
#[derive(Clone, Debug)]
pub enum JobRequest {
    WaveformSummary {
        buffer: SampleBuffer,
        buckets: usize,
    },
    SpectralAnalysis {
        buffer: SampleBuffer,
        spectrum: SpectrumConfig,
        bands: DecomposeConfig,
        catalog: Vec<BandDescriptor>,
    },
    OnsetDetection {
        buffer: SampleBuffer,
        engine: String,
        params: DetectionParams,
    },
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::WaveformSummary { .. } => JobKind::WaveformSummary,
            JobRequest::SpectralAnalysis { .. } => JobKind::SpectralAnalysis,
            JobRequest::OnsetDetection { .. } => JobKind::OnsetDetection,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SpectralReport {
    pub sequence: SpectralSequence,
    pub bands: Vec<BandSeries>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum JobOutput {
    WaveformSummary(WaveformSummary),
    SpectralAnalysis(SpectralReport),
    OnsetDetection(DetectionResult),
}

pub(crate) fn run(
    request: JobRequest,
    registry: &EngineRegistry,
    progress: &mut dyn FnMut(Progress),
) -> Result<JobOutput, AnalysisError> {
    match request {
        JobRequest::WaveformSummary { buffer, buckets } => {
            waveform::summarize(&buffer, buckets, progress).map(JobOutput::WaveformSummary)
        }
        JobRequest::SpectralAnalysis {
            buffer,
            spectrum,
            bands,
            catalog,
        } => {
            let sequence = analysis::analyze(
                &buffer,
                spectrum.window_size,
                spectrum.hop_size,
                spectrum.window,
                progress,
            )?;
            let bands = analysis::decompose(&sequence, &catalog, &bands);
            Ok(JobOutput::SpectralAnalysis(SpectralReport { sequence, bands }))
        }
        JobRequest::OnsetDetection {
            buffer,
            engine,
            params,
        } => registry
            .detect(&engine, &buffer, &params, progress)
            .map(JobOutput::OnsetDetection),
    }
}
