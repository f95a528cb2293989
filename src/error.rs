use thiserror::Error;

/// Input validation failures raised by the analysis and detection stages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("sample buffer is empty")]
    EmptyBuffer,

    #[error("sample rate must be positive")]
    ZeroSampleRate,

    #[error("window size {0} is not a power of two >= 2")]
    WindowNotPowerOfTwo(usize),

    #[error("hop size {hop} must be between 1 and the window size {window}")]
    InvalidHop { hop: usize, window: usize },

    #[error("hop size must be positive")]
    ZeroHop,

    #[error("bucket count must be positive")]
    ZeroBuckets,

    #[error("unknown detection engine '{0}'")]
    UnknownEngine(String),
}

/// Why a queued job did not produce an outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("job {id} rejected: {source}")]
    Rejected {
        id: u64,
        #[source]
        source: AnalysisError,
    },

    #[error("job {id} panicked: {message}")]
    Panicked { id: u64, message: String },

    #[error("worker for {0} jobs is no longer running")]
    WorkerGone(&'static str),
}

/// Output device failures. These never leave the dispatch sink.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("device responded with status {0}")]
    Status(u16),

    #[error("device unavailable: {0}")]
    Unavailable(String),
}
