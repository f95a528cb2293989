//! Background job queues for analysis and detection.
//!
//! Every [`JobKind`] gets one worker thread fed by a FIFO channel, so jobs
//! of a kind run strictly one after another while different kinds run in
//! parallel. A job that fails or panics rejects its own handle and the
//! worker moves on to the next job.

mod request;
mod tracker;

pub use request::{JobKind, JobOutput, JobRequest, SpectralReport};
pub use tracker::RunTracker;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::detect::EngineRegistry;
use crate::error::JobError;
use crate::progress::Progress;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobEventKind {
    Started,
    Progress(Progress),
}

/// Lifecycle notification delivered to the callback of the job it names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobEvent {
    pub job_id: u64,
    pub kind: JobEventKind,
}

pub type EventCallback = Box<dyn FnMut(JobEvent) + Send>;

#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: u64,
    pub kind: JobKind,
    pub output: JobOutput,
    pub elapsed: Duration,
}

pub type JobResult = Result<JobOutcome, JobError>;

struct Job {
    id: u64,
    request: JobRequest,
    on_event: Option<EventCallback>,
    reply: Sender<JobResult>,
}

/// Completion side of an enqueued job.
pub struct JobHandle {
    id: u64,
    kind: JobKind,
    result: Receiver<JobResult>,
}

impl JobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Block until the job completes or fails.
    pub fn wait(self) -> JobResult {
        self.result
            .recv()
            .unwrap_or(Err(JobError::WorkerGone(self.kind.name())))
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobResult> {
        match self.result.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(JobError::WorkerGone(self.kind.name()))),
        }
    }

    /// Non-blocking poll.
    pub fn try_result(&self) -> Option<JobResult> {
        match self.result.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(JobError::WorkerGone(self.kind.name()))),
        }
    }
}

struct Worker {
    kind: JobKind,
    queue: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

pub struct Orchestrator {
    next_id: AtomicU64,
    workers: Vec<Worker>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_registry(EngineRegistry::with_defaults())
    }

    pub fn with_registry(registry: EngineRegistry) -> Self {
        let registry = Arc::new(registry);
        let workers = JobKind::ALL
            .iter()
            .map(|&kind| {
                let (tx, rx) = unbounded::<Job>();
                let registry = Arc::clone(&registry);
                let thread = std::thread::Builder::new()
                    .name(format!("beatlight-{}", kind.name()))
                    .spawn(move || run_worker(kind, rx, registry))
                    .map_err(|e| log::error!("Failed to spawn {} worker: {}", kind.name(), e))
                    .ok();
                Worker {
                    kind,
                    queue: thread.as_ref().map(|_| tx),
                    thread,
                }
            })
            .collect();

        Self {
            next_id: AtomicU64::new(1),
            workers,
        }
    }

    /// Queue `request` behind any jobs of the same kind.
    pub fn submit(&self, request: JobRequest) -> JobHandle {
        self.dispatch(request, None)
    }

    /// Queue `request`; `on_event` sees this job's start and progress only.
    pub fn enqueue<F>(&self, request: JobRequest, on_event: F) -> JobHandle
    where
        F: FnMut(JobEvent) + Send + 'static,
    {
        self.dispatch(request, Some(Box::new(on_event)))
    }

    fn dispatch(&self, request: JobRequest, on_event: Option<EventCallback>) -> JobHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let kind = request.kind();
        let (reply, result) = bounded(1);

        let job = Job {
            id,
            request,
            on_event,
            reply,
        };

        let queue = self
            .workers
            .iter()
            .find(|w| w.kind == kind)
            .and_then(|w| w.queue.as_ref());

        match queue {
            Some(queue) => {
                if let Err(err) = queue.send(job) {
                    let job = err.into_inner();
                    let _ = job.reply.send(Err(JobError::WorkerGone(kind.name())));
                }
            }
            None => {
                let _ = job.reply.send(Err(JobError::WorkerGone(kind.name())));
            }
        }

        log::debug!("Enqueued {} job {}", kind.name(), id);
        JobHandle { id, kind, result }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        // Closing the queues lets each worker drain and exit.
        for worker in &mut self.workers {
            worker.queue = None;
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    log::error!("{} worker exited abnormally", worker.kind.name());
                }
            }
        }
    }
}

fn run_worker(kind: JobKind, queue: Receiver<Job>, registry: Arc<EngineRegistry>) {
    for job in queue.iter() {
        let Job {
            id,
            request,
            mut on_event,
            reply,
        } = job;

        let mut emit = |event: JobEventKind| {
            if let Some(callback) = on_event.as_mut() {
                callback(JobEvent { job_id: id, kind: event });
            }
        };

        emit(JobEventKind::Started);
        log::debug!("Running {} job {}", kind.name(), id);
        let started = Instant::now();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            request::run(request, &registry, &mut |p| emit(JobEventKind::Progress(p)))
        }));

        let outcome = match result {
            Ok(Ok(output)) => Ok(JobOutcome {
                job_id: id,
                kind,
                output,
                elapsed: started.elapsed(),
            }),
            Ok(Err(source)) => {
                log::warn!("{} job {} rejected: {}", kind.name(), id, source);
                Err(JobError::Rejected { id, source })
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("{} job {} panicked: {}", kind.name(), id, message);
                Err(JobError::Panicked { id, message })
            }
        };

        if reply.send(outcome).is_err() {
            log::debug!("{} job {} finished after its handle was dropped", kind.name(), id);
        }
    }
    log::debug!("{} worker stopped", kind.name());
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{default_catalog, DecomposeConfig, SpectrumConfig};
    use crate::audio::SampleBuffer;
    use crate::detect::{DetectionEngine, DetectionParams, DetectionResult};
    use crate::error::AnalysisError;
    use std::sync::Mutex;

    fn noise(len: usize) -> SampleBuffer {
        let samples = (0..len).map(|i| ((i * 7919) % 101) as f32 / 101.0 - 0.5).collect();
        SampleBuffer::new(samples, 8000)
    }

    fn detection(buffer: SampleBuffer, engine: &str) -> JobRequest {
        JobRequest::OnsetDetection {
            buffer,
            engine: engine.to_string(),
            params: DetectionParams::default(),
        }
    }

    struct Exploding;

    impl DetectionEngine for Exploding {
        fn key(&self) -> &'static str {
            "exploding"
        }

        fn description(&self) -> &'static str {
            "panics"
        }

        fn default_threshold(&self) -> f32 {
            0.0
        }

        fn detect(
            &self,
            _: &[f32],
            _: u32,
            _: &DetectionParams,
            _: &mut dyn FnMut(Progress),
        ) -> Result<DetectionResult, AnalysisError> {
            panic!("engine blew up")
        }
    }

    /// Blocks inside `detect` until the test sends a release.
    struct Held {
        release: Receiver<()>,
    }

    impl DetectionEngine for Held {
        fn key(&self) -> &'static str {
            "held"
        }

        fn description(&self) -> &'static str {
            "waits for a release"
        }

        fn default_threshold(&self) -> f32 {
            0.0
        }

        fn detect(
            &self,
            _: &[f32],
            _: u32,
            _: &DetectionParams,
            _: &mut dyn FnMut(Progress),
        ) -> Result<DetectionResult, AnalysisError> {
            let _ = self.release.recv();
            Ok(DetectionResult::default())
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<JobEvent>>>) -> impl FnMut(JobEvent) + Send + 'static {
        let log = Arc::clone(log);
        move |event| log.lock().unwrap().push(event)
    }

    #[test]
    fn same_kind_jobs_start_in_order_and_failure_does_not_block() {
        let orchestrator = Orchestrator::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        let a = orchestrator.enqueue(detection(noise(40_000), "magnitude"), recorder(&events));
        let b = orchestrator.enqueue(detection(SampleBuffer::new(Vec::new(), 8000), "magnitude"), recorder(&events));
        let c = orchestrator.enqueue(detection(noise(40_000), "z-score"), recorder(&events));
        let (a_id, b_id, c_id) = (a.id(), b.id(), c.id());

        assert!(a.wait().is_ok());
        assert!(matches!(
            b.wait(),
            Err(JobError::Rejected { source: AnalysisError::EmptyBuffer, .. })
        ));
        let outcome = c.wait().unwrap();
        assert_eq!(outcome.job_id, c_id);
        assert!(matches!(outcome.output, JobOutput::OnsetDetection(_)));

        let events = events.lock().unwrap();
        let starts: Vec<u64> = events
            .iter()
            .filter(|e| e.kind == JobEventKind::Started)
            .map(|e| e.job_id)
            .collect();
        assert_eq!(starts, vec![a_id, b_id, c_id]);

        // Nothing from B or C appears before A's last event.
        let last_a = events.iter().rposition(|e| e.job_id == a_id).unwrap();
        let first_other = events.iter().position(|e| e.job_id != a_id).unwrap();
        assert!(last_a < first_other);
    }

    #[test]
    fn progress_reaches_only_the_owning_callback() {
        let orchestrator = Orchestrator::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let request = JobRequest::SpectralAnalysis {
            buffer: noise(200_000),
            spectrum: SpectrumConfig {
                window_size: 256,
                hop_size: 128,
                ..SpectrumConfig::default()
            },
            bands: DecomposeConfig::default(),
            catalog: default_catalog(),
        };
        let h1 = orchestrator.enqueue(request.clone(), recorder(&first));
        let h2 = orchestrator.enqueue(request, recorder(&second));
        let (id1, id2) = (h1.id(), h2.id());
        h1.wait().unwrap();
        h2.wait().unwrap();

        let first = first.lock().unwrap();
        let second = second.lock().unwrap();
        assert!(first.iter().all(|e| e.job_id == id1));
        assert!(second.iter().all(|e| e.job_id == id2));
        let progress: Vec<Progress> = first
            .iter()
            .filter_map(|e| match e.kind {
                JobEventKind::Progress(p) => Some(p),
                JobEventKind::Started => None,
            })
            .collect();
        assert!(progress.len() > 1);
        assert_eq!(progress.last().unwrap().processed, progress.last().unwrap().total);
    }

    #[test]
    fn panicking_engine_rejects_only_its_job() {
        let mut registry = EngineRegistry::with_defaults();
        registry.register(Exploding);
        let orchestrator = Orchestrator::with_registry(registry);

        let bad = orchestrator.submit(detection(noise(4096), "exploding"));
        let good = orchestrator.submit(detection(noise(4096), "derivative"));

        match bad.wait() {
            Err(JobError::Panicked { message, .. }) => assert!(message.contains("blew up")),
            other => panic!("expected a panic rejection, got {:?}", other),
        }
        assert!(good.wait().is_ok());
    }

    #[test]
    fn kinds_have_independent_queues() {
        let orchestrator = Orchestrator::new();
        let summary = orchestrator.submit(JobRequest::WaveformSummary {
            buffer: noise(10_000),
            buckets: 100,
        });
        let unknown = orchestrator.submit(detection(noise(1000), "nope"));
        assert_eq!(summary.kind(), JobKind::WaveformSummary);
        match summary.wait().unwrap().output {
            JobOutput::WaveformSummary(s) => assert_eq!(s.buckets.len(), 100),
            other => panic!("unexpected output {:?}", other),
        }
        assert!(matches!(
            unknown.wait(),
            Err(JobError::Rejected { source: AnalysisError::UnknownEngine(_), .. })
        ));
    }

    #[test]
    fn stale_outcomes_can_be_discarded() {
        let orchestrator = Orchestrator::new();
        let tracker = RunTracker::new();
        let old = orchestrator.submit(detection(noise(8000), "magnitude"));
        tracker.track(old.id());
        let new = orchestrator.submit(detection(noise(8000), "magnitude"));
        tracker.track(new.id());

        let old = old.wait().unwrap();
        let new = new.wait().unwrap();
        assert!(!tracker.is_current(old.job_id));
        assert!(tracker.is_current(new.job_id));
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let orchestrator = Orchestrator::new();
        let a = orchestrator.submit(detection(noise(100), "magnitude"));
        let b = orchestrator.submit(JobRequest::WaveformSummary {
            buffer: noise(100),
            buckets: 4,
        });
        assert!(b.id() > a.id());
        let _ = (a.wait(), b.wait());
    }

    #[test]
    fn polling_a_pending_job_returns_nothing_until_it_finishes() {
        let (release, held) = bounded(0);
        let mut registry = EngineRegistry::with_defaults();
        registry.register(Held { release: held });
        let orchestrator = Orchestrator::with_registry(registry);
        // Rebound so a failed assertion drops the sender before the join.
        let release = release;

        let handle = orchestrator.submit(detection(noise(4096), "held"));
        assert!(handle.try_result().is_none());
        assert!(handle.wait_timeout(Duration::from_millis(20)).is_none());

        release.send(()).unwrap();
        let outcome = handle
            .wait_timeout(Duration::from_secs(5))
            .expect("job should finish once released")
            .unwrap();
        assert_eq!(outcome.job_id, handle.id());
    }

    #[test]
    fn polling_picks_up_a_finished_job() {
        let orchestrator = Orchestrator::new();
        let handle = orchestrator.submit(JobRequest::WaveformSummary {
            buffer: noise(1000),
            buckets: 10,
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = loop {
            if let Some(result) = handle.try_result() {
                break result;
            }
            assert!(Instant::now() < deadline, "job never finished");
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(result.unwrap().kind, JobKind::WaveformSummary);
    }

    #[test]
    fn vanished_worker_is_reported_by_every_poll() {
        let (reply, result) = bounded::<JobResult>(1);
        drop(reply);
        let handle = JobHandle {
            id: 7,
            kind: JobKind::SpectralAnalysis,
            result,
        };
        assert!(matches!(
            handle.try_result(),
            Some(Err(JobError::WorkerGone("spectral-analysis")))
        ));
        assert!(matches!(
            handle.wait_timeout(Duration::from_millis(10)),
            Some(Err(JobError::WorkerGone("spectral-analysis")))
        ));
        assert!(matches!(handle.wait(), Err(JobError::WorkerGone("spectral-analysis"))));
    }
}
