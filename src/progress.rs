use serde::Serialize;

/// Frames between progress checkpoints for long-running loops.
pub const PROGRESS_INTERVAL: usize = 256;

/// A `{processed, total}` checkpoint emitted by analysis and detection loops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f32 / self.total as f32
        }
    }
}

/// Callback receiving progress checkpoints.
pub type ProgressFn<'a> = &'a mut dyn FnMut(Progress);

/// Turns a per-frame loop into bounded-cadence checkpoints.
///
/// The loop calls [`ProgressTicker::tick`] once per processed frame; the
/// callback only sees every `interval`-th frame plus the final one.
pub struct ProgressTicker<'a> {
    total: usize,
    interval: usize,
    processed: usize,
    sink: ProgressFn<'a>,
}

impl<'a> ProgressTicker<'a> {
    pub fn new(total: usize, sink: ProgressFn<'a>) -> Self {
        Self::with_interval(total, PROGRESS_INTERVAL, sink)
    }

    pub fn with_interval(total: usize, interval: usize, sink: ProgressFn<'a>) -> Self {
        Self {
            total,
            interval: interval.max(1),
            processed: 0,
            sink,
        }
    }

    pub fn tick(&mut self) {
        self.advance(1);
    }

    /// Record `frames` more processed frames, emitting at most one checkpoint.
    pub fn advance(&mut self, frames: usize) {
        let before = self.processed / self.interval;
        self.processed = (self.processed + frames).min(self.total);
        let after = self.processed / self.interval;
        if after != before || self.processed == self.total {
            self.emit();
        }
    }

    /// Emit the closing checkpoint unless the last tick already did.
    pub fn finish(mut self) {
        if self.processed != self.total {
            self.processed = self.total;
            self.emit();
        } else if self.total == 0 {
            self.emit();
        }
    }

    fn emit(&mut self) {
        (self.sink)(Progress {
            processed: self.processed,
            total: self.total,
        });
    }
}

/// A sink for callers that do not want progress.
pub fn ignore(_: Progress) {}
