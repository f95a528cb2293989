use std::collections::HashSet;

use crate::analysis::{BandSeries, Impulse};
use crate::detect::DetectionResult;

/// Cursor start, just before zero so impulses at t=0 fire on the first tick.
const START_CURSOR: f32 = -1e-3;

/// A band's impulses, sorted by time, as the playhead sees them.
#[derive(Clone, Debug, PartialEq)]
pub struct BandTrack {
    pub name: String,
    pub impulses: Vec<Impulse>,
}

impl BandTrack {
    pub fn new(name: impl Into<String>, mut impulses: Vec<Impulse>) -> Self {
        impulses.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            name: name.into(),
            impulses,
        }
    }

    /// Every positive local maximum of the band; thresholding happens live.
    pub fn from_series(series: &BandSeries) -> Self {
        Self::new(series.band.name.clone(), series.impulses(0.0))
    }

    /// Onsets from a detection engine; events without a strength count as 1.
    pub fn from_onsets(name: impl Into<String>, result: &DetectionResult) -> Self {
        let impulses = result
            .events
            .iter()
            .map(|e| Impulse {
                time: e.time,
                strength: e.strength.unwrap_or(1.0),
            })
            .collect();
        Self::new(name, impulses)
    }

    /// Impulses with `after < time <= until`.
    fn between(&self, after: f32, until: f32) -> &[Impulse] {
        let start = self.impulses.partition_point(|i| i.time <= after);
        let end = self.impulses.partition_point(|i| i.time <= until);
        if start >= end {
            &[]
        } else {
            &self.impulses[start..end]
        }
    }
}

/// An impulse the playhead has just crossed.
#[derive(Clone, Debug, PartialEq)]
pub struct FiredImpulse {
    pub band: String,
    pub time: f32,
    pub strength: f32,
}

type ImpulseKey = (String, u32);

/// Per-session playhead state: the last time seen and what already fired.
#[derive(Clone, Debug)]
pub struct PlayheadState {
    last_seen: f32,
    fired: HashSet<ImpulseKey>,
}

impl Default for PlayheadState {
    fn default() -> Self {
        Self {
            last_seen: START_CURSOR,
            fired: HashSet::new(),
        }
    }
}

impl PlayheadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self) -> f32 {
        self.last_seen
    }

    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }

    /// Scan `(last_seen, new_time]` for unfired impulses at or above
    /// `threshold`, mark them fired, then move the cursor to `new_time`.
    ///
    /// A backward move only repositions the cursor; impulses already fired
    /// stay fired until [`PlayheadState::reset`].
    pub fn advance(&mut self, new_time: f32, tracks: &[BandTrack], threshold: f32) -> Vec<FiredImpulse> {
        let mut fired = Vec::new();
        if new_time > self.last_seen {
            for track in tracks {
                for impulse in track.between(self.last_seen, new_time) {
                    if impulse.strength < threshold {
                        continue;
                    }
                    let key = (track.name.clone(), impulse.time.to_bits());
                    if self.fired.insert(key) {
                        fired.push(FiredImpulse {
                            band: track.name.clone(),
                            time: impulse.time,
                            strength: impulse.strength,
                        });
                    }
                }
            }
            fired.sort_by(|a, b| a.time.total_cmp(&b.time));
        }
        self.last_seen = new_time;
        fired
    }

    /// Move the cursor without firing anything in between.
    pub fn seek(&mut self, time: f32) {
        self.last_seen = time;
    }

    /// Forget everything, e.g. when a new file is loaded.
    pub fn reset(&mut self) {
        self.last_seen = START_CURSOR;
        self.fired.clear();
    }
}
