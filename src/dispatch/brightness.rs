use serde::{Deserialize, Serialize};

use crate::analysis::Impulse;

/// Min/max strength among the impulses currently in view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrengthRange {
    pub min: f32,
    pub max: f32,
}

impl StrengthRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// `None` when there are no impulses.
    pub fn from_impulses<'a>(impulses: impl IntoIterator<Item = &'a Impulse>) -> Option<Self> {
        impulses.into_iter().fold(None, |range, impulse| {
            let s = impulse.strength;
            Some(match range {
                None => Self::new(s, s),
                Some(r) => Self::new(r.min.min(s), r.max.max(s)),
            })
        })
    }
}

/// Strength to device brightness.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrightnessMapping {
    pub floor: u8,
    pub ceiling: u8,
    /// 0 keeps the linear mapping, 1 pins everything to `floor`.
    pub easing: f32,
}

impl Default for BrightnessMapping {
    fn default() -> Self {
        Self {
            floor: 31,
            ceiling: 255,
            easing: 0.25,
        }
    }
}

impl BrightnessMapping {
    pub fn map(&self, strength: f32, range: StrengthRange) -> u8 {
        let floor = self.floor.min(self.ceiling) as f32;
        let ceiling = self.ceiling.max(self.floor) as f32;
        let span = range.max - range.min;

        if !(span > f32::EPSILON) || !strength.is_finite() {
            return ((floor + ceiling) * 0.5).round() as u8;
        }

        let t = ((strength - range.min) / span).clamp(0.0, 1.0);
        let mapped = floor + t * (ceiling - floor);
        let easing = self.easing.clamp(0.0, 1.0);
        let eased = (mapped * (1.0 - easing) + floor * easing).round();
        eased.clamp(floor, ceiling) as u8
    }
}
