use serde::{Deserialize, Serialize};

/// Level floor; magnitudes at or below 1e-4 all read as this.
pub const DB_FLOOR: f32 = -80.0;

/// `20*log10(magnitude)`, clamped to [`DB_FLOOR`].
pub fn to_db(magnitude: f32) -> f32 {
    if magnitude <= 0.0 || !magnitude.is_finite() {
        return DB_FLOOR;
    }
    (20.0 * magnitude.log10()).max(DB_FLOOR)
}

/// Absolute-level and level-change gate applied before anything is flagged.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseGate {
    /// Frames quieter than this (dB) are never onsets.
    pub min_db: f32,
    /// Minimum rise in dB over the previous frame.
    pub min_db_delta: f32,
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self {
            min_db: -60.0,
            min_db_delta: 3.0,
        }
    }
}

impl NoiseGate {
    pub fn admits_level(&self, level_db: f32) -> bool {
        level_db >= self.min_db
    }

    pub fn admits_change(&self, level_db: f32, previous_db: f32) -> bool {
        level_db - previous_db >= self.min_db_delta
    }

    pub fn admits(&self, level_db: f32, previous_db: f32) -> bool {
        self.admits_level(level_db) && self.admits_change(level_db, previous_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_of_unity_is_zero() {
        assert!(to_db(1.0).abs() < 1e-6);
        assert!((to_db(0.1) + 20.0).abs() < 1e-4);
    }

    #[test]
    fn zero_and_nan_clamp_to_floor() {
        assert_eq!(to_db(0.0), DB_FLOOR);
        assert_eq!(to_db(1e-9), DB_FLOOR);
        assert_eq!(to_db(f32::NAN), DB_FLOOR);
    }

    #[test]
    fn gate_requires_level_and_rise() {
        let gate = NoiseGate {
            min_db: -40.0,
            min_db_delta: 6.0,
        };
        assert!(gate.admits(-10.0, -30.0));
        assert!(!gate.admits(-50.0, -80.0));
        assert!(!gate.admits(-10.0, -12.0));
    }
}
