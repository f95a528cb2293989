use crate::analysis::level::to_db;

/// Mean absolute amplitude of consecutive, non-overlapping frames.
pub struct FrameLevels {
    pub levels: Vec<f32>,
    pub db: Vec<f32>,
    pub times: Vec<f32>,
}

impl FrameLevels {
    /// The final frame may be shorter than `hop_size`; it is averaged over
    /// the samples it has so the whole clip is covered.
    pub fn measure(samples: &[f32], sample_rate: u32, hop_size: usize) -> Self {
        let levels: Vec<f32> = samples
            .chunks(hop_size)
            .map(|chunk| chunk.iter().map(|s| s.abs()).sum::<f32>() / chunk.len() as f32)
            .collect();
        let db = levels.iter().map(|&l| to_db(l)).collect();
        let times = frame_times(levels.len(), sample_rate, hop_size);
        Self { levels, db, times }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Level of the frame before `i`, or the floor for the first frame.
    pub fn previous_db(&self, i: usize) -> f32 {
        if i == 0 {
            crate::analysis::level::DB_FLOOR
        } else {
            self.db[i - 1]
        }
    }
}

pub fn frame_times(frames: usize, sample_rate: u32, hop_size: usize) -> Vec<f32> {
    let period = hop_size as f32 / sample_rate as f32;
    (0..frames).map(|i| i as f32 * period).collect()
}

/// `d[i] = x[i] - x[i-1]`, with `d[0] = 0`.
pub fn first_difference(series: &[f32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        out.push(if i == 0 { 0.0 } else { series[i] - series[i - 1] });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_partial_frame_is_kept() {
        let frames = FrameLevels::measure(&[1.0, -1.0, 0.5, 0.5, 0.2], 10, 2);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames.levels, vec![1.0, 0.5, 0.2]);
        assert!((frames.times[2] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn first_difference_starts_at_zero() {
        assert_eq!(first_difference(&[1.0, 3.0, 2.0]), vec![0.0, 2.0, -1.0]);
        assert!(first_difference(&[]).is_empty());
    }
}
