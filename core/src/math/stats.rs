/// Minimum, maximum and mean of a sample window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f32>() / samples.len() as f32
    }

    pub fn summarize(samples: &[f32]) -> Option<Summary> {
        if samples.is_empty() {
            return None;
        }
        let min = samples.iter().copied().fold(f32::INFINITY, f32::min);
        let max = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Some(Summary {
            min,
            max,
            mean: Self::mean(samples),
        })
    }
}
