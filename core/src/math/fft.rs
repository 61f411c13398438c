use num_complex::Complex32;
use rustfft::{num_traits::Zero, Fft, FftPlanner};

/// Helper that wraps the `rustfft` planner for reuse across chirps.
pub struct FftHelper {
    fft: std::sync::Arc<dyn Fft<f32>>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        Self { fft, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward transform of real samples, zero padded or truncated to the
    /// planned size.
    pub fn forward(&self, input: &[f32]) -> Vec<Complex32> {
        let mut buffer: Vec<Complex32> = input
            .iter()
            .take(self.size)
            .map(|&value| Complex32::new(value, 0.0))
            .collect();
        buffer.resize(self.size, Complex32::zero());
        self.fft.process(&mut buffer);
        buffer
    }
}
