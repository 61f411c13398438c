use num_complex::Complex32;
use std::f32::consts::PI;

use crate::instrument::FmcwParameters;
use crate::math::fft::FftHelper;
use crate::math::stats::StatsHelper;

/// Relative permittivity of glacier ice.
pub const ICE_PERMITTIVITY: f64 = 3.18;
/// Zero-padding factor applied before the transform.
pub const PAD_FACTOR: usize = 2;

const SPEED_OF_LIGHT: f64 = 3e8;

/// Range bin spacing in metres for a chirp of `bandwidth` Hz.
pub fn range_bin_spacing(bandwidth: f64, permittivity: f64, pad: usize) -> f64 {
    if bandwidth <= 0.0 || permittivity <= 0.0 || pad == 0 {
        return 0.0;
    }
    SPEED_OF_LIGHT / (2.0 * bandwidth * pad as f64 * permittivity.sqrt())
}

/// Complex range profile of one chirp.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeProfile {
    pub bins: Vec<Complex32>,
    pub bin_spacing_m: f64,
}

impl RangeProfile {
    pub fn magnitudes(&self) -> Vec<f32> {
        self.bins.iter().map(|bin| bin.norm()).collect()
    }

    pub fn range_of(&self, bin: usize) -> f64 {
        bin as f64 * self.bin_spacing_m
    }

    /// Strongest bin, skipping the first `skip` near-field bins.
    pub fn peak(&self, skip: usize) -> Option<(usize, f64)> {
        self.bins
            .iter()
            .enumerate()
            .skip(skip)
            .max_by(|(_, a), (_, b)| a.norm().total_cmp(&b.norm()))
            .map(|(index, _)| (index, self.range_of(index)))
    }
}

/// Range profile of a single chirp: mean removal, Hann window, zero padding
/// by [`PAD_FACTOR`], forward FFT, positive-frequency half.
pub fn compute_range_profile(
    chirp: &[f32],
    params: &FmcwParameters,
    permittivity: f64,
) -> RangeProfile {
    let bin_spacing_m = range_bin_spacing(params.bandwidth, permittivity, PAD_FACTOR);
    if chirp.is_empty() {
        return RangeProfile {
            bins: Vec::new(),
            bin_spacing_m,
        };
    }

    let mean = StatsHelper::mean(chirp);
    let n = chirp.len();
    let window: Vec<f32> = (0..n)
        .map(|i| {
            if n > 1 {
                0.5 - 0.5 * (2.0 * PI * i as f32 / (n - 1) as f32).cos()
            } else {
                1.0
            }
        })
        .collect();
    let gain: f32 = window.iter().sum::<f32>().max(f32::MIN_POSITIVE);
    let windowed: Vec<f32> = chirp
        .iter()
        .zip(&window)
        .map(|(&sample, &w)| (sample - mean) * w)
        .collect();

    let fft = FftHelper::new(n * PAD_FACTOR);
    let mut bins = fft.forward(&windowed);
    bins.truncate(fft.size() / 2);
    for bin in &mut bins {
        *bin /= gain;
    }
    RangeProfile {
        bins,
        bin_spacing_m,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FmcwParameters {
        FmcwParameters {
            centre_frequency: 300e6,
            bandwidth: 200e6,
            period: 1.0,
        }
    }

    #[test]
    fn bin_spacing_matches_ice_formula() {
        let spacing = range_bin_spacing(200e6, ICE_PERMITTIVITY, 2);
        let expected = 3e8 / (2.0 * 200e6 * 2.0 * ICE_PERMITTIVITY.sqrt());
        assert!((spacing - expected).abs() < 1e-12);
        assert_eq!(range_bin_spacing(0.0, ICE_PERMITTIVITY, 2), 0.0);
    }

    #[test]
    fn tone_peaks_at_padded_bin() {
        let chirp: Vec<f32> = (0..64)
            .map(|i| 1.0 + (2.0 * PI * 8.0 * i as f32 / 64.0).sin())
            .collect();
        let profile = compute_range_profile(&chirp, &params(), ICE_PERMITTIVITY);
        assert_eq!(profile.bins.len(), 64);
        let (bin, range) = profile.peak(1).unwrap();
        assert_eq!(bin, 16);
        assert!((range - 16.0 * profile.bin_spacing_m).abs() < 1e-9);
    }

    #[test]
    fn empty_chirp_yields_empty_profile() {
        let profile = compute_range_profile(&[], &params(), ICE_PERMITTIVITY);
        assert!(profile.bins.is_empty());
        assert!(profile.peak(0).is_none());
    }
}
