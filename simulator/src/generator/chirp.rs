use aprescore::instrument::{Histogram, RadarConfig};
use aprescore::processing::ICE_PERMITTIVITY;
use rand::{rngs::StdRng, Rng};
use std::f64::consts::PI;

use crate::config::SimulatorConfig;

const SPEED_OF_LIGHT: f64 = 3e8;
/// ADC full scale in volts.
pub const ADC_FULL_SCALE: f32 = 2.5;
const HISTOGRAM_BINS: usize = 50;

/// Deramped chirp samples for one burst, one averaged chirp per attenuator.
pub struct SyntheticBurst {
    pub chirps: Vec<Vec<f32>>,
    pub histogram: Histogram,
}

/// Beat cycles over one chirp for a reflector at `depth` metres of ice.
fn beat_cycles(depth: f64, bandwidth: f64) -> f64 {
    2.0 * depth * ICE_PERMITTIVITY.sqrt() * bandwidth / SPEED_OF_LIGHT
}

fn stage_gain(rf_attenuation: f32, af_gain_db: i32) -> f64 {
    10f64.powf((af_gain_db as f64 - rf_attenuation as f64) / 20.0)
}

fn build_chirp(
    config: &SimulatorConfig,
    gain: f64,
    averages: u32,
    rng: &mut StdRng,
) -> Vec<f32> {
    let samples = config.samples_per_chirp.max(1);
    let bandwidth = config.stop_frequency - config.start_frequency;
    let noise = config.noise / (averages.max(1) as f32).sqrt();
    let centre = ADC_FULL_SCALE / 2.0;

    (0..samples)
        .map(|index| {
            let t = index as f64 / samples as f64;
            let echo: f64 = config
                .reflectors
                .iter()
                .enumerate()
                .map(|(order, &depth)| {
                    // Deeper reflectors return weaker echoes.
                    let amplitude = 0.4 / (1.0 + order as f64);
                    amplitude * (2.0 * PI * beat_cycles(depth, bandwidth) * t).sin()
                })
                .sum();
            let jitter = if noise > 0.0 {
                rng.gen_range(-noise..noise)
            } else {
                0.0
            };
            (centre + (echo * gain) as f32 + jitter).clamp(0.0, ADC_FULL_SCALE)
        })
        .collect()
}

fn histogram(chirps: &[Vec<f32>]) -> Histogram {
    let step = ADC_FULL_SCALE / HISTOGRAM_BINS as f32;
    let voltages = (0..HISTOGRAM_BINS)
        .map(|bin| (bin as f32 + 0.5) * step)
        .collect();
    let counts = chirps
        .iter()
        .map(|chirp| {
            let mut counts = vec![0u32; HISTOGRAM_BINS];
            for &sample in chirp {
                let bin = ((sample / step) as usize).min(HISTOGRAM_BINS - 1);
                counts[bin] += 1;
            }
            counts
        })
        .collect();
    Histogram { voltages, counts }
}

/// Synthesises a burst for the current radar configuration. Each attenuator
/// slot scales the echoes by its RF attenuation and AF gain.
pub fn synthesize_burst(
    config: &SimulatorConfig,
    radar: &RadarConfig,
    rng: &mut StdRng,
) -> SyntheticBurst {
    let chirps: Vec<Vec<f32>> = radar
        .rf_attenuation()
        .iter()
        .zip(radar.af_gain())
        .map(|(&attenuation, gain)| {
            build_chirp(
                config,
                stage_gain(attenuation, gain.db()),
                radar.n_averages,
                rng,
            )
        })
        .collect();
    let histogram = histogram(&chirps);
    SyntheticBurst { chirps, histogram }
}
