use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Behaviour of the emulated instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub bind: SocketAddr,
    pub api_key: String,
    pub burst_ms: u64,
    pub trial_ms: u64,
    pub samples_per_chirp: usize,
    pub start_frequency: f64,
    pub stop_frequency: f64,
    pub period: f64,
    /// Reflector depths in metres.
    pub reflectors: Vec<f64>,
    pub noise: f32,
    pub seed: u64,
    pub sd_card_present: bool,
    pub gps_fix: bool,
    pub battery_voltage: f32,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            api_key: "18052021".into(),
            burst_ms: 3_000,
            trial_ms: 1_000,
            samples_per_chirp: 4_000,
            start_frequency: 200e6,
            stop_frequency: 400e6,
            period: 1.0,
            reflectors: vec![150.0, 420.0, 700.0],
            noise: 0.01,
            seed: 0,
            sd_card_present: true,
            gps_fix: true,
            battery_voltage: 12.4,
            latitude: -75.1,
            longitude: 123.35,
        }
    }
}

impl SimulatorConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading simulator config {}", path_ref.display()))?;
        let config: SimulatorConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing simulator config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn burst_duration(&self) -> Duration {
        Duration::from_millis(self.burst_ms)
    }

    pub fn trial_duration(&self) -> Duration {
        Duration::from_millis(self.trial_ms)
    }
}
