use serde::{Deserialize, Serialize};
use std::fmt;

/// Which acquisition workflow a burst belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurstKind {
    /// Quick look burst, results returned but nothing stored.
    Trial,
    /// Burst written to the instrument's storage and downloaded afterwards.
    Persisted,
}

impl fmt::Display for BurstKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurstKind::Trial => f.write_str("trial"),
            BurstKind::Persisted => f.write_str("persisted"),
        }
    }
}

/// ADC voltage histogram, one count vector per attenuator setting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub voltages: Vec<f32>,
    pub counts: Vec<Vec<u32>>,
}

/// Frequency-modulated continuous-wave parameters of a chirp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FmcwParameters {
    pub centre_frequency: f64,
    pub bandwidth: f64,
    pub period: f64,
}

/// Data returned by the instrument once a burst completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstResult {
    pub filename: String,
    pub start_frequency: f64,
    pub stop_frequency: f64,
    pub period: f64,
    pub attenuator_count: usize,
    /// One averaged chirp per attenuator setting.
    pub chirps: Vec<Vec<f32>>,
    #[serde(default)]
    pub histogram: Histogram,
}

impl BurstResult {
    pub fn fmcw_parameters(&self) -> FmcwParameters {
        FmcwParameters {
            centre_frequency: (self.stop_frequency + self.start_frequency) / 2.0,
            bandwidth: self.stop_frequency - self.start_frequency,
            period: self.period,
        }
    }

    pub fn check_shape(&self) -> Result<(), String> {
        if self.chirps.len() != self.attenuator_count {
            return Err(format!(
                "{} chirps for {} attenuators",
                self.chirps.len(),
                self.attenuator_count
            ));
        }
        if self.stop_frequency <= self.start_frequency {
            return Err("stop frequency must exceed start frequency".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BurstResult {
        BurstResult {
            filename: "burst_0001.dat".into(),
            start_frequency: 200e6,
            stop_frequency: 400e6,
            period: 1.0,
            attenuator_count: 2,
            chirps: vec![vec![0.0; 4], vec![0.0; 4]],
            histogram: Histogram::default(),
        }
    }

    #[test]
    fn fmcw_parameters_follow_sweep() {
        let params = sample().fmcw_parameters();
        assert_eq!(params.centre_frequency, 300e6);
        assert_eq!(params.bandwidth, 200e6);
    }

    #[test]
    fn chirp_count_must_match_attenuators() {
        let mut result = sample();
        assert!(result.check_shape().is_ok());
        result.chirps.pop();
        assert!(result.check_shape().is_err());
    }

    #[test]
    fn kind_uses_lowercase_wire_names() {
        assert_eq!(serde_json::to_string(&BurstKind::Persisted).unwrap(), "\"persisted\"");
    }
}
