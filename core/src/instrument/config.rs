use serde::{Deserialize, Serialize};
use std::fmt;

use crate::prelude::{ConsoleError, ConsoleResult};

/// Highest number of attenuator slots the instrument exposes.
pub const MAX_ATTENUATORS: usize = 4;
/// Number of transmit/receive antenna ports.
pub const ANTENNA_PORTS: usize = 8;
/// Upper bound of the RF attenuator in dB.
pub const RF_ATTENUATION_MAX: f32 = 31.75;

const DEFAULT_RF_ATTENUATION: f32 = 10.0;

/// Audio-frequency gain stage setting, restricted to the values the
/// instrument firmware accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum AfGain {
    Minus14,
    Minus4,
    Plus6,
}

impl AfGain {
    pub const ALL: [AfGain; 3] = [AfGain::Minus14, AfGain::Minus4, AfGain::Plus6];

    pub fn db(self) -> i32 {
        match self {
            AfGain::Minus14 => -14,
            AfGain::Minus4 => -4,
            AfGain::Plus6 => 6,
        }
    }
}

impl Default for AfGain {
    fn default() -> Self {
        AfGain::Minus4
    }
}

impl TryFrom<i32> for AfGain {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        AfGain::ALL
            .into_iter()
            .find(|gain| gain.db() == value)
            .ok_or_else(|| format!("AF gain must be one of -14, -4 or 6 dB, got {value}"))
    }
}

impl From<AfGain> for i32 {
    fn from(gain: AfGain) -> Self {
        gain.db()
    }
}

impl fmt::Display for AfGain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} dB", self.db())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MaskError {
    #[error("antenna port {0} is out of range (0..8)")]
    OutOfRange(usize),
    #[error("at least one antenna port must stay enabled")]
    LastPort,
    #[error("mask needs exactly 8 flags, got {0}")]
    Length(usize),
    #[error("flag values must be 0 or 1")]
    NotBinary,
}

/// Eight independently toggleable antenna flags, never all cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct AntennaMask([bool; ANTENNA_PORTS]);

impl AntennaMask {
    pub fn single(port: usize) -> Result<Self, MaskError> {
        if port >= ANTENNA_PORTS {
            return Err(MaskError::OutOfRange(port));
        }
        let mut flags = [false; ANTENNA_PORTS];
        flags[port] = true;
        Ok(Self(flags))
    }

    pub fn from_flags(flags: [bool; ANTENNA_PORTS]) -> Result<Self, MaskError> {
        if flags.iter().any(|&on| on) {
            Ok(Self(flags))
        } else {
            Err(MaskError::LastPort)
        }
    }

    pub fn flags(&self) -> [bool; ANTENNA_PORTS] {
        self.0
    }

    pub fn is_enabled(&self, port: usize) -> bool {
        self.0.get(port).copied().unwrap_or(false)
    }

    pub fn enabled_count(&self) -> usize {
        self.0.iter().filter(|&&on| on).count()
    }

    /// Sets one port, refusing to clear the last enabled one. On refusal the
    /// mask is left exactly as it was.
    pub fn set(&mut self, port: usize, enabled: bool) -> Result<(), MaskError> {
        let current = *self.0.get(port).ok_or(MaskError::OutOfRange(port))?;
        if current && !enabled && self.enabled_count() == 1 {
            return Err(MaskError::LastPort);
        }
        self.0[port] = enabled;
        Ok(())
    }

    /// Flips one port and returns its new state.
    pub fn toggle(&mut self, port: usize) -> Result<bool, MaskError> {
        let next = !self.is_enabled(port);
        self.set(port, next)?;
        Ok(next)
    }
}

impl Default for AntennaMask {
    fn default() -> Self {
        let mut flags = [false; ANTENNA_PORTS];
        flags[0] = true;
        Self(flags)
    }
}

impl TryFrom<Vec<u8>> for AntennaMask {
    type Error = MaskError;

    fn try_from(values: Vec<u8>) -> Result<Self, Self::Error> {
        if values.len() != ANTENNA_PORTS {
            return Err(MaskError::Length(values.len()));
        }
        let mut flags = [false; ANTENNA_PORTS];
        for (flag, value) in flags.iter_mut().zip(values) {
            *flag = match value {
                0 => false,
                1 => true,
                _ => return Err(MaskError::NotBinary),
            };
        }
        AntennaMask::from_flags(flags)
    }
}

impl From<AntennaMask> for Vec<u8> {
    fn from(mask: AntennaMask) -> Self {
        mask.0.iter().map(|&on| u8::from(on)).collect()
    }
}

impl fmt::Display for AntennaMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for on in self.0 {
            f.write_str(if on { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Radar burst configuration as stored on the instrument.
///
/// The attenuator vectors are private so their length can only change
/// together with `n_attenuators`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarConfig {
    pub n_averages: u32,
    pub n_sub_bursts: u32,
    n_attenuators: usize,
    rf_attenuation: Vec<f32>,
    af_gain: Vec<AfGain>,
    pub tx_antenna: AntennaMask,
    pub rx_antenna: AntennaMask,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            n_averages: 1,
            n_sub_bursts: 10,
            n_attenuators: 1,
            rf_attenuation: vec![DEFAULT_RF_ATTENUATION],
            af_gain: vec![AfGain::default()],
            tx_antenna: AntennaMask::default(),
            rx_antenna: AntennaMask::default(),
        }
    }
}

impl RadarConfig {
    pub fn n_attenuators(&self) -> usize {
        self.n_attenuators
    }

    pub fn rf_attenuation(&self) -> &[f32] {
        &self.rf_attenuation
    }

    pub fn af_gain(&self) -> &[AfGain] {
        &self.af_gain
    }

    /// Replaces every attenuator slot at once; the count follows the slices.
    pub fn set_attenuators(&mut self, rf_attenuation: &[f32], af_gain: &[AfGain]) -> ConsoleResult<()> {
        if rf_attenuation.len() != af_gain.len() {
            return Err(ConsoleError::invalid(
                "af_gain",
                format!(
                    "{} AF gains given for {} RF attenuations",
                    af_gain.len(),
                    rf_attenuation.len()
                ),
            ));
        }
        check_attenuator_count(rf_attenuation.len())?;
        for &value in rf_attenuation {
            check_rf_attenuation(value)?;
        }
        self.n_attenuators = rf_attenuation.len();
        self.rf_attenuation = rf_attenuation.to_vec();
        self.af_gain = af_gain.to_vec();
        Ok(())
    }

    /// Truncates or extends the attenuator slots, keeping existing values
    /// and filling new slots with defaults.
    pub fn resize_attenuators(&mut self, count: usize) -> ConsoleResult<()> {
        check_attenuator_count(count)?;
        self.rf_attenuation.resize(count, DEFAULT_RF_ATTENUATION);
        self.af_gain.resize(count, AfGain::default());
        self.n_attenuators = count;
        Ok(())
    }

    /// Checks every local invariant without touching the device.
    pub fn validate(&self) -> ConsoleResult<()> {
        if self.n_averages < 1 {
            return Err(ConsoleError::invalid("n_averages", "must be at least 1"));
        }
        if self.n_sub_bursts < 1 {
            return Err(ConsoleError::invalid("n_sub_bursts", "must be at least 1"));
        }
        check_attenuator_count(self.n_attenuators)?;
        if self.rf_attenuation.len() != self.n_attenuators {
            return Err(ConsoleError::invalid(
                "rf_attenuation",
                format!(
                    "{} values for {} attenuators",
                    self.rf_attenuation.len(),
                    self.n_attenuators
                ),
            ));
        }
        if self.af_gain.len() != self.n_attenuators {
            return Err(ConsoleError::invalid(
                "af_gain",
                format!(
                    "{} values for {} attenuators",
                    self.af_gain.len(),
                    self.n_attenuators
                ),
            ));
        }
        for &value in &self.rf_attenuation {
            check_rf_attenuation(value)?;
        }
        if self.tx_antenna.enabled_count() == 0 {
            return Err(ConsoleError::invalid("tx_antenna", MaskError::LastPort.to_string()));
        }
        if self.rx_antenna.enabled_count() == 0 {
            return Err(ConsoleError::invalid("rx_antenna", MaskError::LastPort.to_string()));
        }
        Ok(())
    }

    /// Starts an editing session seeded from this configuration.
    pub fn draft(&self) -> ConfigDraft {
        ConfigDraft::from_config(self)
    }
}

fn check_attenuator_count(count: usize) -> ConsoleResult<()> {
    if (1..=MAX_ATTENUATORS).contains(&count) {
        Ok(())
    } else {
        Err(ConsoleError::invalid(
            "n_attenuators",
            format!("must be within 1..={MAX_ATTENUATORS}, got {count}"),
        ))
    }
}

fn check_rf_attenuation(value: f32) -> ConsoleResult<()> {
    if value.is_finite() && (0.0..=RF_ATTENUATION_MAX).contains(&value) {
        Ok(())
    } else {
        Err(ConsoleError::invalid(
            "rf_attenuation",
            format!("{value} dB is outside 0..={RF_ATTENUATION_MAX} dB"),
        ))
    }
}

/// Operator-side editing state for a [`RadarConfig`].
///
/// All four attenuator slots are kept, so lowering the count and raising it
/// again restores the earlier values. A fresh fetch starts a new draft.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDraft {
    pub n_averages: u32,
    pub n_sub_bursts: u32,
    n_attenuators: usize,
    rf_slots: [f32; MAX_ATTENUATORS],
    af_slots: [AfGain; MAX_ATTENUATORS],
    tx_antenna: AntennaMask,
    rx_antenna: AntennaMask,
}

impl ConfigDraft {
    pub fn from_config(config: &RadarConfig) -> Self {
        let mut rf_slots = [DEFAULT_RF_ATTENUATION; MAX_ATTENUATORS];
        let mut af_slots = [AfGain::default(); MAX_ATTENUATORS];
        for (slot, value) in rf_slots.iter_mut().zip(config.rf_attenuation()) {
            *slot = *value;
        }
        for (slot, value) in af_slots.iter_mut().zip(config.af_gain()) {
            *slot = *value;
        }
        Self {
            n_averages: config.n_averages,
            n_sub_bursts: config.n_sub_bursts,
            n_attenuators: config.n_attenuators().clamp(1, MAX_ATTENUATORS),
            rf_slots,
            af_slots,
            tx_antenna: config.tx_antenna,
            rx_antenna: config.rx_antenna,
        }
    }

    pub fn attenuator_count(&self) -> usize {
        self.n_attenuators
    }

    pub fn set_attenuator_count(&mut self, count: usize) -> ConsoleResult<()> {
        check_attenuator_count(count)?;
        self.n_attenuators = count;
        Ok(())
    }

    pub fn rf_attenuation(&self) -> &[f32] {
        &self.rf_slots[..self.n_attenuators]
    }

    pub fn af_gain(&self) -> &[AfGain] {
        &self.af_slots[..self.n_attenuators]
    }

    pub fn set_rf_attenuation(&mut self, slot: usize, value: f32) -> ConsoleResult<()> {
        self.check_slot("rf_attenuation", slot)?;
        check_rf_attenuation(value)?;
        self.rf_slots[slot] = value;
        Ok(())
    }

    pub fn set_af_gain(&mut self, slot: usize, gain: AfGain) -> ConsoleResult<()> {
        self.check_slot("af_gain", slot)?;
        self.af_slots[slot] = gain;
        Ok(())
    }

    pub fn tx_antenna(&self) -> AntennaMask {
        self.tx_antenna
    }

    pub fn rx_antenna(&self) -> AntennaMask {
        self.rx_antenna
    }

    pub fn toggle_tx(&mut self, port: usize) -> ConsoleResult<bool> {
        self.tx_antenna
            .toggle(port)
            .map_err(|err| ConsoleError::invalid("tx_antenna", err.to_string()))
    }

    pub fn toggle_rx(&mut self, port: usize) -> ConsoleResult<bool> {
        self.rx_antenna
            .toggle(port)
            .map_err(|err| ConsoleError::invalid("rx_antenna", err.to_string()))
    }

    pub fn set_tx_antenna(&mut self, mask: AntennaMask) {
        self.tx_antenna = mask;
    }

    pub fn set_rx_antenna(&mut self, mask: AntennaMask) {
        self.rx_antenna = mask;
    }

    /// Materialises the visible slots into a configuration ready for `apply`.
    pub fn to_config(&self) -> RadarConfig {
        RadarConfig {
            n_averages: self.n_averages,
            n_sub_bursts: self.n_sub_bursts,
            n_attenuators: self.n_attenuators,
            rf_attenuation: self.rf_attenuation().to_vec(),
            af_gain: self.af_gain().to_vec(),
            tx_antenna: self.tx_antenna,
            rx_antenna: self.rx_antenna,
        }
    }

    fn check_slot(&self, field: &'static str, slot: usize) -> ConsoleResult<()> {
        if slot < self.n_attenuators {
            Ok(())
        } else {
            Err(ConsoleError::invalid(
                field,
                format!("slot {slot} is not active with {} attenuators", self.n_attenuators),
            ))
        }
    }
}
