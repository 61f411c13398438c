//! State of the emulated instrument, independent of HTTP.

use aprescore::instrument::{BurstKind, BurstResult, HousekeepingStatus, RadarConfig, ResetAck};
use chrono::Utc;
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::time::Instant;

use crate::config::SimulatorConfig;
use crate::generator::chirp::{synthesize_burst, ADC_FULL_SCALE};

/// Answer to a results poll.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPoll {
    Pending,
    Ready(BurstResult),
    NeverTriggered,
}

#[derive(Debug, Clone, Copy)]
struct PendingBurst {
    kind: BurstKind,
    ready_at: Instant,
}

pub struct Instrument {
    config: SimulatorConfig,
    radar: RadarConfig,
    battery: f32,
    rng: StdRng,
    pending: Option<PendingBurst>,
    results: HashMap<BurstKind, BurstResult>,
    files: BTreeMap<String, Vec<u8>>,
    next_burst: u32,
    config_ini: String,
    sd_card_present: bool,
}

impl Instrument {
    pub fn new(config: SimulatorConfig) -> Self {
        let radar = RadarConfig::default();
        let config_ini = render_config_ini(&radar);
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            battery: config.battery_voltage,
            sd_card_present: config.sd_card_present,
            config,
            radar,
            pending: None,
            results: HashMap::new(),
            files: BTreeMap::new(),
            next_burst: 1,
            config_ini,
        }
    }

    pub fn accepts(&self, key: Option<&str>) -> bool {
        key == Some(self.config.api_key.as_str())
    }

    pub fn set_sd_card_present(&mut self, present: bool) {
        self.sd_card_present = present;
    }

    /// Housekeeping read; the battery wanders around its nominal voltage.
    pub fn status(&mut self) -> HousekeepingStatus {
        let nominal = self.config.battery_voltage;
        let drift = self.rng.gen_range(-0.02f32..0.02);
        self.battery += drift + (nominal - self.battery) * 0.1;
        let now = Utc::now().naive_utc();
        HousekeepingStatus {
            battery_voltage: self.battery,
            time_vab: Some(now),
            time_gps: self.config.gps_fix.then_some(now),
            latitude: self.config.latitude,
            longitude: self.config.longitude,
        }
    }

    pub fn radar_config(&self) -> RadarConfig {
        self.radar.clone()
    }

    pub fn set_radar_config(&mut self, candidate: RadarConfig) -> Result<RadarConfig, String> {
        candidate.validate().map_err(|err| err.to_string())?;
        info!(
            "radar config updated: {} attenuators, {} sub-bursts",
            candidate.n_attenuators(),
            candidate.n_sub_bursts
        );
        self.radar = candidate;
        Ok(self.radar.clone())
    }

    /// Starts a burst unless one is already running, in which case the
    /// running kind is returned.
    pub fn trigger(&mut self, kind: BurstKind, now: Instant) -> Result<(), BurstKind> {
        if let Some(pending) = self.pending {
            return Err(pending.kind);
        }
        let duration = match kind {
            BurstKind::Trial => self.config.trial_duration(),
            BurstKind::Persisted => self.config.burst_duration(),
        };
        debug!("{} burst started, {:?} to go", kind, duration);
        self.pending = Some(PendingBurst {
            kind,
            ready_at: now + duration,
        });
        Ok(())
    }

    pub fn poll_result(&mut self, kind: BurstKind, now: Instant) -> ResultPoll {
        match self.pending {
            Some(pending) if pending.kind == kind => {
                if now < pending.ready_at {
                    return ResultPoll::Pending;
                }
                self.pending = None;
                let result = self.complete(kind);
                self.results.insert(kind, result.clone());
                ResultPoll::Ready(result)
            }
            _ => match self.results.get(&kind) {
                Some(result) => ResultPoll::Ready(result.clone()),
                None => ResultPoll::NeverTriggered,
            },
        }
    }

    fn complete(&mut self, kind: BurstKind) -> BurstResult {
        let burst = synthesize_burst(&self.config, &self.radar, &mut self.rng);
        let filename = match kind {
            BurstKind::Trial => "trial.dat".to_string(),
            BurstKind::Persisted => {
                let name = format!("burst_{:04}.dat", self.next_burst);
                self.next_burst += 1;
                name
            }
        };
        let result = BurstResult {
            filename,
            start_frequency: self.config.start_frequency,
            stop_frequency: self.config.stop_frequency,
            period: self.config.period,
            attenuator_count: self.radar.n_attenuators(),
            chirps: burst.chirps,
            histogram: burst.histogram,
        };
        if kind == BurstKind::Persisted {
            if self.sd_card_present {
                let bytes = encode_burst_file(&self.radar, &result);
                info!("stored {} ({} bytes)", result.filename, bytes.len());
                self.files.insert(result.filename.clone(), bytes);
            } else {
                info!("no storage media, {} not written", result.filename);
            }
        }
        result
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.files.get(name).cloned()
    }

    pub fn config_ini(&self) -> String {
        self.config_ini.clone()
    }

    pub fn upload_config_ini(&mut self, contents: String) {
        self.config_ini = contents;
    }

    /// Drops any running burst and applies the stored `config.ini`.
    pub fn reset(&mut self) -> ResetAck {
        self.pending = None;
        let applied = apply_config_ini(&self.config_ini, &mut self.radar);
        info!("instrument reset, {} settings applied from config.ini", applied);
        ResetAck {
            time: Utc::now().naive_utc(),
            message: format!("instrument restarting ({applied} settings from config.ini)"),
        }
    }
}

/// Stored burst layout: a text header followed by 16-bit little-endian ADC
/// counts, chirp after chirp.
pub fn encode_burst_file(radar: &RadarConfig, result: &BurstResult) -> Vec<u8> {
    let mut header = String::from("*** Burst Header ***\r\n");
    let _ = write!(
        header,
        "Time stamp={}\r\nN_ADC_SAMPLES={}\r\nNSubBursts={}\r\nAverage={}\r\nnAttenuators={}\r\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S"),
        result.chirps.first().map(Vec::len).unwrap_or(0),
        radar.n_sub_bursts,
        radar.n_averages,
        radar.n_attenuators(),
    );
    let _ = write!(
        header,
        "Attenuator1={}\r\nAFGain={}\r\n*** End Header ***\r\n",
        join(radar.rf_attenuation().iter()),
        join(radar.af_gain().iter().map(|gain| gain.db())),
    );

    let mut bytes = header.into_bytes();
    for sample in result.chirps.iter().flatten() {
        let count = (sample / ADC_FULL_SCALE * u16::MAX as f32).round() as u16;
        bytes.extend_from_slice(&count.to_le_bytes());
    }
    bytes
}

fn join<T: ToString>(values: impl Iterator<Item = T>) -> String {
    values
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn mask_string(flags: [bool; 8]) -> String {
    join(flags.iter().map(|&on| u8::from(on)))
}

pub fn render_config_ini(radar: &RadarConfig) -> String {
    format!(
        "[Radar]\r\nNAverages={}\r\nNSubBursts={}\r\nnAttenuators={}\r\nAttenuator1={}\r\nAFGain={}\r\nTxAnt={}\r\nRxAnt={}\r\n",
        radar.n_averages,
        radar.n_sub_bursts,
        radar.n_attenuators(),
        join(radar.rf_attenuation().iter()),
        join(radar.af_gain().iter().map(|gain| gain.db())),
        mask_string(radar.tx_antenna.flags()),
        mask_string(radar.rx_antenna.flags()),
    )
}

/// Applies the recognised `key=value` lines, returning how many took.
fn apply_config_ini(contents: &str, radar: &mut RadarConfig) -> usize {
    let mut applied = 0;
    for line in contents.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<u32>() else {
            continue;
        };
        match key.trim() {
            "NAverages" if value >= 1 => {
                radar.n_averages = value;
                applied += 1;
            }
            "NSubBursts" if value >= 1 => {
                radar.n_sub_bursts = value;
                applied += 1;
            }
            "nAttenuators" if radar.resize_attenuators(value as usize).is_ok() => {
                applied += 1;
            }
            _ => {}
        }
    }
    applied
}
