//! Scripted in-memory instrument used by the controller tests.

use chrono::NaiveDate;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{local_target, Connector, InstrumentLink, TransportError, TransportResult};
use crate::instrument::{
    BurstKind, BurstResult, Histogram, HousekeepingStatus, RadarConfig, ResetAck,
};

#[derive(Debug)]
pub(crate) struct FakeState {
    pub accepted_key: String,
    pub reachable: bool,
    pub config: RadarConfig,
    pub battery_voltage: f32,
    pub status_delay: Duration,
    pub fail_status: bool,
    pub fail_get_config: bool,
    pub fail_set_config: bool,
    pub fail_trigger: bool,
    pub config_delay: Duration,
    pub config_in_flight: usize,
    pub config_max_in_flight: usize,
    pub result_delay: Duration,
    pub storage_present: bool,
    pub status_calls: usize,
    pub status_in_flight: usize,
    pub status_max_in_flight: usize,
    pub set_config_calls: usize,
    pub triggers: usize,
    pub next_burst: u32,
    pub config_file: Vec<u8>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            accepted_key: "18052021".into(),
            reachable: true,
            config: RadarConfig::default(),
            battery_voltage: 12.0,
            status_delay: Duration::ZERO,
            fail_status: false,
            fail_get_config: false,
            fail_set_config: false,
            fail_trigger: false,
            config_delay: Duration::ZERO,
            config_in_flight: 0,
            config_max_in_flight: 0,
            result_delay: Duration::from_millis(20),
            storage_present: true,
            status_calls: 0,
            status_in_flight: 0,
            status_max_in_flight: 0,
            set_config_calls: 0,
            triggers: 0,
            next_burst: 1,
            config_file: b"[radar]\nnAttenuators=1\n".to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeInstrument {
    state: Arc<Mutex<FakeState>>,
}

impl FakeInstrument {
    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }
}

impl Connector for FakeInstrument {
    type Link = FakeLink;

    async fn connect(&self, _address: &Url, key: &str) -> TransportResult<FakeLink> {
        let (reachable, accepted) =
            self.with(|state| (state.reachable, state.accepted_key == key));
        if !reachable {
            return Err(TransportError::Unreachable("connection refused".into()));
        }
        if !accepted {
            return Err(TransportError::Unauthorized);
        }
        Ok(FakeLink {
            state: self.state.clone(),
            key: Mutex::new(key.to_string()),
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeLink {
    state: Arc<Mutex<FakeState>>,
    key: Mutex<String>,
}

impl FakeLink {
    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    /// Counts an in-flight config request and waits out `config_delay`.
    async fn config_request<R>(
        &self,
        f: impl FnOnce(&mut FakeState) -> TransportResult<R>,
    ) -> TransportResult<R> {
        let delay = self.with(|state| {
            state.config_in_flight += 1;
            state.config_max_in_flight = state.config_max_in_flight.max(state.config_in_flight);
            state.config_delay
        });
        tokio::time::sleep(delay).await;
        let outcome = self.authorize().and_then(|_| self.with(f));
        self.with(|state| state.config_in_flight -= 1);
        outcome
    }

    fn authorize(&self) -> TransportResult<()> {
        let key = self.key.lock().unwrap().clone();
        self.with(|state| {
            if !state.reachable {
                Err(TransportError::Unreachable("link lost".into()))
            } else if state.accepted_key != key {
                Err(TransportError::Unauthorized)
            } else {
                Ok(())
            }
        })
    }
}

fn clock() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 5, 18)
        .and_then(|day| day.and_hms_opt(12, 0, 0))
        .unwrap()
}

impl InstrumentLink for FakeLink {
    fn set_key(&self, key: &str) {
        *self.key.lock().unwrap() = key.to_string();
    }

    async fn status(&self) -> TransportResult<HousekeepingStatus> {
        let delay = self.with(|state| {
            state.status_calls += 1;
            state.status_in_flight += 1;
            state.status_max_in_flight = state.status_max_in_flight.max(state.status_in_flight);
            state.status_delay
        });
        tokio::time::sleep(delay).await;
        let outcome = self.authorize().and_then(|_| {
            self.with(|state| {
                if state.fail_status {
                    Err(TransportError::Unreachable("status read failed".into()))
                } else {
                    Ok(HousekeepingStatus {
                        battery_voltage: state.battery_voltage,
                        time_vab: Some(clock()),
                        time_gps: None,
                        latitude: -75.1,
                        longitude: 123.3,
                    })
                }
            })
        });
        self.with(|state| state.status_in_flight -= 1);
        outcome
    }

    async fn get_config(&self) -> TransportResult<RadarConfig> {
        self.config_request(|state| {
            if state.fail_get_config {
                Err(TransportError::Rejected {
                    status: 500,
                    message: "config unavailable".into(),
                })
            } else {
                Ok(state.config.clone())
            }
        })
        .await
    }

    async fn set_config(&self, config: &RadarConfig) -> TransportResult<RadarConfig> {
        self.config_request(|state| {
            state.set_config_calls += 1;
            if state.fail_set_config {
                return Err(TransportError::Rejected {
                    status: 422,
                    message: "attenuation out of range".into(),
                });
            }
            state.config = config.clone();
            Ok(state.config.clone())
        })
        .await
    }

    async fn trigger_burst(&self, _kind: BurstKind) -> TransportResult<()> {
        self.authorize()?;
        self.with(|state| {
            state.triggers += 1;
            if state.fail_trigger {
                Err(TransportError::Rejected {
                    status: 409,
                    message: "burst already in progress".into(),
                })
            } else {
                Ok(())
            }
        })
    }

    async fn wait_for_result(&self, kind: BurstKind) -> TransportResult<BurstResult> {
        let delay = self.with(|state| state.result_delay);
        tokio::time::sleep(delay).await;
        self.authorize()?;
        Ok(self.with(|state| {
            let filename = match kind {
                BurstKind::Trial => "trial.dat".to_string(),
                BurstKind::Persisted => {
                    let name = format!("burst_{:04}.dat", state.next_burst);
                    state.next_burst += 1;
                    name
                }
            };
            let count = state.config.n_attenuators();
            let chirp: Vec<f32> = (0..64)
                .map(|i| (i as f32 * 2.0 * std::f32::consts::PI * 8.0 / 64.0).sin())
                .collect();
            BurstResult {
                filename,
                start_frequency: 200e6,
                stop_frequency: 400e6,
                period: 1.0,
                attenuator_count: count,
                chirps: vec![chirp; count],
                histogram: Histogram::default(),
            }
        }))
    }

    async fn download_file(&self, remote_name: &str, local_dir: &Path) -> TransportResult<PathBuf> {
        self.authorize()?;
        if !self.with(|state| state.storage_present) {
            return Err(TransportError::NotFound(remote_name.to_string()));
        }
        let target = local_target(remote_name, local_dir)?;
        tokio::fs::write(&target, b"burst payload")
            .await
            .map_err(|err| TransportError::Malformed(err.to_string()))?;
        Ok(target)
    }

    async fn config_file(&self) -> TransportResult<Vec<u8>> {
        self.authorize()?;
        Ok(self.with(|state| state.config_file.clone()))
    }

    async fn upload_config_file(&self, contents: Vec<u8>) -> TransportResult<()> {
        self.authorize()?;
        self.with(|state| state.config_file = contents);
        Ok(())
    }

    async fn reset(&self) -> TransportResult<ResetAck> {
        self.authorize()?;
        Ok(ResetAck {
            time: clock(),
            message: "resetting".into(),
        })
    }
}
