use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the session controller and its components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub request_timeout_ms: u64,
    pub acquisition_timeout_ms: u64,
    pub telemetry_interval_ms: u64,
    pub history_capacity: usize,
    pub result_poll_interval_ms: u64,
    pub burst_extension: String,
    pub survey_directory: Option<PathBuf>,
    /// Lets trial and persisted bursts run at the same time. Only enable
    /// when the instrument firmware is known to support it.
    pub concurrent_acquisitions: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            acquisition_timeout_ms: 120_000,
            telemetry_interval_ms: 5_000,
            history_capacity: 256,
            result_poll_interval_ms: 500,
            burst_extension: "dat".into(),
            survey_directory: None,
            concurrent_acquisitions: false,
        }
    }
}

impl ControllerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_millis(self.acquisition_timeout_ms.max(1))
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms.max(1))
    }

    pub fn result_poll_interval(&self) -> Duration {
        Duration::from_millis(self.result_poll_interval_ms.max(1))
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity.max(1)
    }

    /// Configured survey directory, or `~/ApRES/Survey_<today>`.
    pub fn survey_directory(&self) -> PathBuf {
        self.survey_directory
            .clone()
            .unwrap_or_else(default_survey_directory)
    }
}

pub fn default_survey_directory() -> PathBuf {
    let day = chrono::Local::now().format("%Y-%m-%d");
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ApRES")
        .join(format!("Survey_{day}"))
}
