use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Housekeeping telemetry reported by the instrument. Replaced wholesale on
/// every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HousekeepingStatus {
    pub battery_voltage: f32,
    #[serde(default)]
    pub time_vab: Option<NaiveDateTime>,
    #[serde(default)]
    pub time_gps: Option<NaiveDateTime>,
    pub latitude: f64,
    pub longitude: f64,
}

impl HousekeepingStatus {
    pub fn has_gps_fix(&self) -> bool {
        self.time_gps.is_some()
    }
}

/// Acknowledgement returned when the instrument accepts a reset request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetAck {
    pub time: NaiveDateTime,
    pub message: String,
}

/// Display format used for instrument timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(value: Option<&NaiveDateTime>) -> String {
    value
        .map(|time| time.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| "[Not available]".to_string())
}
