pub mod burst;
pub mod config;
pub mod status;

pub use burst::{BurstKind, BurstResult, FmcwParameters, Histogram};
pub use config::{AfGain, AntennaMask, ConfigDraft, MaskError, RadarConfig, MAX_ATTENUATORS};
pub use status::{HousekeepingStatus, ResetAck};
