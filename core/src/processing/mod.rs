//! Waveform processing consumed by the console: range profiles from chirp
//! samples and echograms stacked from successive bursts.

pub mod echogram;
pub mod range;

pub use echogram::Echogram;
pub use range::{compute_range_profile, range_bin_spacing, RangeProfile, ICE_PERMITTIVITY};
