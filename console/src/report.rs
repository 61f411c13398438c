//! Plain-text renderings of controller state for the terminal.

use aprescore::control::{BurstOutcome, CatalogEntry, ConsoleEvent};
use aprescore::instrument::status::format_timestamp;
use aprescore::instrument::{HousekeepingStatus, RadarConfig};
use aprescore::math::StatsHelper;
use aprescore::processing::RangeProfile;
use aprescore::telemetry::TelemetrySnapshot;
use std::fmt::Write;

/// Near-field bins ignored when looking for the strongest reflector.
const PEAK_SKIP_BINS: usize = 10;

pub fn status_line(status: &HousekeepingStatus) -> String {
    format!(
        "battery {:.2} V | VAB {} | GPS {} | {:.5}, {:.5}",
        status.battery_voltage,
        format_timestamp(status.time_vab.as_ref()),
        format_timestamp(status.time_gps.as_ref()),
        status.latitude,
        status.longitude
    )
}

pub fn status_report(snapshot: &TelemetrySnapshot) -> String {
    let mut out = String::new();
    match &snapshot.status {
        Some(status) => {
            let _ = writeln!(out, "{}", status_line(status));
        }
        None => {
            let _ = writeln!(out, "no housekeeping status received");
        }
    }
    if let Some(summary) = &snapshot.summary {
        let span = snapshot.timeline.first().copied().unwrap_or(0.0);
        let _ = writeln!(
            out,
            "battery log: {} samples over {:.0} s, min {:.2} V, mean {:.2} V, max {:.2} V",
            snapshot.history.len(),
            -span,
            summary.min,
            summary.mean,
            summary.max
        );
    }
    if snapshot.is_stale() {
        let reason = snapshot
            .health
            .last_error
            .as_deref()
            .unwrap_or("no data yet");
        let _ = writeln!(out, "telemetry stale: {reason}");
    }
    out
}

pub fn config_report(config: &RadarConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "averages:    {}", config.n_averages);
    let _ = writeln!(out, "sub-bursts:  {}", config.n_sub_bursts);
    let _ = writeln!(out, "attenuators: {}", config.n_attenuators());
    for (slot, (rf, af)) in config
        .rf_attenuation()
        .iter()
        .zip(config.af_gain())
        .enumerate()
    {
        let _ = writeln!(out, "  [{}] RF {:.2} dB, AF {}", slot + 1, rf, af);
    }
    let _ = writeln!(out, "tx antennas: {}", config.tx_antenna);
    let _ = write!(out, "rx antennas: {}", config.rx_antenna);
    out
}

pub fn catalog_report(entries: &[CatalogEntry]) -> String {
    if entries.is_empty() {
        return "no burst files".into();
    }
    entries
        .iter()
        .map(|entry| {
            format!(
                "{:<24} {:>10} B  {}",
                entry.name,
                entry.size_bytes,
                entry.last_modified.format("%Y-%m-%d %H:%M:%S")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn burst_report(outcome: &BurstOutcome, profile: Option<&RangeProfile>) -> String {
    let result = &outcome.result;
    let fmcw = result.fmcw_parameters();
    let mut out = format!(
        "{}: {} attenuator(s), {:.0}-{:.0} MHz over {:.2} s",
        result.filename,
        result.attenuator_count,
        result.start_frequency / 1e6,
        result.stop_frequency / 1e6,
        fmcw.period
    );
    if let Some(first) = result.chirps.first() {
        let _ = write!(out, ", mean ADC {:.3} V", StatsHelper::mean(first));
    }
    if let Some((_, depth)) = profile.and_then(|profile| profile.peak(PEAK_SKIP_BINS)) {
        let _ = write!(out, ", strongest return at {depth:.1} m");
    }
    if let Some(path) = &outcome.saved_to {
        let _ = write!(out, "\nsaved to {}", path.display());
    }
    out
}

/// One line per event for the monitor.
pub fn event_line(event: &ConsoleEvent) -> String {
    match event {
        ConsoleEvent::Connected(session) => format!("connected to {}", session.base_address),
        ConsoleEvent::Disconnected { reason } => format!("disconnected: {reason}"),
        ConsoleEvent::StatusUpdated { status, history } => {
            format!("{} ({} samples)", status_line(status), history.len())
        }
        ConsoleEvent::TelemetryDegraded { error } => format!("telemetry degraded: {error}"),
        ConsoleEvent::ConfigChanged(config) => format!(
            "config: {} attenuator(s), {} averages, {} sub-bursts",
            config.n_attenuators(),
            config.n_averages,
            config.n_sub_bursts
        ),
        ConsoleEvent::AcquisitionStateChanged { kind, state } => format!("{kind} burst: {state:?}"),
        ConsoleEvent::AcquisitionCompleted { outcome, .. } => burst_report(outcome, None),
        ConsoleEvent::AcquisitionFailed { kind, error } => format!("{kind} burst failed: {error}"),
        ConsoleEvent::CatalogRefreshed(entries) => format!("catalog: {} burst file(s)", entries.len()),
        ConsoleEvent::DeviceReset(ack) => format!("reset: {}", ack.message),
        ConsoleEvent::OperationFailed { operation, error } => format!("{operation} failed: {error}"),
    }
}
