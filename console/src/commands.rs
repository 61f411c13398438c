use anyhow::{bail, Context};
use aprescore::control::BlockingSession;
use aprescore::instrument::{AfGain, AntennaMask, BurstKind, ConfigDraft};
use aprescore::processing::{compute_range_profile, Echogram, RangeProfile, ICE_PERMITTIVITY};
use aprescore::transport::HttpConnector;
use clap::{Args, Subcommand};
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use crate::report;
use crate::settings::ConsoleConfig;

/// How long one-shot commands wait for the first housekeeping status.
const STATUS_WAIT: Duration = Duration::from_secs(10);

pub type Session = BlockingSession<HttpConnector>;

#[derive(Subcommand, Debug, Clone)]
pub enum ConsoleCommand {
    /// Show housekeeping status
    Status,
    /// Show or change the burst configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run a trial burst (nothing stored)
    Trial,
    /// Run a persisted burst and download it
    Burst,
    /// Run persisted bursts back to back and build an echogram
    Survey {
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Pause between bursts in seconds
        #[arg(long, default_value = "0", value_parser = parse_interval)]
        interval: Duration,
        /// Write the echogram as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// List burst files in the survey directory
    Catalog {
        directory: Option<PathBuf>,
    },
    /// Restart the instrument
    Reset,
    /// Transfer the instrument's config.ini
    ConfigFile {
        #[command(subcommand)]
        action: ConfigFileAction,
    },
    /// Stream events and accept commands on stdin
    Monitor,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    Show,
    Set(ConfigEdit),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigFileAction {
    Download {
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    Upload {
        path: PathBuf,
    },
}

/// Changes applied on top of the fetched configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigEdit {
    #[arg(long)]
    pub averages: Option<u32>,
    #[arg(long)]
    pub sub_bursts: Option<u32>,
    #[arg(long)]
    pub attenuators: Option<usize>,
    /// RF attenuation per attenuator in dB, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub rf_attenuation: Vec<f32>,
    /// AF gain per attenuator in dB (-14, -4 or 6), comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub af_gain: Vec<i32>,
    /// Enabled transmit ports (0-7), comma separated
    #[arg(long, value_delimiter = ',')]
    pub tx: Vec<usize>,
    /// Enabled receive ports (0-7), comma separated
    #[arg(long, value_delimiter = ',')]
    pub rx: Vec<usize>,
}

fn mask(ports: &[usize]) -> anyhow::Result<AntennaMask> {
    let mut flags = [false; 8];
    for &port in ports {
        match flags.get_mut(port) {
            Some(flag) => *flag = true,
            None => bail!("antenna port {port} is out of range (0..8)"),
        }
    }
    Ok(AntennaMask::from_flags(flags)?)
}

impl ConfigEdit {
    pub fn apply_to(&self, draft: &mut ConfigDraft) -> anyhow::Result<()> {
        if let Some(averages) = self.averages {
            draft.n_averages = averages;
        }
        if let Some(sub_bursts) = self.sub_bursts {
            draft.n_sub_bursts = sub_bursts;
        }
        if let Some(count) = self.attenuators {
            draft.set_attenuator_count(count)?;
        }
        for (slot, &value) in self.rf_attenuation.iter().enumerate() {
            draft.set_rf_attenuation(slot, value)?;
        }
        for (slot, &value) in self.af_gain.iter().enumerate() {
            let gain = AfGain::try_from(value).map_err(anyhow::Error::msg)?;
            draft.set_af_gain(slot, gain)?;
        }
        if !self.tx.is_empty() {
            draft.set_tx_antenna(mask(&self.tx).context("tx antennas")?);
        }
        if !self.rx.is_empty() {
            draft.set_rx_antenna(mask(&self.rx).context("rx antennas")?);
        }
        Ok(())
    }
}

fn first_profile(outcome: &aprescore::control::BurstOutcome) -> Option<RangeProfile> {
    let result = &outcome.result;
    result
        .chirps
        .first()
        .map(|chirp| compute_range_profile(chirp, &result.fmcw_parameters(), ICE_PERMITTIVITY))
}

fn connect(session: &mut Session, config: &ConsoleConfig) -> anyhow::Result<()> {
    let connected = session
        .connect(&config.address, &config.key)
        .with_context(|| format!("connecting to {}", config.address))?;
    info!("session open with {}", connected.base_address);
    Ok(())
}

/// Runs one command against a fresh session.
pub fn run(session: &mut Session, config: &ConsoleConfig, command: ConsoleCommand) -> anyhow::Result<()> {
    if let ConsoleCommand::Catalog { directory } = &command {
        let entries = session.refresh_catalog(directory.as_deref())?;
        println!("{}", session.controller().survey_directory().display());
        println!("{}", report::catalog_report(&entries));
        return Ok(());
    }

    connect(session, config)?;
    match command {
        ConsoleCommand::Status => {
            let snapshot = session.wait_for_status(STATUS_WAIT)?;
            print!("{}", report::status_report(&snapshot));
        }
        ConsoleCommand::Config { action } => match action {
            ConfigAction::Show => {
                let current = session.fetch_config()?;
                println!("{}", report::config_report(&current));
            }
            ConfigAction::Set(edit) => {
                let mut draft = session.config_draft()?;
                edit.apply_to(&mut draft)?;
                let stored = session.apply_config(draft.to_config())?;
                println!("{}", report::config_report(&stored));
            }
        },
        ConsoleCommand::Trial => {
            let outcome = session.acquire(BurstKind::Trial)?;
            println!("{}", report::burst_report(&outcome, first_profile(&outcome).as_ref()));
        }
        ConsoleCommand::Burst => {
            let outcome = session.acquire(BurstKind::Persisted)?;
            println!("{}", report::burst_report(&outcome, first_profile(&outcome).as_ref()));
        }
        ConsoleCommand::Survey {
            count,
            interval,
            csv,
        } => survey(session, count, interval, csv)?,
        ConsoleCommand::Reset => {
            let ack = session.reset_device()?;
            println!("{} {}", ack.time, ack.message);
        }
        ConsoleCommand::ConfigFile { action } => match action {
            ConfigFileAction::Download { path, overwrite } => {
                let saved = session.download_config_file(&path, overwrite)?;
                println!("config.ini saved to {}", saved.display());
            }
            ConfigFileAction::Upload { path } => {
                session.upload_config_file(&path)?;
                println!("config.ini uploaded; reset the instrument to apply it");
            }
        },
        ConsoleCommand::Catalog { .. } | ConsoleCommand::Monitor => {}
    }
    session.disconnect();
    Ok(())
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|err| format!("`{value}` is not a number of seconds: {err}"))?;
    Duration::try_from_secs_f64(seconds).map_err(|err| format!("`{value}` is not a usable pause: {err}"))
}

fn survey(
    session: &Session,
    count: usize,
    interval: Duration,
    csv: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut echogram: Option<Echogram> = None;
    for index in 0..count {
        if index > 0 && !interval.is_zero() {
            std::thread::sleep(interval);
        }
        let outcome = session
            .acquire(BurstKind::Persisted)
            .with_context(|| format!("burst {} of {}", index + 1, count))?;
        let profile = first_profile(&outcome);
        println!(
            "[{}/{}] {}",
            index + 1,
            count,
            report::burst_report(&outcome, profile.as_ref())
        );
        if let Some(profile) = profile {
            match echogram.as_mut() {
                Some(echogram) => echogram
                    .push(&profile)
                    .context("burst length changed during survey")?,
                None => echogram = Some(Echogram::from_profile(&profile)?),
            }
        }
    }

    if let (Some(path), Some(echogram)) = (csv, echogram) {
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        echogram
            .write_csv(BufWriter::new(file))
            .with_context(|| format!("writing {}", path.display()))?;
        println!(
            "echogram of {} bursts x {} bins written to {}",
            echogram.bursts(),
            echogram.bins(),
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aprescore::instrument::RadarConfig;

    #[test]
    fn edit_resizes_and_fills_attenuators() {
        let mut draft = RadarConfig::default().draft();
        let edit = ConfigEdit {
            attenuators: Some(3),
            rf_attenuation: vec![1.0, 2.5, 30.0],
            af_gain: vec![6, -4, -14],
            tx: vec![0, 3],
            ..ConfigEdit::default()
        };
        edit.apply_to(&mut draft).unwrap();

        let config = draft.to_config();
        assert_eq!(config.rf_attenuation(), &[1.0, 2.5, 30.0]);
        assert_eq!(config.af_gain()[2], AfGain::Minus14);
        assert!(config.tx_antenna.is_enabled(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn survey_interval_rejects_unusable_pauses() {
        assert_eq!(parse_interval("1.5"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_interval("0"), Ok(Duration::ZERO));
        for bad in ["inf", "NaN", "-2", "1e30", "soon"] {
            assert!(parse_interval(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn edit_rejects_unknown_gain_and_empty_ports() {
        let mut draft = RadarConfig::default().draft();
        let edit = ConfigEdit {
            af_gain: vec![3],
            ..ConfigEdit::default()
        };
        assert!(edit.apply_to(&mut draft).is_err());

        assert!(mask(&[9]).is_err());
        assert!(mask(&[]).is_err());
    }

    #[test]
    fn edit_beyond_attenuator_count_fails() {
        let mut draft = RadarConfig::default().draft();
        let edit = ConfigEdit {
            rf_attenuation: vec![1.0, 2.0],
            ..ConfigEdit::default()
        };
        assert!(edit.apply_to(&mut draft).is_err());
    }
}
