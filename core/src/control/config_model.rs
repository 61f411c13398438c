use log::info;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::instrument::{ConfigDraft, RadarConfig};
use crate::prelude::{bounded, ConsoleError, ConsoleResult};
use crate::transport::InstrumentLink;

/// Local mirror of the instrument's burst configuration.
///
/// A single async lock serialises `fetch` and `apply`, so one finishes
/// before the other starts. Failed calls leave the local state untouched.
#[derive(Debug, Default)]
pub struct ConfigModel {
    current: Mutex<Option<RadarConfig>>,
}

impl ConfigModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the device configuration and replaces local state with it.
    pub async fn fetch<L: InstrumentLink>(
        &self,
        link: &L,
        timeout: Duration,
    ) -> ConsoleResult<RadarConfig> {
        let mut current = self.current.lock().await;
        let config = bounded("fetch config", timeout, link.get_config()).await?;
        config
            .validate()
            .map_err(|err| ConsoleError::Device(format!("instrument sent invalid config: {err}")))?;
        info!(
            "fetched config: {} attenuators, {} averages",
            config.n_attenuators(),
            config.n_averages
        );
        *current = Some(config.clone());
        Ok(config)
    }

    /// Validates `candidate` locally, writes it, and adopts what the device
    /// reports back as the new local state.
    pub async fn apply<L: InstrumentLink>(
        &self,
        link: &L,
        candidate: RadarConfig,
        timeout: Duration,
    ) -> ConsoleResult<RadarConfig> {
        candidate.validate()?;
        let mut current = self.current.lock().await;
        if current.is_none() {
            return Err(ConsoleError::invalid(
                "config",
                "fetch the device configuration before applying changes",
            ));
        }
        let stored = bounded("apply config", timeout, link.set_config(&candidate)).await?;
        stored
            .validate()
            .map_err(|err| ConsoleError::Device(format!("instrument stored invalid config: {err}")))?;
        info!("applied config with {} attenuators", stored.n_attenuators());
        *current = Some(stored.clone());
        Ok(stored)
    }

    pub async fn current(&self) -> Option<RadarConfig> {
        self.current.lock().await.clone()
    }

    /// New editing session over the last fetched configuration.
    pub async fn draft(&self) -> ConsoleResult<ConfigDraft> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(RadarConfig::draft)
            .ok_or_else(|| {
                ConsoleError::invalid("config", "no configuration has been fetched yet")
            })
    }

    pub async fn clear(&self) {
        *self.current.lock().await = None;
    }
}
