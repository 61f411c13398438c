use log::{info, warn};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};

use crate::control::acquisition::{
    AcquisitionContext, AcquisitionHandle, AcquisitionState, AcquisitionTimeouts,
    AcquisitionWorkflow,
};
use crate::control::catalog::{BurstCatalog, CatalogEntry};
use crate::control::config_model::ConfigModel;
use crate::control::events::{ConsoleEvent, EventBus, Operation};
use crate::instrument::{BurstKind, ConfigDraft, RadarConfig, ResetAck};
use crate::prelude::{bounded, ConsoleError, ConsoleResult};
use crate::settings::ControllerSettings;
use crate::telemetry::{TelemetryPoller, TelemetrySnapshot};
use crate::transport::{Connector, InstrumentLink};

/// Identity of the live connection. Replaced, never mutated, when the key
/// or the instrument changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub base_address: Url,
    pub auth_key: String,
    pub connected: bool,
}

struct ActiveSession<L> {
    session: Session,
    link: Arc<L>,
    teardown: watch::Sender<bool>,
}

/// Owns the session and every component that needs one.
///
/// At most one session is live. Anything that talks to the instrument
/// fails with [`ConsoleError::NotConnected`] when there is none.
pub struct SessionController<C: Connector> {
    connector: C,
    settings: ControllerSettings,
    events: EventBus,
    config: Arc<ConfigModel>,
    acquisitions: AcquisitionWorkflow,
    catalog: Arc<Mutex<BurstCatalog>>,
    telemetry: TelemetryPoller,
    active: Option<ActiveSession<C::Link>>,
}

impl<C: Connector> SessionController<C> {
    pub fn new(connector: C, settings: ControllerSettings) -> Self {
        let catalog = BurstCatalog::new(settings.survey_directory(), &settings.burst_extension);
        Self {
            connector,
            events: EventBus::default(),
            config: Arc::new(ConfigModel::new()),
            acquisitions: AcquisitionWorkflow::new(settings.concurrent_acquisitions),
            catalog: Arc::new(Mutex::new(catalog)),
            telemetry: TelemetryPoller::new(
                settings.history_capacity(),
                settings.telemetry_interval(),
            ),
            settings,
            active: None,
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    /// Opens a session with the instrument at `address`.
    ///
    /// Any existing session is torn down first, so a failed attempt leaves
    /// the controller disconnected. On success telemetry starts and the
    /// device configuration is fetched; a failed fetch is reported as an
    /// event and does not undo the connection.
    pub async fn connect(&mut self, address: &str, key: &str) -> ConsoleResult<Session> {
        self.teardown("reconnecting").await;

        let base_address = Url::parse(address).map_err(|err| ConsoleError::Connect {
            reason: format!("invalid address `{address}`: {err}"),
        })?;
        let timeout = self.settings.request_timeout();
        let link = match tokio::time::timeout(timeout, self.connector.connect(&base_address, key))
            .await
        {
            Ok(Ok(link)) => Arc::new(link),
            Ok(Err(err)) => {
                warn!("connect to {} failed: {}", base_address, err);
                return Err(ConsoleError::Connect {
                    reason: err.to_string(),
                });
            }
            Err(_) => {
                warn!("connect to {} timed out", base_address);
                return Err(ConsoleError::Connect {
                    reason: format!("handshake timed out after {timeout:?}"),
                });
            }
        };

        let session = Session {
            base_address,
            auth_key: key.to_string(),
            connected: true,
        };
        let (teardown, _) = watch::channel(false);
        self.active = Some(ActiveSession {
            session: session.clone(),
            link: link.clone(),
            teardown,
        });
        info!("connected to {}", session.base_address);
        self.events.emit(ConsoleEvent::Connected(session.clone()));

        self.telemetry.start(
            link,
            self.settings.telemetry_interval(),
            timeout,
            self.events.clone(),
        );
        if let Err(error) = self.fetch_config().await {
            warn!("initial config fetch failed: {}", error);
            self.events.emit(ConsoleEvent::OperationFailed {
                operation: Operation::FetchConfig,
                error,
            });
        }
        Ok(session)
    }

    /// Switches the API key used by the live link.
    pub fn set_key(&mut self, key: &str) -> ConsoleResult<Session> {
        let active = self.active.as_mut().ok_or(ConsoleError::NotConnected)?;
        active.link.set_key(key);
        active.session = Session {
            auth_key: key.to_string(),
            ..active.session.clone()
        };
        info!("API key updated for {}", active.session.base_address);
        Ok(active.session.clone())
    }

    pub async fn disconnect(&mut self) {
        self.teardown("disconnected by operator").await;
    }

    async fn teardown(&mut self, reason: &str) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.teardown.send_replace(true);
        self.telemetry.stop();
        self.config.clear().await;
        info!("session with {} closed: {}", active.session.base_address, reason);
        self.events.emit(ConsoleEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    pub fn current_session(&self) -> Option<Session> {
        self.active.as_ref().map(|active| active.session.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    fn link(&self) -> ConsoleResult<Arc<C::Link>> {
        self.active
            .as_ref()
            .map(|active| active.link.clone())
            .ok_or(ConsoleError::NotConnected)
    }

    pub async fn fetch_config(&self) -> ConsoleResult<RadarConfig> {
        let link = self.link()?;
        let config = self
            .config
            .fetch(link.as_ref(), self.settings.request_timeout())
            .await?;
        self.events.emit(ConsoleEvent::ConfigChanged(config.clone()));
        Ok(config)
    }

    /// Writes `candidate` to the instrument. Local validation runs before
    /// the session is even looked at.
    pub async fn apply_config(&self, candidate: RadarConfig) -> ConsoleResult<RadarConfig> {
        candidate.validate()?;
        let link = self.link()?;
        let stored = self
            .config
            .apply(link.as_ref(), candidate, self.settings.request_timeout())
            .await?;
        self.events.emit(ConsoleEvent::ConfigChanged(stored.clone()));
        Ok(stored)
    }

    pub async fn current_config(&self) -> Option<RadarConfig> {
        self.config.current().await
    }

    pub async fn config_draft(&self) -> ConsoleResult<ConfigDraft> {
        self.link()?;
        self.config.draft().await
    }

    /// Starts a burst in the background. Must be called from within a
    /// tokio runtime.
    pub fn trigger(&self, kind: BurstKind) -> ConsoleResult<AcquisitionHandle> {
        let active = self.active.as_ref().ok_or(ConsoleError::NotConnected)?;
        let context = AcquisitionContext {
            link: active.link.clone(),
            catalog: self.catalog.clone(),
            events: self.events.clone(),
            teardown: active.teardown.subscribe(),
            timeouts: AcquisitionTimeouts {
                request: self.settings.request_timeout(),
                acquisition: self.settings.acquisition_timeout(),
            },
        };
        self.acquisitions.trigger(context, kind)
    }

    pub fn trigger_trial(&self) -> ConsoleResult<AcquisitionHandle> {
        self.trigger(BurstKind::Trial)
    }

    pub fn trigger_persisted(&self) -> ConsoleResult<AcquisitionHandle> {
        self.trigger(BurstKind::Persisted)
    }

    pub fn acquisition_state(&self, kind: BurstKind) -> AcquisitionState {
        self.acquisitions.state(kind)
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn catalog(&self) -> Vec<CatalogEntry> {
        self.catalog
            .lock()
            .map(|catalog| catalog.entries())
            .unwrap_or_default()
    }

    pub fn survey_directory(&self) -> PathBuf {
        self.catalog
            .lock()
            .map(|catalog| catalog.directory().to_path_buf())
            .unwrap_or_else(|_| self.settings.survey_directory())
    }

    /// Rescans `directory`, or the current survey directory, off the
    /// control task. Works without a session.
    pub async fn refresh_catalog(&self, directory: Option<&Path>) -> ConsoleResult<Vec<CatalogEntry>> {
        let directory = directory
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.survey_directory());
        let catalog = self.catalog.clone();
        let entries = tokio::task::spawn_blocking(move || {
            let mut catalog = catalog
                .lock()
                .map_err(|_| ConsoleError::Storage("catalog lock poisoned".into()))?;
            catalog.refresh(&directory)
        })
        .await
        .map_err(ConsoleError::storage)??;
        self.events.catalog_refreshed(&entries);
        Ok(entries)
    }

    pub async fn reset_device(&self) -> ConsoleResult<ResetAck> {
        let link = self.link()?;
        let ack = bounded("reset device", self.settings.request_timeout(), link.reset()).await?;
        info!("instrument reset acknowledged: {}", ack.message);
        self.events.emit(ConsoleEvent::DeviceReset(ack.clone()));
        Ok(ack)
    }

    /// Saves the instrument's `config.ini` to `path`.
    pub async fn download_config_file(&self, path: &Path, overwrite: bool) -> ConsoleResult<PathBuf> {
        if !overwrite && path.exists() {
            return Err(ConsoleError::Storage(format!(
                "{} already exists; pass overwrite to replace it",
                path.display()
            )));
        }
        let link = self.link()?;
        let contents = bounded(
            "download config file",
            self.settings.request_timeout(),
            link.config_file(),
        )
        .await?;
        tokio::fs::write(path, contents)
            .await
            .map_err(ConsoleError::storage)?;
        info!("saved instrument config file to {}", path.display());
        Ok(path.to_path_buf())
    }

    /// Sends a local `config.ini`. The instrument applies it after a reset.
    pub async fn upload_config_file(&self, path: &Path) -> ConsoleResult<()> {
        let link = self.link()?;
        let contents = tokio::fs::read(path)
            .await
            .map_err(ConsoleError::storage)?;
        bounded(
            "upload config file",
            self.settings.request_timeout(),
            link.upload_config_file(contents),
        )
        .await?;
        info!("uploaded {} to instrument", path.display());
        Ok(())
    }
}

impl<C: Connector> Drop for SessionController<C> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.teardown.send_replace(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::AfGain;
    use crate::transport::fake::FakeInstrument;
    use std::time::Duration;

    const ADDRESS: &str = "http://192.168.1.1";
    const KEY: &str = "18052021";

    fn controller(
        instrument: &FakeInstrument,
        dir: &tempfile::TempDir,
    ) -> SessionController<FakeInstrument> {
        let settings = ControllerSettings {
            telemetry_interval_ms: 20,
            acquisition_timeout_ms: 2_000,
            survey_directory: Some(dir.path().join("survey")),
            ..ControllerSettings::default()
        };
        SessionController::new(instrument.clone(), settings)
    }

    fn drain(rx: &mut broadcast::Receiver<ConsoleEvent>) -> Vec<ConsoleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn connect_starts_telemetry_and_fetches_config() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&instrument, &dir);
        let mut rx = controller.subscribe();

        let session = controller.connect(ADDRESS, KEY).await.unwrap();
        assert!(session.connected);
        assert_eq!(controller.current_session(), Some(session));
        assert!(controller.current_config().await.is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(controller.telemetry().status.is_some());
        let events = drain(&mut rx);
        assert!(matches!(events[0], ConsoleEvent::Connected(_)));
        assert!(events
            .iter()
            .any(|event| matches!(event, ConsoleEvent::ConfigChanged(_))));
        assert!(events
            .iter()
            .any(|event| matches!(event, ConsoleEvent::StatusUpdated { .. })));
    }

    #[tokio::test]
    async fn rejected_key_is_connect_error() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&instrument, &dir);
        let err = controller.connect(ADDRESS, "wrong").await.unwrap_err();
        assert!(matches!(err, ConsoleError::Connect { .. }));
        assert!(controller.current_session().is_none());
    }

    #[tokio::test]
    async fn failed_reconnect_leaves_controller_disconnected() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&instrument, &dir);
        controller.connect(ADDRESS, KEY).await.unwrap();

        instrument.with(|state| state.reachable = false);
        assert!(controller.connect(ADDRESS, KEY).await.is_err());
        assert!(controller.current_session().is_none());
        assert_eq!(
            controller.trigger_trial().unwrap_err(),
            ConsoleError::NotConnected
        );
        assert_eq!(
            controller.fetch_config().await.unwrap_err(),
            ConsoleError::NotConnected
        );
    }

    #[tokio::test]
    async fn local_validation_precedes_session_check() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(&instrument, &dir);

        let mut invalid = RadarConfig::default();
        invalid.n_sub_bursts = 0;
        assert!(matches!(
            controller.apply_config(invalid).await,
            Err(ConsoleError::InvalidConfig { field: "n_sub_bursts", .. })
        ));
        assert_eq!(
            controller
                .apply_config(RadarConfig::default())
                .await
                .unwrap_err(),
            ConsoleError::NotConnected
        );
        assert_eq!(
            controller.reset_device().await.unwrap_err(),
            ConsoleError::NotConnected
        );
    }

    #[tokio::test]
    async fn failed_initial_fetch_keeps_connection() {
        let instrument = FakeInstrument::default();
        instrument.with(|state| state.fail_get_config = true);
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&instrument, &dir);
        let mut rx = controller.subscribe();

        controller.connect(ADDRESS, KEY).await.unwrap();
        assert!(controller.is_connected());
        assert!(drain(&mut rx).iter().any(|event| matches!(
            event,
            ConsoleEvent::OperationFailed {
                operation: Operation::FetchConfig,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn attenuator_resize_survives_refetch() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&instrument, &dir);
        controller.connect(ADDRESS, KEY).await.unwrap();
        assert_eq!(
            controller.fetch_config().await.unwrap().n_attenuators(),
            1
        );

        let mut draft = controller.config_draft().await.unwrap();
        draft.set_attenuator_count(3).unwrap();
        for (slot, value) in [2.0, 15.5, 31.75].into_iter().enumerate() {
            draft.set_rf_attenuation(slot, value).unwrap();
        }
        draft.set_af_gain(2, AfGain::Minus14).unwrap();
        controller.apply_config(draft.to_config()).await.unwrap();

        let refetched = controller.fetch_config().await.unwrap();
        assert_eq!(refetched.rf_attenuation(), &[2.0, 15.5, 31.75]);
        assert_eq!(refetched.af_gain()[2], AfGain::Minus14);
    }

    #[tokio::test]
    async fn persisted_burst_appears_at_catalog_head() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&instrument, &dir);
        controller.connect(ADDRESS, KEY).await.unwrap();
        controller.refresh_catalog(None).await.unwrap();

        let outcome = controller
            .trigger_persisted()
            .unwrap()
            .outcome()
            .await
            .unwrap();
        assert_eq!(outcome.result.filename, "burst_0001.dat");
        assert_eq!(controller.catalog()[0].name, "burst_0001.dat");
        assert!(dir.path().join("survey").join("burst_0001.dat").is_file());
    }

    #[tokio::test]
    async fn burst_over_existing_file_keeps_one_catalog_entry() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let survey = dir.path().join("survey");
        std::fs::create_dir_all(&survey).unwrap();
        std::fs::write(survey.join("burst_0001.dat"), b"older payload").unwrap();
        let mut controller = controller(&instrument, &dir);
        controller.connect(ADDRESS, KEY).await.unwrap();
        assert_eq!(controller.refresh_catalog(None).await.unwrap().len(), 1);

        controller
            .trigger_persisted()
            .unwrap()
            .outcome()
            .await
            .unwrap();
        let names: Vec<String> = controller.catalog().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["burst_0001.dat"]);
        assert_eq!(std::fs::read_dir(&survey).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn disconnect_aborts_pending_acquisition() {
        let instrument = FakeInstrument::default();
        instrument.with(|state| state.result_delay = Duration::from_secs(10));
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&instrument, &dir);
        controller.connect(ADDRESS, KEY).await.unwrap();

        let handle = controller.trigger_trial().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.disconnect().await;
        assert_eq!(handle.outcome().await.unwrap_err(), ConsoleError::Aborted);
        assert_eq!(
            controller.acquisition_state(BurstKind::Trial),
            AcquisitionState::Idle
        );
        assert!(controller.current_config().await.is_none());
    }

    #[tokio::test]
    async fn set_key_replaces_session_value() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&instrument, &dir);
        assert_eq!(controller.set_key("x").unwrap_err(), ConsoleError::NotConnected);

        controller.connect(ADDRESS, KEY).await.unwrap();
        let session = controller.set_key("19052021").unwrap();
        assert_eq!(session.auth_key, "19052021");
        assert_eq!(controller.current_session().unwrap().auth_key, "19052021");
    }

    #[tokio::test]
    async fn config_file_download_refuses_overwrite() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&instrument, &dir);
        controller.connect(ADDRESS, KEY).await.unwrap();

        let target = dir.path().join("config.ini");
        controller
            .download_config_file(&target, false)
            .await
            .unwrap();
        assert!(matches!(
            controller.download_config_file(&target, false).await,
            Err(ConsoleError::Storage(_))
        ));
        controller.download_config_file(&target, true).await.unwrap();

        std::fs::write(&target, b"[radar]\nnAttenuators=2\n").unwrap();
        controller.upload_config_file(&target).await.unwrap();
        instrument.with(|state| {
            assert_eq!(state.config_file, b"[radar]\nnAttenuators=2\n".to_vec())
        });
    }

    #[tokio::test]
    async fn reset_is_announced() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(&instrument, &dir);
        controller.connect(ADDRESS, KEY).await.unwrap();
        let mut rx = controller.subscribe();

        let ack = controller.reset_device().await.unwrap();
        assert!(drain(&mut rx)
            .iter()
            .any(|event| matches!(event, ConsoleEvent::DeviceReset(seen) if *seen == ack)));
    }
}
