use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::broadcast::error::RecvError;

use crate::control::acquisition::BurstOutcome;
use crate::control::catalog::CatalogEntry;
use crate::control::events::ConsoleEvent;
use crate::control::session::{Session, SessionController};
use crate::instrument::{BurstKind, ConfigDraft, RadarConfig, ResetAck};
use crate::prelude::{ConsoleError, ConsoleResult};
use crate::settings::ControllerSettings;
use crate::telemetry::TelemetrySnapshot;
use crate::transport::Connector;

/// Synchronous wrapper over [`SessionController`] for scripts and one-shot
/// commands. Owns the runtime the controller's background tasks run on.
pub struct BlockingSession<C: Connector> {
    // Declared first so it is dropped while the runtime is still alive.
    controller: SessionController<C>,
    runtime: Runtime,
}

impl<C: Connector> BlockingSession<C> {
    pub fn new(connector: C, settings: ControllerSettings) -> ConsoleResult<Self> {
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(ConsoleError::storage)?;
        Ok(Self {
            controller: SessionController::new(connector, settings),
            runtime,
        })
    }

    pub fn controller(&self) -> &SessionController<C> {
        &self.controller
    }

    pub fn connect(&mut self, address: &str, key: &str) -> ConsoleResult<Session> {
        self.runtime.block_on(self.controller.connect(address, key))
    }

    pub fn disconnect(&mut self) {
        self.runtime.block_on(self.controller.disconnect())
    }

    pub fn fetch_config(&self) -> ConsoleResult<RadarConfig> {
        self.runtime.block_on(self.controller.fetch_config())
    }

    pub fn config_draft(&self) -> ConsoleResult<ConfigDraft> {
        self.runtime.block_on(self.controller.config_draft())
    }

    pub fn apply_config(&self, candidate: RadarConfig) -> ConsoleResult<RadarConfig> {
        self.runtime.block_on(self.controller.apply_config(candidate))
    }

    /// Triggers a burst and blocks until it resolves.
    pub fn acquire(&self, kind: BurstKind) -> ConsoleResult<BurstOutcome> {
        let _guard = self.runtime.enter();
        let handle = self.controller.trigger(kind)?;
        self.runtime.block_on(handle.outcome())
    }

    pub fn refresh_catalog(&self, directory: Option<&Path>) -> ConsoleResult<Vec<CatalogEntry>> {
        self.runtime
            .block_on(self.controller.refresh_catalog(directory))
    }

    pub fn reset_device(&self) -> ConsoleResult<ResetAck> {
        self.runtime.block_on(self.controller.reset_device())
    }

    pub fn download_config_file(&self, path: &Path, overwrite: bool) -> ConsoleResult<PathBuf> {
        self.runtime
            .block_on(self.controller.download_config_file(path, overwrite))
    }

    pub fn upload_config_file(&self, path: &Path) -> ConsoleResult<()> {
        self.runtime
            .block_on(self.controller.upload_config_file(path))
    }

    /// Blocks until the poller has a status or reports a failure.
    pub fn wait_for_status(&self, within: Duration) -> ConsoleResult<TelemetrySnapshot> {
        if !self.controller.is_connected() {
            return Err(ConsoleError::NotConnected);
        }
        let mut events = self.controller.subscribe();
        let snapshot = self.controller.telemetry();
        if snapshot.status.is_some() {
            return Ok(snapshot);
        }
        let waited = self.runtime.block_on(async {
            tokio::time::timeout(within, async {
                loop {
                    match events.recv().await {
                        Ok(ConsoleEvent::StatusUpdated { .. }) => return Ok(()),
                        Ok(ConsoleEvent::TelemetryDegraded { error }) => return Err(error),
                        Ok(_) | Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => return Err(ConsoleError::Aborted),
                    }
                }
            })
            .await
        });
        match waited {
            Ok(Ok(())) => Ok(self.controller.telemetry()),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(ConsoleError::Timeout {
                operation: "status",
                after: within,
            }),
        }
    }

    /// Gives up the synchronous wrapper, e.g. to hand the controller to
    /// [`spawn_dispatcher`](crate::control::dispatch::spawn_dispatcher).
    pub fn into_parts(self) -> (Runtime, SessionController<C>) {
        (self.runtime, self.controller)
    }
}
