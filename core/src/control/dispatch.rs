//! Intent queue in front of the [`SessionController`].
//!
//! Front-ends hold a cheap [`ConsoleHandle`] and send [`Command`]s; a single
//! control task owns the controller and runs them in order. Results come
//! back as [`ConsoleEvent`]s, failures as [`ConsoleEvent::OperationFailed`].

use log::{debug, info};
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::control::events::{ConsoleEvent, EventBus, Operation};
use crate::control::session::SessionController;
use crate::instrument::{BurstKind, RadarConfig};
use crate::prelude::{ConsoleError, ConsoleResult};
use crate::transport::Connector;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect { address: String, key: String },
    SetKey(String),
    Disconnect,
    RefreshConfig,
    ApplyConfig(RadarConfig),
    Trigger(BurstKind),
    RefreshCatalog(Option<PathBuf>),
    ResetDevice,
    Shutdown,
}

impl Command {
    fn operation(&self) -> Operation {
        match self {
            Command::Connect { .. } | Command::Disconnect | Command::Shutdown => Operation::Connect,
            Command::SetKey(_) => Operation::SetKey,
            Command::RefreshConfig => Operation::FetchConfig,
            Command::ApplyConfig(_) => Operation::ApplyConfig,
            Command::Trigger(_) => Operation::Trigger,
            Command::RefreshCatalog(_) => Operation::RefreshCatalog,
            Command::ResetDevice => Operation::ResetDevice,
        }
    }
}

/// Sending side of the control task.
#[derive(Debug, Clone)]
pub struct ConsoleHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: EventBus,
}

impl ConsoleHandle {
    pub fn send(&self, command: Command) -> ConsoleResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ConsoleError::Aborted)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    pub fn connect(&self, address: impl Into<String>, key: impl Into<String>) -> ConsoleResult<()> {
        self.send(Command::Connect {
            address: address.into(),
            key: key.into(),
        })
    }

    pub fn set_key(&self, key: impl Into<String>) -> ConsoleResult<()> {
        self.send(Command::SetKey(key.into()))
    }

    pub fn disconnect(&self) -> ConsoleResult<()> {
        self.send(Command::Disconnect)
    }

    pub fn refresh_config(&self) -> ConsoleResult<()> {
        self.send(Command::RefreshConfig)
    }

    /// Rejects an invalid candidate immediately; only valid ones are queued.
    pub fn apply_config(&self, candidate: RadarConfig) -> ConsoleResult<()> {
        candidate.validate()?;
        self.send(Command::ApplyConfig(candidate))
    }

    pub fn trigger(&self, kind: BurstKind) -> ConsoleResult<()> {
        self.send(Command::Trigger(kind))
    }

    pub fn refresh_catalog(&self, directory: Option<PathBuf>) -> ConsoleResult<()> {
        self.send(Command::RefreshCatalog(directory))
    }

    pub fn reset_device(&self) -> ConsoleResult<()> {
        self.send(Command::ResetDevice)
    }

    pub fn shutdown(&self) -> ConsoleResult<()> {
        self.send(Command::Shutdown)
    }
}

/// Moves `controller` onto its own control task. The task ends on
/// [`Command::Shutdown`] or once every handle is dropped, closing the
/// session and handing the controller back.
pub fn spawn_dispatcher<C: Connector>(
    controller: SessionController<C>,
) -> (ConsoleHandle, JoinHandle<SessionController<C>>) {
    let (commands, receiver) = mpsc::unbounded_channel();
    let handle = ConsoleHandle {
        commands,
        events: controller.events().clone(),
    };
    let task = tokio::spawn(dispatch_loop(controller, receiver));
    (handle, task)
}

async fn dispatch_loop<C: Connector>(
    mut controller: SessionController<C>,
    mut receiver: mpsc::UnboundedReceiver<Command>,
) -> SessionController<C> {
    while let Some(command) = receiver.recv().await {
        if matches!(command, Command::Shutdown) {
            break;
        }
        debug!("dispatching {:?}", command);
        let operation = command.operation();
        if let Err(error) = execute(&mut controller, command).await {
            controller.events().emit(ConsoleEvent::OperationFailed { operation, error });
        }
    }
    info!("control task stopping");
    controller.disconnect().await;
    controller
}

async fn execute<C: Connector>(
    controller: &mut SessionController<C>,
    command: Command,
) -> ConsoleResult<()> {
    match command {
        Command::Connect { address, key } => controller.connect(&address, &key).await.map(drop),
        Command::SetKey(key) => controller.set_key(&key).map(drop),
        Command::Disconnect => {
            controller.disconnect().await;
            Ok(())
        }
        Command::RefreshConfig => controller.fetch_config().await.map(drop),
        Command::ApplyConfig(candidate) => controller.apply_config(candidate).await.map(drop),
        // Outcomes arrive as acquisition events.
        Command::Trigger(kind) => controller.trigger(kind).map(drop),
        Command::RefreshCatalog(directory) => controller
            .refresh_catalog(directory.as_deref())
            .await
            .map(drop),
        Command::ResetDevice => controller.reset_device().await.map(drop),
        Command::Shutdown => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ControllerSettings;
    use crate::transport::fake::FakeInstrument;
    use std::time::Duration;

    async fn next_matching(
        rx: &mut broadcast::Receiver<ConsoleEvent>,
        predicate: impl Fn(&ConsoleEvent) -> bool,
    ) -> ConsoleEvent {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = rx.recv().await.unwrap();
                if predicate(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    fn spawn(
        instrument: &FakeInstrument,
        dir: &tempfile::TempDir,
    ) -> (ConsoleHandle, JoinHandle<SessionController<FakeInstrument>>) {
        let settings = ControllerSettings {
            telemetry_interval_ms: 50,
            survey_directory: Some(dir.path().to_path_buf()),
            ..ControllerSettings::default()
        };
        spawn_dispatcher(SessionController::new(instrument.clone(), settings))
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_queueing() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let (handle, _task) = spawn(&instrument, &dir);

        let mut candidate = RadarConfig::default();
        candidate.n_averages = 0;
        assert!(matches!(
            handle.apply_config(candidate),
            Err(ConsoleError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn commands_run_in_order_and_report_through_events() {
        let instrument = FakeInstrument::default();
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = spawn(&instrument, &dir);
        let mut rx = handle.subscribe();

        handle.trigger(BurstKind::Trial).unwrap();
        let failure = next_matching(&mut rx, |event| {
            matches!(event, ConsoleEvent::OperationFailed { .. })
        })
        .await;
        assert!(matches!(
            failure,
            ConsoleEvent::OperationFailed {
                operation: Operation::Trigger,
                error: ConsoleError::NotConnected
            }
        ));

        handle.connect("http://192.168.1.1", "18052021").unwrap();
        handle.trigger(BurstKind::Trial).unwrap();
        let done = next_matching(&mut rx, |event| {
            matches!(event, ConsoleEvent::AcquisitionCompleted { .. })
        })
        .await;
        assert!(matches!(
            done,
            ConsoleEvent::AcquisitionCompleted {
                kind: BurstKind::Trial,
                ..
            }
        ));

        handle.shutdown().unwrap();
        let controller = task.await.unwrap();
        assert!(!controller.is_connected());
    }
}
