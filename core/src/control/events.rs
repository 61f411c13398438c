use std::fmt;
use tokio::sync::broadcast;

use crate::control::acquisition::{AcquisitionState, BurstOutcome};
use crate::control::catalog::CatalogEntry;
use crate::control::session::Session;
use crate::instrument::{BurstKind, HousekeepingStatus, RadarConfig, ResetAck};
use crate::prelude::ConsoleError;

/// Operations whose failures are reported through [`ConsoleEvent::OperationFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    SetKey,
    FetchConfig,
    ApplyConfig,
    Trigger,
    RefreshCatalog,
    ResetDevice,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Connect => "connect",
            Operation::SetKey => "set key",
            Operation::FetchConfig => "fetch config",
            Operation::ApplyConfig => "apply config",
            Operation::Trigger => "trigger burst",
            Operation::RefreshCatalog => "refresh catalog",
            Operation::ResetDevice => "reset device",
        };
        f.write_str(name)
    }
}

/// Everything the controller reports to the presentation layer.
#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    Connected(Session),
    Disconnected { reason: String },
    StatusUpdated {
        status: HousekeepingStatus,
        history: Vec<f32>,
    },
    TelemetryDegraded { error: ConsoleError },
    ConfigChanged(RadarConfig),
    AcquisitionStateChanged {
        kind: BurstKind,
        state: AcquisitionState,
    },
    AcquisitionCompleted {
        kind: BurstKind,
        outcome: BurstOutcome,
    },
    AcquisitionFailed {
        kind: BurstKind,
        error: ConsoleError,
    },
    CatalogRefreshed(Vec<CatalogEntry>),
    DeviceReset(ResetAck),
    OperationFailed {
        operation: Operation,
        error: ConsoleError,
    },
}

/// One-to-many fan-out of [`ConsoleEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ConsoleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event; having no subscribers is not an error.
    pub fn emit(&self, event: ConsoleEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.sender.subscribe()
    }

    pub fn catalog_refreshed(&self, entries: &[CatalogEntry]) {
        self.emit(ConsoleEvent::CatalogRefreshed(entries.to_vec()));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
