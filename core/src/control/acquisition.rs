use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

use crate::control::catalog::{BurstCatalog, CatalogEntry};
use crate::control::events::{ConsoleEvent, EventBus};
use crate::instrument::{BurstKind, BurstResult};
use crate::prelude::{bounded, ConsoleError, ConsoleResult};
use crate::transport::InstrumentLink;

/// Lifecycle of one acquisition workflow.
///
/// `Completed` and `Failed` are reported as they happen and the workflow
/// then drops back to `Idle`, ready to be triggered again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Triggered,
    Waiting,
    Completed,
    Failed,
}

impl AcquisitionState {
    pub fn is_busy(self) -> bool {
        matches!(self, AcquisitionState::Triggered | AcquisitionState::Waiting)
    }
}

/// Successful end of an acquisition.
#[derive(Debug, Clone)]
pub struct BurstOutcome {
    pub result: Arc<BurstResult>,
    /// Local copy of a persisted burst.
    pub saved_to: Option<PathBuf>,
    pub entry: Option<CatalogEntry>,
}

#[derive(Debug, Clone, Copy)]
pub struct AcquisitionTimeouts {
    /// Bound on accepting the trigger.
    pub request: Duration,
    /// Bound on the device-side acquisition and on the download.
    pub acquisition: Duration,
}

/// What a running acquisition needs from the session that started it.
pub struct AcquisitionContext<L> {
    pub link: Arc<L>,
    pub catalog: Arc<Mutex<BurstCatalog>>,
    pub events: EventBus,
    pub teardown: watch::Receiver<bool>,
    pub timeouts: AcquisitionTimeouts,
}

/// Resolves exactly once with the outcome of one triggered burst.
#[derive(Debug)]
pub struct AcquisitionHandle {
    id: u64,
    kind: BurstKind,
    outcome: oneshot::Receiver<ConsoleResult<BurstOutcome>>,
}

impl AcquisitionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> BurstKind {
        self.kind
    }

    pub async fn outcome(self) -> ConsoleResult<BurstOutcome> {
        self.outcome.await.unwrap_or(Err(ConsoleError::Aborted))
    }
}

#[derive(Debug, Default)]
struct Slots {
    trial: AcquisitionState,
    persisted: AcquisitionState,
}

impl Slots {
    fn get(&self, kind: BurstKind) -> AcquisitionState {
        match kind {
            BurstKind::Trial => self.trial,
            BurstKind::Persisted => self.persisted,
        }
    }

    fn set(&mut self, kind: BurstKind, state: AcquisitionState) {
        match kind {
            BurstKind::Trial => self.trial = state,
            BurstKind::Persisted => self.persisted = state,
        }
    }
}

fn other(kind: BurstKind) -> BurstKind {
    match kind {
        BurstKind::Trial => BurstKind::Persisted,
        BurstKind::Persisted => BurstKind::Trial,
    }
}

/// Trigger, wait and (for persisted bursts) download, run in the
/// background. Unless `concurrent` is set a single burst of either kind is
/// in flight at a time.
#[derive(Debug, Clone)]
pub struct AcquisitionWorkflow {
    slots: Arc<Mutex<Slots>>,
    concurrent: bool,
    next_id: Arc<AtomicU64>,
}

impl AcquisitionWorkflow {
    pub fn new(concurrent: bool) -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots::default())),
            concurrent,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn state(&self, kind: BurstKind) -> AcquisitionState {
        self.slots
            .lock()
            .map(|slots| slots.get(kind))
            .unwrap_or_default()
    }

    fn reserve(&self, kind: BurstKind) -> ConsoleResult<()> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| ConsoleError::Device("acquisition state poisoned".into()))?;
        if slots.get(kind).is_busy() {
            return Err(ConsoleError::Busy(kind));
        }
        if !self.concurrent && slots.get(other(kind)).is_busy() {
            return Err(ConsoleError::Busy(other(kind)));
        }
        slots.set(kind, AcquisitionState::Triggered);
        Ok(())
    }

    fn transition(&self, kind: BurstKind, state: AcquisitionState, events: &EventBus) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.set(kind, state);
        }
        debug!("{} acquisition -> {:?}", kind, state);
        events.emit(ConsoleEvent::AcquisitionStateChanged { kind, state });
    }

    /// Reserves the workflow slot and starts the burst in the background.
    /// Only a busy slot is reported here; every device-side failure arrives
    /// through the handle and the event bus.
    pub fn trigger<L: InstrumentLink>(
        &self,
        context: AcquisitionContext<L>,
        kind: BurstKind,
    ) -> ConsoleResult<AcquisitionHandle> {
        self.reserve(kind)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!("{} acquisition #{} triggered", kind, id);
        context.events.emit(ConsoleEvent::AcquisitionStateChanged {
            kind,
            state: AcquisitionState::Triggered,
        });

        let (sender, receiver) = oneshot::channel();
        let workflow = self.clone();
        tokio::spawn(async move { workflow.run(context, kind, id, sender).await });
        Ok(AcquisitionHandle {
            id,
            kind,
            outcome: receiver,
        })
    }

    async fn run<L: InstrumentLink>(
        self,
        context: AcquisitionContext<L>,
        kind: BurstKind,
        id: u64,
        sender: oneshot::Sender<ConsoleResult<BurstOutcome>>,
    ) {
        let mut teardown = context.teardown.clone();
        let result = tokio::select! {
            biased;
            _ = torn_down(&mut teardown) => Err(ConsoleError::Aborted),
            result = self.drive(&context, kind) => result,
        };

        let events = &context.events;
        match &result {
            Ok(outcome) => {
                info!(
                    "{} acquisition #{} completed: {}",
                    kind, id, outcome.result.filename
                );
                self.transition(kind, AcquisitionState::Completed, events);
                events.emit(ConsoleEvent::AcquisitionCompleted {
                    kind,
                    outcome: outcome.clone(),
                });
            }
            Err(error) => {
                warn!("{} acquisition #{} failed: {}", kind, id, error);
                self.transition(kind, AcquisitionState::Failed, events);
                events.emit(ConsoleEvent::AcquisitionFailed {
                    kind,
                    error: error.clone(),
                });
            }
        }
        self.transition(kind, AcquisitionState::Idle, events);
        let _ = sender.send(result);
    }

    async fn drive<L: InstrumentLink>(
        &self,
        context: &AcquisitionContext<L>,
        kind: BurstKind,
    ) -> ConsoleResult<BurstOutcome> {
        let timeouts = context.timeouts;
        bounded("trigger burst", timeouts.request, context.link.trigger_burst(kind)).await?;
        self.transition(kind, AcquisitionState::Waiting, &context.events);

        let result = bounded(
            "wait for burst",
            timeouts.acquisition,
            context.link.wait_for_result(kind),
        )
        .await?;
        let result = Arc::new(result);
        if kind == BurstKind::Trial {
            return Ok(BurstOutcome {
                result,
                saved_to: None,
                entry: None,
            });
        }

        let directory = {
            let catalog = lock_catalog(&context.catalog)?;
            catalog.ensure_directory()?;
            catalog.directory().to_path_buf()
        };
        let saved_to = bounded(
            "download burst",
            timeouts.acquisition,
            context.link.download_file(&result.filename, &directory),
        )
        .await?;
        let entry = CatalogEntry::from_path(&saved_to)?;
        {
            let mut catalog = lock_catalog(&context.catalog)?;
            catalog.insert_new(entry.clone());
            context.events.catalog_refreshed(&catalog.entries());
        }
        Ok(BurstOutcome {
            result,
            saved_to: Some(saved_to),
            entry: Some(entry),
        })
    }
}

fn lock_catalog(
    catalog: &Mutex<BurstCatalog>,
) -> ConsoleResult<std::sync::MutexGuard<'_, BurstCatalog>> {
    catalog
        .lock()
        .map_err(|_| ConsoleError::Storage("catalog lock poisoned".into()))
}

/// Resolves once the session signals teardown or its owner is gone.
async fn torn_down(teardown: &mut watch::Receiver<bool>) {
    let _ = teardown.wait_for(|down| *down).await;
}
