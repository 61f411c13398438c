use chrono::{DateTime, Local};
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::control::events::{ConsoleEvent, EventBus};
use crate::instrument::HousekeepingStatus;
use crate::math::stats::{StatsHelper, Summary};
use crate::prelude::bounded;
use crate::telemetry::history::TelemetryHistory;
use crate::telemetry::metrics::{LinkHealth, LinkMetrics};
use crate::transport::InstrumentLink;

/// Point-in-time view of the telemetry state for presentation.
#[derive(Debug, Clone)]
pub struct TelemetrySnapshot {
    /// Last status received; kept through link failures.
    pub status: Option<HousekeepingStatus>,
    pub updated_at: Option<DateTime<Local>>,
    pub history: Vec<f32>,
    pub timeline: Vec<f64>,
    pub summary: Option<Summary>,
    pub health: LinkHealth,
}

impl TelemetrySnapshot {
    pub fn is_stale(&self) -> bool {
        self.status.is_none() || self.health.is_degraded()
    }
}

struct PollerShared {
    history: Mutex<TelemetryHistory>,
    latest: Mutex<Option<(HousekeepingStatus, DateTime<Local>)>>,
    metrics: LinkMetrics,
}

impl PollerShared {
    /// Completion handler for a successful poll; the only writer of the
    /// history buffer.
    fn record(&self, status: &HousekeepingStatus) -> Vec<f32> {
        self.metrics.record_success();
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some((status.clone(), Local::now()));
        }
        match self.history.lock() {
            Ok(mut history) => {
                history.push(status.battery_voltage);
                history.to_vec()
            }
            Err(_) => Vec::new(),
        }
    }
}

/// Periodic housekeeping poller. One poll is in flight at most, and the next
/// one starts a full interval after the previous one finished.
pub struct TelemetryPoller {
    shared: Arc<PollerShared>,
    stop: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl TelemetryPoller {
    pub fn new(capacity: usize, interval: Duration) -> Self {
        Self {
            shared: Arc::new(PollerShared {
                history: Mutex::new(TelemetryHistory::new(capacity, interval)),
                latest: Mutex::new(None),
                metrics: LinkMetrics::new(),
            }),
            stop: None,
            task: None,
        }
    }

    /// Starts polling `link`, replacing any previous polling task. The first
    /// poll is issued immediately.
    pub fn start<L: InstrumentLink>(
        &mut self,
        link: Arc<L>,
        interval: Duration,
        timeout: Duration,
        events: EventBus,
    ) {
        self.stop();
        let (stop_tx, stop_rx) = watch::channel(false);
        let shared = self.shared.clone();
        self.task = Some(tokio::spawn(poll_loop(
            link, shared, interval, timeout, events, stop_rx,
        )));
        self.stop = Some(stop_tx);
    }

    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.send_replace(true);
            self.shared.metrics.mark_stale("telemetry stopped");
        }
        self.task = None;
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let (status, updated_at) = match self.shared.latest.lock() {
            Ok(latest) => match latest.as_ref() {
                Some((status, at)) => (Some(status.clone()), Some(*at)),
                None => (None, None),
            },
            Err(_) => (None, None),
        };
        let (history, timeline) = match self.shared.history.lock() {
            Ok(history) => (history.to_vec(), history.timeline()),
            Err(_) => (Vec::new(), Vec::new()),
        };
        TelemetrySnapshot {
            status,
            updated_at,
            summary: StatsHelper::summarize(&history),
            history,
            timeline,
            health: self.shared.metrics.snapshot(),
        }
    }
}

impl Drop for TelemetryPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop<L: InstrumentLink>(
    link: Arc<L>,
    shared: Arc<PollerShared>,
    interval: Duration,
    timeout: Duration,
    events: EventBus,
    mut stop: watch::Receiver<bool>,
) {
    debug!("telemetry polling every {:?}", interval);
    loop {
        let polled = tokio::select! {
            _ = stop.changed() => break,
            polled = bounded("housekeeping status", timeout, link.status()) => polled,
        };
        match polled {
            Ok(status) => {
                let history = shared.record(&status);
                events.emit(ConsoleEvent::StatusUpdated { status, history });
            }
            Err(error) => {
                warn!("telemetry poll failed: {}", error);
                shared.metrics.record_failure(&error.to_string());
                events.emit(ConsoleEvent::TelemetryDegraded { error });
            }
        }
        tokio::select! {
            _ = stop.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("telemetry polling stopped");
}
