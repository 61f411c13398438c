use std::sync::Mutex;

/// Counters describing how the telemetry link has behaved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkHealth {
    pub polls: usize,
    pub failures: usize,
    pub consecutive_failures: usize,
    pub last_error: Option<String>,
}

impl LinkHealth {
    /// The link is degraded while the most recent poll failed.
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures > 0
    }
}

pub struct LinkMetrics {
    inner: Mutex<LinkHealth>,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LinkHealth::default()),
        }
    }

    pub fn record_success(&self) {
        if let Ok(mut health) = self.inner.lock() {
            health.polls += 1;
            health.consecutive_failures = 0;
            health.last_error = None;
        }
    }

    pub fn record_failure(&self, error: &str) {
        if let Ok(mut health) = self.inner.lock() {
            health.polls += 1;
            health.failures += 1;
            health.consecutive_failures += 1;
            health.last_error = Some(error.to_string());
        }
    }

    /// Marks the link degraded without counting a poll, e.g. on disconnect.
    pub fn mark_stale(&self, reason: &str) {
        if let Ok(mut health) = self.inner.lock() {
            health.consecutive_failures = health.consecutive_failures.max(1);
            health.last_error = Some(reason.to_string());
        }
    }

    pub fn snapshot(&self) -> LinkHealth {
        self.inner
            .lock()
            .map(|health| health.clone())
            .unwrap_or_default()
    }
}

impl Default for LinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}
