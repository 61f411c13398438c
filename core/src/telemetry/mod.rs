pub mod history;
pub mod metrics;
pub mod poller;

pub use history::TelemetryHistory;
pub use metrics::{LinkHealth, LinkMetrics};
pub use poller::{TelemetryPoller, TelemetrySnapshot};
