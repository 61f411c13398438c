use std::time::Duration;

use crate::instrument::BurstKind;
use crate::transport::TransportError;

/// Error taxonomy surfaced by the controller to its callers and subscribers.
///
/// Values are `Clone` so a single failure can be broadcast to every
/// subscriber and also delivered to the handle that triggered it.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConsoleError {
    #[error("connection failed: {reason}")]
    Connect { reason: String },
    #[error("no instrument session is active")]
    NotConnected,
    #[error("device error: {0}")]
    Device(String),
    #[error("invalid configuration field `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    #[error("{0} acquisition already in flight")]
    Busy(BurstKind),
    #[error("operation `{operation}` timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("file not found on instrument: {0} (check the storage media is installed)")]
    FileNotFound(String),
    #[error("operation aborted: session torn down")]
    Aborted,
    #[error("local storage error: {0}")]
    Storage(String),
}

impl ConsoleError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConsoleError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        ConsoleError::Storage(err.to_string())
    }

    /// Maps a transport failure raised during `operation`.
    pub fn from_transport(operation: &'static str, err: TransportError, after: Duration) -> Self {
        match err {
            TransportError::NotFound(name) => ConsoleError::FileNotFound(name),
            TransportError::Timeout => ConsoleError::Timeout { operation, after },
            other => ConsoleError::Device(other.to_string()),
        }
    }
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// Runs a network-bound future under `after`, folding both the elapsed
/// deadline and the transport error into [`ConsoleError`].
pub async fn bounded<T, F>(operation: &'static str, after: Duration, future: F) -> ConsoleResult<T>
where
    F: std::future::Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(after, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ConsoleError::from_transport(operation, err, after)),
        Err(_) => Err(ConsoleError::Timeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_file_not_found() {
        let err = ConsoleError::from_transport(
            "download",
            TransportError::NotFound("burst_0001.dat".into()),
            Duration::from_secs(1),
        );
        assert_eq!(err, ConsoleError::FileNotFound("burst_0001.dat".into()));
    }

    #[test]
    fn rejection_maps_to_device_error() {
        let err = ConsoleError::from_transport(
            "set config",
            TransportError::Rejected {
                status: 500,
                message: "boom".into(),
            },
            Duration::from_secs(1),
        );
        assert!(matches!(err, ConsoleError::Device(_)));
    }

    #[tokio::test]
    async fn bounded_reports_elapsed_deadline_as_timeout() {
        let result: ConsoleResult<()> = bounded("status", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(
            result,
            Err(ConsoleError::Timeout {
                operation: "status",
                ..
            })
        ));
    }
}
