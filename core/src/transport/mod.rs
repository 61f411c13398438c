//! Client side of the instrument link.
//!
//! The controller never speaks HTTP directly; it drives a [`Connector`] to
//! open a session and an [`InstrumentLink`] for everything afterwards.

use reqwest::Url;
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::instrument::{BurstKind, BurstResult, HousekeepingStatus, RadarConfig, ResetAck};

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::{HttpConnector, HttpLink};

/// Failures raised by the transport.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("instrument unreachable: {0}")]
    Unreachable(String),
    #[error("API key rejected by instrument")]
    Unauthorized,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("instrument rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request timed out")]
    Timeout,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Opens an authenticated link to one instrument.
pub trait Connector: Send + Sync + 'static {
    type Link: InstrumentLink;

    fn connect(
        &self,
        address: &Url,
        key: &str,
    ) -> impl Future<Output = TransportResult<Self::Link>> + Send;
}

/// Operations available on an open instrument link.
pub trait InstrumentLink: Send + Sync + 'static {
    fn set_key(&self, key: &str);

    fn status(&self) -> impl Future<Output = TransportResult<HousekeepingStatus>> + Send;

    fn get_config(&self) -> impl Future<Output = TransportResult<RadarConfig>> + Send;

    fn set_config(
        &self,
        config: &RadarConfig,
    ) -> impl Future<Output = TransportResult<RadarConfig>> + Send;

    /// Returns once the instrument has accepted the trigger.
    fn trigger_burst(&self, kind: BurstKind) -> impl Future<Output = TransportResult<()>> + Send;

    /// Resolves when the triggered burst has finished on the device.
    fn wait_for_result(
        &self,
        kind: BurstKind,
    ) -> impl Future<Output = TransportResult<BurstResult>> + Send;

    /// Copies a stored burst file into `local_dir`, returning the local path.
    fn download_file(
        &self,
        remote_name: &str,
        local_dir: &Path,
    ) -> impl Future<Output = TransportResult<PathBuf>> + Send;

    /// Raw contents of the instrument's `config.ini`.
    fn config_file(&self) -> impl Future<Output = TransportResult<Vec<u8>>> + Send;

    fn upload_config_file(&self, contents: Vec<u8>)
        -> impl Future<Output = TransportResult<()>> + Send;

    fn reset(&self) -> impl Future<Output = TransportResult<ResetAck>> + Send;
}

/// Rejects remote names that would escape the download directory.
pub fn local_target(remote_name: &str, local_dir: &Path) -> TransportResult<PathBuf> {
    let name = Path::new(remote_name);
    match name.file_name() {
        Some(file) if file == name.as_os_str() => Ok(local_dir.join(file)),
        _ => Err(TransportError::Malformed(format!(
            "refusing remote file name `{remote_name}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_target_refuses_path_components() {
        let dir = Path::new("/tmp/survey");
        assert_eq!(
            local_target("burst_0001.dat", dir).unwrap(),
            dir.join("burst_0001.dat")
        );
        assert!(local_target("../etc/passwd", dir).is_err());
        assert!(local_target("a/b.dat", dir).is_err());
        assert!(local_target("", dir).is_err());
    }
}
