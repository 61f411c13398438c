use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use super::{local_target, Connector, InstrumentLink, TransportError, TransportResult};
use crate::instrument::{BurstKind, BurstResult, HousekeepingStatus, RadarConfig, ResetAck};

/// Header carrying the instrument API key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Opens [`HttpLink`]s with a shared request timeout.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    request_timeout: Duration,
    result_poll_interval: Duration,
}

impl HttpConnector {
    pub fn new(request_timeout: Duration, result_poll_interval: Duration) -> Self {
        Self {
            request_timeout,
            result_poll_interval,
        }
    }
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_millis(500))
    }
}

impl Connector for HttpConnector {
    type Link = HttpLink;

    async fn connect(&self, address: &Url, key: &str) -> TransportResult<HttpLink> {
        let client = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|err| TransportError::Unreachable(err.to_string()))?;
        let link = HttpLink {
            client,
            base: address.clone(),
            key: RwLock::new(key.to_string()),
            result_poll_interval: self.result_poll_interval,
        };
        // The handshake is an authenticated status read.
        link.status().await?;
        Ok(link)
    }
}

/// Authenticated HTTP link to one instrument.
#[derive(Debug)]
pub struct HttpLink {
    client: Client,
    base: Url,
    key: RwLock<String>,
    result_poll_interval: Duration,
}

impl HttpLink {
    fn endpoint(&self, path: &str) -> TransportResult<Url> {
        self.base
            .join(path)
            .map_err(|err| TransportError::Malformed(format!("bad endpoint {path}: {err}")))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let key = self.key.read().map(|key| key.clone()).unwrap_or_default();
        request.header(API_KEY_HEADER, key)
    }

    async fn get(&self, path: &str) -> TransportResult<Response> {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(request_error)?;
        check(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> TransportResult<T> {
        self.get(path).await?.json::<T>().await.map_err(request_error)
    }
}

impl InstrumentLink for HttpLink {
    fn set_key(&self, key: &str) {
        if let Ok(mut guard) = self.key.write() {
            *guard = key.to_string();
        }
    }

    async fn status(&self) -> TransportResult<HousekeepingStatus> {
        self.get_json("api/system/housekeeping/status").await
    }

    async fn get_config(&self) -> TransportResult<RadarConfig> {
        self.get_json("api/radar/config").await
    }

    async fn set_config(&self, config: &RadarConfig) -> TransportResult<RadarConfig> {
        let url = self.endpoint("api/radar/config")?;
        let response = self
            .authorized(self.client.post(url))
            .json(config)
            .send()
            .await
            .map_err(request_error)?;
        check(response)
            .await?
            .json::<RadarConfig>()
            .await
            .map_err(request_error)
    }

    async fn trigger_burst(&self, kind: BurstKind) -> TransportResult<()> {
        let path = match kind {
            BurstKind::Trial => "api/radar/trial-burst",
            BurstKind::Persisted => "api/radar/burst",
        };
        let url = self.endpoint(path)?;
        let response = self
            .authorized(self.client.post(url))
            .send()
            .await
            .map_err(request_error)?;
        check(response).await.map(|_| ())
    }

    async fn wait_for_result(&self, kind: BurstKind) -> TransportResult<BurstResult> {
        let mut url = self.endpoint("api/radar/results")?;
        url.query_pairs_mut().append_pair("kind", &kind.to_string());
        loop {
            let response = self
                .authorized(self.client.get(url.clone()))
                .send()
                .await
                .map_err(request_error)?;
            if response.status() == StatusCode::ACCEPTED {
                tokio::time::sleep(self.result_poll_interval).await;
                continue;
            }
            let result = check(response)
                .await?
                .json::<BurstResult>()
                .await
                .map_err(request_error)?;
            result.check_shape().map_err(TransportError::Malformed)?;
            return Ok(result);
        }
    }

    async fn download_file(&self, remote_name: &str, local_dir: &Path) -> TransportResult<PathBuf> {
        let target = local_target(remote_name, local_dir)?;
        let url = self.endpoint(&format!("api/data/download/{remote_name}"))?;
        debug!("GET {}", url);
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(request_error)?;
        // Only a missing burst file means missing storage; other 404s are device errors.
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(remote_name.to_string()));
        }
        let bytes = check(response)
            .await?
            .bytes()
            .await
            .map_err(request_error)?;
        tokio::fs::write(&target, &bytes).await.map_err(|err| {
            TransportError::Malformed(format!("writing {}: {err}", target.display()))
        })?;
        Ok(target)
    }

    async fn config_file(&self) -> TransportResult<Vec<u8>> {
        let response = self.get("api/system/housekeeping/config").await?;
        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }

    async fn upload_config_file(&self, contents: Vec<u8>) -> TransportResult<()> {
        let url = self.endpoint("api/system/housekeeping/config")?;
        let response = self
            .authorized(self.client.post(url))
            .body(contents)
            .send()
            .await
            .map_err(request_error)?;
        check(response).await.map(|_| ())
    }

    async fn reset(&self) -> TransportResult<ResetAck> {
        let url = self.endpoint("api/system/reset")?;
        let response = self
            .authorized(self.client.post(url))
            .send()
            .await
            .map_err(request_error)?;
        check(response)
            .await?
            .json::<ResetAck>()
            .await
            .map_err(request_error)
    }
}

async fn check(response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TransportError::Unauthorized),
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Malformed(err.to_string())
    } else {
        TransportError::Unreachable(err.to_string())
    }
}
