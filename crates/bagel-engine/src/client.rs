use std::path::Path;

use bagel_contracts::request::mime_for_path;
use bagel_contracts::{
    EventRecord, FileRef, JobOutcome, JobRequest, ProtocolError, SessionToken, UploadId,
};
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::BagelConfig;
use crate::error::{BagelError, Result};
use crate::stream::{consume_job_events, consume_upload_events, decode_events};

/// Queue acknowledgement for a submitted job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitAck {
    pub event_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DownloadedAsset {
    pub bytes: Bytes,
    pub mime_type: Option<String>,
}

/// Client for the queue/upload protocol of one inference server.
///
/// Holds no per-job state: every token, decoder buffer and accumulator lives
/// inside the call that created it, so concurrent jobs on one client are
/// independent.
#[derive(Debug, Clone)]
pub struct BagelClient {
    config: BagelConfig,
    http: HttpClient,
}

impl BagelClient {
    pub fn new(config: BagelConfig) -> Self {
        Self::with_http(config, HttpClient::new())
    }

    pub fn with_http(config: BagelConfig, http: HttpClient) -> Self {
        Self { config, http }
    }

    pub fn from_env() -> Self {
        Self::new(BagelConfig::from_env())
    }

    pub fn config(&self) -> &BagelConfig {
        &self.config
    }

    /// Enqueues a job. The server only acknowledges; results arrive on the
    /// session's event stream.
    pub async fn submit(&self, request: &JobRequest) -> Result<SubmitAck> {
        let endpoint = self.config.queue_join_url();
        let response = self
            .http
            .post(&endpoint)
            .json(request)
            .send()
            .await
            .map_err(|source| BagelError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;
        let response = ensure_success(&endpoint, response).await?;
        let body = response.text().await.map_err(|source| BagelError::Transport {
            endpoint: endpoint.clone(),
            source,
        })?;
        let event_id = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|ack| ack.get("event_id").and_then(Value::as_str).map(str::to_string));
        info!(
            session = %request.session_hash,
            fn_index = request.fn_index,
            event_id = event_id.as_deref().unwrap_or(""),
            "job submitted"
        );
        Ok(SubmitAck { event_id })
    }

    /// Follows the session's event stream until the job's terminal record.
    ///
    /// The connection is dropped as soon as the job resolves. No timeout is
    /// applied; wrap the future in `tokio::time::timeout` to bound the wait.
    pub async fn await_result(&self, session: &SessionToken) -> Result<JobOutcome> {
        let events = self
            .open_events(self.config.queue_data_url(), "session_hash", session.as_str())
            .await?;
        consume_job_events(events).await
    }

    pub async fn run_job(&self, request: &JobRequest) -> Result<JobOutcome> {
        self.submit(request).await?;
        self.await_result(&request.session_hash).await
    }

    /// Uploads a local file and returns a reference usable as a job argument.
    pub async fn upload_file(&self, path: &Path) -> Result<FileRef> {
        let bytes = tokio::fs::read(path).await.map_err(|source| BagelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image.png");
        let mime = mime_for_path(path).unwrap_or("image/png");
        let server_path = self.upload(bytes, file_name, mime).await?;
        Ok(FileRef::for_upload(server_path, path))
    }

    /// Posts `bytes` to the upload endpoint and blocks until the server
    /// confirms on the progress stream that the file is materialized.
    pub async fn upload(&self, bytes: Vec<u8>, file_name: &str, mime: &str) -> Result<String> {
        let upload_id = UploadId::generate();
        let endpoint = self.config.upload_url();
        let part = MultipartPart::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|source| BagelError::InvalidMime {
                mime: mime.to_string(),
                source,
            })?;
        let form = MultipartForm::new().part("files", part);

        let response = self
            .http
            .post(&endpoint)
            .query(&[("upload_id", upload_id.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(|source| BagelError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;
        let handles: Vec<String> = read_json(&endpoint, response).await?;
        debug!(upload_id = %upload_id, "upload posted, waiting for completion");

        self.await_upload_done(&upload_id).await?;
        let handle = handles
            .into_iter()
            .next()
            .ok_or(ProtocolError::MissingFileHandle)?;
        info!(upload_id = %upload_id, path = %handle, "upload completed");
        Ok(handle)
    }

    pub async fn await_upload_done(&self, upload_id: &UploadId) -> Result<()> {
        let events = self
            .open_events(
                self.config.upload_progress_url(),
                "upload_id",
                upload_id.as_str(),
            )
            .await?;
        consume_upload_events(events).await
    }

    pub async fn download(&self, url: &str) -> Result<DownloadedAsset> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| BagelError::Transport {
                endpoint: url.to_string(),
                source,
            })?;
        let response = ensure_success(url, response).await?;
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(|source| BagelError::Transport {
            endpoint: url.to_string(),
            source,
        })?;
        Ok(DownloadedAsset { bytes, mime_type })
    }

    async fn open_events(
        &self,
        endpoint: String,
        key: &str,
        value: &str,
    ) -> Result<impl Stream<Item = Result<EventRecord>>> {
        let response = self
            .http
            .get(&endpoint)
            .query(&[(key, value)])
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|source| BagelError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;
        let response = ensure_success(&endpoint, response).await?;
        Ok(decode_events(endpoint, response.bytes_stream()))
    }
}

async fn ensure_success(endpoint: &str, response: HttpResponse) -> Result<HttpResponse> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BagelError::HttpStatus {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body: truncate_text(&body, 512),
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(
    endpoint: &str,
    response: HttpResponse,
) -> Result<T> {
    let response = ensure_success(endpoint, response).await?;
    let body = response.text().await.map_err(|source| BagelError::Transport {
        endpoint: endpoint.to_string(),
        source,
    })?;
    serde_json::from_str(&body).map_err(|source| BagelError::InvalidResponse {
        endpoint: endpoint.to_string(),
        source,
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::{truncate_text, BagelClient};
    use crate::{BagelConfig, BagelError};

    #[test]
    fn truncate_text_counts_chars_not_bytes() {
        assert_eq!(truncate_text("héllo", 10), "héllo");
        assert_eq!(truncate_text("héllo", 2), "hé…");
    }

    #[tokio::test]
    async fn unparsable_mime_is_rejected_before_sending() {
        // Nothing listens on port 9; a request would fail as transport.
        let client = BagelClient::new(BagelConfig::new("http://127.0.0.1:9"));
        let err = client
            .upload(vec![1, 2, 3], "cat.png", "not a mime")
            .await
            .expect_err("mime must be rejected");

        assert!(matches!(err, BagelError::InvalidMime { ref mime, .. } if mime == "not a mime"));
        assert!(!err.is_transport());
        assert!(!err.is_protocol());
    }
}
