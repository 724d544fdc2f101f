use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::{endpoint, id_field, DocumentId, JobId};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Job server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Job server response has no job id: {0}")]
    Response(String),
}

/// Speech recognition engine a transcription task runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Vosk,
    Whisper,
}

/// Arguments of a transcription task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscribeArgs {
    /// Media to transcribe; `None` when the entry had no enclosure.
    pub media_url: Option<String>,
    /// Index document the result belongs to.
    pub doc_id: DocumentId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscribeOpts {
    pub engine: Engine,
}

/// Queue for downstream processing tasks.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(
        &self,
        task: &str,
        args: &TranscribeArgs,
        opts: &TranscribeOpts,
    ) -> Result<JobId, JobError>;
}

#[derive(Serialize)]
struct JobRequest<'a> {
    typ: &'a str,
    args: &'a TranscribeArgs,
    opts: &'a TranscribeOpts,
}

/// [`JobQueue`] backed by the job server's HTTP API (`POST {url}/job`).
#[derive(Debug, Clone)]
pub struct HttpJobQueue {
    client: reqwest::Client,
    url: Url,
}

impl HttpJobQueue {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl JobQueue for HttpJobQueue {
    async fn enqueue(
        &self,
        task: &str,
        args: &TranscribeArgs,
        opts: &TranscribeOpts,
    ) -> Result<JobId, JobError> {
        let url = endpoint(&self.url, &["job"]);
        let request = JobRequest {
            typ: task,
            args,
            opts,
        };
        let response = self.client.post(url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await?;
        let id = id_field(&body, "id").ok_or_else(|| JobError::Response(body.to_string()))?;
        tracing::debug!(task = %task, job = %id, doc = %args.doc_id, "Enqueued job");
        Ok(JobId(id))
    }
}
