use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use super::{endpoint, id_field, DocumentId};
use crate::feed::AudioObject;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Index returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Index response has no document id: {0}")]
    Response(String),
}

/// Storage for canonical records.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Persist `record` and return the id the index assigned to it.
    async fn save(&self, record: &AudioObject) -> Result<DocumentId, IndexError>;
}

/// [`DocumentIndex`] backed by the Elasticsearch document API.
///
/// Records are POSTed to `{url}/{index}/_doc`, letting Elasticsearch assign
/// the id.
#[derive(Debug, Clone)]
pub struct ElasticIndex {
    client: reqwest::Client,
    url: Url,
    index: String,
}

impl ElasticIndex {
    pub fn new(client: reqwest::Client, url: Url, index: impl Into<String>) -> Self {
        Self {
            client,
            url,
            index: index.into(),
        }
    }
}

#[async_trait]
impl DocumentIndex for ElasticIndex {
    async fn save(&self, record: &AudioObject) -> Result<DocumentId, IndexError> {
        let url = endpoint(&self.url, &[self.index.as_str(), "_doc"]);
        let response = self.client.post(url).json(record).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await?;
        let id = id_field(&body, "_id").ok_or_else(|| IndexError::Response(body.to_string()))?;
        tracing::debug!(index = %self.index, doc = %id, "Indexed record");
        Ok(DocumentId(id))
    }
}
