//! Downstream collaborators: the search index that stores records and the
//! job system that runs one processing task per record.
//!
//! Both are async traits so the pipeline can run against any backend:
//!
//! - [`index`] - [`DocumentIndex`] and the Elasticsearch implementation
//! - [`jobs`] - [`JobQueue`], task arguments and the HTTP job-server implementation

pub mod index;
pub mod jobs;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use index::{DocumentIndex, ElasticIndex, IndexError};
pub use jobs::{Engine, HttpJobQueue, JobError, JobQueue, TranscribeArgs, TranscribeOpts};

/// Identifier assigned to a record by the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

/// Identifier assigned to an enqueued task by the job system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Links a dispatched task to the record it processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCorrelation {
    pub job: JobId,
    pub doc: DocumentId,
}

/// Read the `field` of a JSON response as an id, accepting strings and numbers.
pub(crate) fn id_field(body: &serde_json::Value, field: &str) -> Option<String> {
    match body.get(field)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Join a path onto a base URL, keeping any path the base already has.
pub(crate) fn endpoint(base: &url::Url, segments: &[&str]) -> url::Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
