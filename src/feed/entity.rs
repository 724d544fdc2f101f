use std::collections::BTreeSet;
use std::sync::OnceLock;
use thiserror::Error;

use super::fetcher::{fetch_entries, FetchError};
use super::mapping::Mapping;
use super::parser::{collect_keys, RawEntry};
use super::record::AudioObject;
use crate::services::{
    DocumentId, DocumentIndex, Engine, IndexError, JobError, JobQueue, TaskCorrelation,
    TranscribeArgs, TranscribeOpts,
};
use crate::storage::FeedRecord;
use crate::util::{identify, FeedId};

/// Default upper bound for a fetched feed body (10MB).
pub const MAX_FEED_SIZE: usize = 10 * 1024 * 1024;

/// Errors raised by [`Feed`] operations.
///
/// The variants separate the stage that failed: fetching, transforming
/// (`MappingMissing`, `NotReady`) or handling a single record (`Index`,
/// `Enqueue`). Record failures carry the correlations completed before the
/// failing record so callers can decide whether the partial result is usable.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Mapping is missing for feed {feed_id} ({url})")]
    MappingMissing { feed_id: FeedId, url: String },

    #[error("Feed {url} has not been pulled")]
    NotReady { url: String },

    #[error("Indexing record {position} of feed {url} failed: {source}")]
    Index {
        url: String,
        position: usize,
        completed: Vec<TaskCorrelation>,
        #[source]
        source: IndexError,
    },

    #[error("Enqueuing job for document {doc} (record {position} of feed {url}) failed: {source}")]
    Enqueue {
        url: String,
        position: usize,
        doc: DocumentId,
        completed: Vec<TaskCorrelation>,
        #[source]
        source: JobError,
    },
}

impl FeedError {
    /// Correlations completed before the operation failed.
    pub fn completed(&self) -> &[TaskCorrelation] {
        match self {
            FeedError::Index { completed, .. } | FeedError::Enqueue { completed, .. } => completed,
            _ => &[],
        }
    }
}

/// Task settings applied to every record dispatched from a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Name of the downstream task.
    pub task: String,
    pub engine: Engine,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            task: "transcribe".to_string(),
            engine: Engine::default(),
        }
    }
}

/// A registered feed with its mapping and the entries of the last pull.
///
/// Fetched state is transient; only url, id and mapping are persisted
/// (see [`FeedRecord`]). Operations that change fetched state take
/// `&mut self`, so one instance is never pulled and transformed at once.
#[derive(Debug, Clone)]
pub struct Feed {
    url: String,
    id: FeedId,
    mapping: Option<Mapping>,
    entries: Option<Vec<RawEntry>>,
    keys: OnceLock<BTreeSet<String>>,
    max_feed_bytes: usize,
}

impl Feed {
    pub fn new(url: impl Into<String>, mapping: Option<Mapping>) -> Self {
        let url = url.into();
        Self {
            id: identify(&url),
            url,
            mapping,
            entries: None,
            keys: OnceLock::new(),
            max_feed_bytes: MAX_FEED_SIZE,
        }
    }

    pub fn from_record(record: FeedRecord) -> Self {
        Self::new(record.url, record.mapping)
    }

    pub fn to_record(&self) -> FeedRecord {
        FeedRecord {
            url: self.url.clone(),
            id: self.id,
            mapping: self.mapping.clone(),
        }
    }

    /// Limit the size of bodies accepted by [`pull`](Self::pull).
    pub fn with_max_feed_bytes(mut self, max_feed_bytes: usize) -> Self {
        self.max_feed_bytes = max_feed_bytes;
        self
    }

    pub fn max_feed_bytes(&self) -> usize {
        self.max_feed_bytes
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> FeedId {
        self.id
    }

    pub fn mapping(&self) -> Option<&Mapping> {
        self.mapping.as_ref()
    }

    pub fn set_mapping(&mut self, mapping: Option<Mapping>) {
        self.mapping = mapping;
    }

    /// Entries of the last successful pull.
    pub fn entries(&self) -> Option<&[RawEntry]> {
        self.entries.as_deref()
    }

    /// First cached entry, handy when writing a mapping for a new feed.
    pub fn example(&self) -> Option<&RawEntry> {
        self.entries.as_ref().and_then(|entries| entries.first())
    }

    pub(crate) fn replace_entries(&mut self, entries: Vec<RawEntry>) {
        self.entries = Some(entries);
        self.keys = OnceLock::new();
    }

    /// Fetch the feed and cache its entries.
    ///
    /// Performs one GET without retrying. On failure the previously cached
    /// entries are left untouched.
    pub async fn pull(&mut self, client: &reqwest::Client) -> Result<(), FeedError> {
        let entries = fetch_entries(client, &self.url, self.max_feed_bytes)
            .await
            .inspect_err(|e| {
                tracing::warn!(feed_id = %self.id, url = %self.url, error = %e, "Feed pull failed");
            })?;

        tracing::debug!(
            feed_id = %self.id,
            url = %self.url,
            entries = entries.len(),
            "Pulled feed"
        );
        self.replace_entries(entries);
        Ok(())
    }

    /// Union of field names across the cached entries.
    ///
    /// Computed once per pull. Does not pull by itself.
    pub fn keys(&self) -> Result<&BTreeSet<String>, FeedError> {
        let entries = self.entries.as_deref().ok_or_else(|| FeedError::NotReady {
            url: self.url.clone(),
        })?;
        Ok(self.keys.get_or_init(|| collect_keys(entries)))
    }

    /// Convert the cached entries into canonical records, in feed order.
    ///
    /// Mapped source fields missing from an entry leave the canonical field
    /// unset. Only the first enclosure of an entry is used.
    pub fn transform(&self) -> Result<Vec<AudioObject>, FeedError> {
        let mapping = self.mapping.as_ref().ok_or_else(|| FeedError::MappingMissing {
            feed_id: self.id,
            url: self.url.clone(),
        })?;
        let entries = self.entries.as_deref().ok_or_else(|| FeedError::NotReady {
            url: self.url.clone(),
        })?;

        let records = entries
            .iter()
            .map(|entry| transform_entry(mapping, entry))
            .collect();
        Ok(records)
    }

    /// Index every record and enqueue one task per indexed record.
    ///
    /// Pulls first when nothing is cached. Records are handled strictly in
    /// order; the first index or enqueue failure stops the loop and is
    /// returned together with the correlations completed so far.
    pub async fn index_and_create_tasks(
        &mut self,
        client: &reqwest::Client,
        index: &dyn DocumentIndex,
        jobs: &dyn JobQueue,
        options: &DispatchOptions,
    ) -> Result<Vec<TaskCorrelation>, FeedError> {
        if self.entries.is_none() {
            self.pull(client).await?;
        }

        let records = self.transform()?;
        let opts = TranscribeOpts {
            engine: options.engine,
        };
        let mut completed = Vec::with_capacity(records.len());

        for (position, record) in records.into_iter().enumerate() {
            let doc = match index.save(&record).await {
                Ok(doc) => doc,
                Err(source) => {
                    return Err(FeedError::Index {
                        url: self.url.clone(),
                        position,
                        completed,
                        source,
                    })
                }
            };

            if record.content_url.is_none() {
                tracing::warn!(
                    feed_id = %self.id,
                    position = position,
                    doc = %doc,
                    "Record has no enclosure, dispatching without media url"
                );
            }

            let args = TranscribeArgs {
                media_url: record.content_url,
                doc_id: doc.clone(),
            };
            let job = match jobs.enqueue(&options.task, &args, &opts).await {
                Ok(job) => job,
                Err(source) => {
                    return Err(FeedError::Enqueue {
                        url: self.url.clone(),
                        position,
                        doc,
                        completed,
                        source,
                    })
                }
            };

            tracing::debug!(feed_id = %self.id, doc = %doc, job = %job, "Created job");
            completed.push(TaskCorrelation { job, doc });
        }

        tracing::info!(
            feed_id = %self.id,
            url = %self.url,
            records = completed.len(),
            "Indexed feed and created tasks"
        );
        Ok(completed)
    }
}

fn transform_entry(mapping: &Mapping, entry: &RawEntry) -> AudioObject {
    let mut doc = AudioObject::default();
    for (field, source) in mapping.iter() {
        doc.set(field, entry.get(source).map(str::to_string));
    }
    if let Some(enclosure) = entry.enclosures().first() {
        doc.content_url = Some(enclosure.href.clone());
        doc.encoding_format = enclosure.kind.clone();
    }
    doc
}
