//! End-to-end tests for pull, transform and dispatch against mock HTTP
//! servers standing in for the feed host, the search index and the job
//! server.

use audiofeed::config::FetchConfig;
use audiofeed::feed::{build_client, DispatchOptions, FeedError, FeedManager, FetchError, Mapping};
use audiofeed::services::{
    DocumentId, ElasticIndex, Engine, HttpJobQueue, IndexError, JobError, JobId,
};
use audiofeed::storage::SqliteConnector;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const THREE_EPISODES: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:frn="https://www.freie-radios.net/">
<channel>
    <title>Radio</title>
    <item>
        <guid>ep-1</guid>
        <title>First</title>
        <frn:radio>Radio Dreyeckland</frn:radio>
        <enclosure url="https://cdn.example.com/1.mp3" type="audio/mpeg" length="1"/>
    </item>
    <item>
        <guid>ep-2</guid>
        <title>Second</title>
        <enclosure url="https://cdn.example.com/2.mp3" type="audio/mpeg" length="1"/>
    </item>
    <item>
        <guid>ep-3</guid>
        <title>Third</title>
        <enclosure url="https://cdn.example.com/3.ogg" type="audio/ogg" length="1"/>
    </item>
</channel>
</rss>"#;

const NO_ENCLOSURE: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Radio</title>
    <item><guid>talk</guid><title>Talk</title></item>
</channel></rss>"#;

const EMPTY_CHANNEL: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Radio</title></channel></rss>"#;

/// Answers every request with the next id from a counter.
struct SequentialIds {
    key: &'static str,
    prefix: &'static str,
    next: AtomicUsize,
}

impl SequentialIds {
    fn new(key: &'static str, prefix: &'static str) -> Self {
        Self {
            key,
            prefix,
            next: AtomicUsize::new(1),
        }
    }
}

impl Respond for SequentialIds {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let mut body = serde_json::Map::new();
        body.insert(self.key.to_string(), json!(format!("{}-{}", self.prefix, n)));
        ResponseTemplate::new(201).set_body_json(Value::Object(body))
    }
}

struct Harness {
    feed_server: MockServer,
    index_server: MockServer,
    job_server: MockServer,
    client: reqwest::Client,
    index: ElasticIndex,
    jobs: HttpJobQueue,
    manager: FeedManager,
}

impl Harness {
    async fn start() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let feed_server = MockServer::start().await;
        let index_server = MockServer::start().await;
        let job_server = MockServer::start().await;
        let client = build_client(&FetchConfig::default()).unwrap();
        let index = ElasticIndex::new(
            client.clone(),
            Url::parse(&index_server.uri()).unwrap(),
            "audio",
        );
        let jobs = HttpJobQueue::new(
            client.clone(),
            Url::parse(&format!("{}/api/v1", job_server.uri())).unwrap(),
        );
        let manager = FeedManager::new(Arc::new(SqliteConnector::in_memory()));

        Self {
            feed_server,
            index_server,
            job_server,
            client,
            index,
            jobs,
            manager,
        }
    }

    fn feed_url(&self) -> String {
        format!("{}/podcast.xml", self.feed_server.uri())
    }

    async fn serve_feed(&self, body: &str) {
        Mock::given(method("GET"))
            .and(path("/podcast.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/rss+xml")
                    .set_body_string(body),
            )
            .mount(&self.feed_server)
            .await;
    }

    async fn accept_documents(&self) {
        Mock::given(method("POST"))
            .and(path("/audio/_doc"))
            .respond_with(SequentialIds::new("_id", "doc"))
            .mount(&self.index_server)
            .await;
    }

    async fn accept_jobs(&self) {
        Mock::given(method("POST"))
            .and(path("/api/v1/job"))
            .respond_with(SequentialIds::new("id", "job"))
            .mount(&self.job_server)
            .await;
    }
}

async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.body_json::<Value>().unwrap())
        .collect()
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_three_entries_yield_three_ordered_correlations() {
    let h = Harness::start().await;
    h.serve_feed(THREE_EPISODES).await;
    h.accept_documents().await;
    h.accept_jobs().await;

    let mut feed = h.manager.put(&h.feed_url()).await.unwrap();
    let pairs = feed
        .index_and_create_tasks(&h.client, &h.index, &h.jobs, &DispatchOptions::default())
        .await
        .unwrap();

    let docs: Vec<_> = pairs.iter().map(|p| p.doc.clone()).collect();
    let jobs: Vec<_> = pairs.iter().map(|p| p.job.clone()).collect();
    assert_eq!(
        docs,
        vec![
            DocumentId("doc-1".into()),
            DocumentId("doc-2".into()),
            DocumentId("doc-3".into())
        ]
    );
    assert_eq!(
        jobs,
        vec![
            JobId("job-1".into()),
            JobId("job-2".into()),
            JobId("job-3".into())
        ]
    );

    let documents = request_bodies(&h.index_server).await;
    let headlines: Vec<_> = documents.iter().map(|d| d["headline"].clone()).collect();
    assert_eq!(headlines, vec![json!("First"), json!("Second"), json!("Third")]);
    assert_eq!(documents[0]["publisher"], json!("Radio Dreyeckland"));
    assert_eq!(documents[2]["contentUrl"], json!("https://cdn.example.com/3.ogg"));
    assert_eq!(documents[2]["encodingFormat"], json!("audio/ogg"));

    let job_requests = request_bodies(&h.job_server).await;
    assert_eq!(
        job_requests[1],
        json!({
            "typ": "transcribe",
            "args": {"media_url": "https://cdn.example.com/2.mp3", "doc_id": "doc-2"},
            "opts": {"engine": "vosk"}
        })
    );
}

#[tokio::test]
async fn test_dispatch_options_reach_job_server() {
    let h = Harness::start().await;
    h.serve_feed(NO_ENCLOSURE).await;
    h.accept_documents().await;
    h.accept_jobs().await;

    let mut feed = h.manager.put(&h.feed_url()).await.unwrap();
    let options = DispatchOptions {
        task: "transcribe-hq".to_string(),
        engine: Engine::Whisper,
    };
    let pairs = feed
        .index_and_create_tasks(&h.client, &h.index, &h.jobs, &options)
        .await
        .unwrap();
    assert_eq!(pairs.len(), 1);

    let job_requests = request_bodies(&h.job_server).await;
    assert_eq!(
        job_requests[0],
        json!({
            "typ": "transcribe-hq",
            "args": {"media_url": null, "doc_id": "doc-1"},
            "opts": {"engine": "whisper"}
        })
    );
}

#[tokio::test]
async fn test_custom_mapping_shapes_indexed_documents() {
    let h = Harness::start().await;
    h.serve_feed(THREE_EPISODES).await;
    h.accept_documents().await;
    h.accept_jobs().await;

    let url = h.feed_url();
    h.manager
        .set_mapping(&url, Mapping::from_pairs([("identifier", "id")]).unwrap())
        .await
        .unwrap();
    let mut feed = h.manager.put(&url).await.unwrap();
    feed.index_and_create_tasks(&h.client, &h.index, &h.jobs, &DispatchOptions::default())
        .await
        .unwrap();

    let documents = request_bodies(&h.index_server).await;
    assert_eq!(
        documents[0],
        json!({
            "identifier": "ep-1",
            "contentUrl": "https://cdn.example.com/1.mp3",
            "encodingFormat": "audio/mpeg"
        })
    );
}

#[tokio::test]
async fn test_cached_entries_are_not_refetched() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/podcast.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(THREE_EPISODES))
        .expect(1)
        .mount(&h.feed_server)
        .await;
    h.accept_documents().await;
    h.accept_jobs().await;

    let mut feed = h.manager.put(&h.feed_url()).await.unwrap();
    feed.pull(&h.client).await.unwrap();
    let pairs = feed
        .index_and_create_tasks(&h.client, &h.index, &h.jobs, &DispatchOptions::default())
        .await
        .unwrap();
    assert_eq!(pairs.len(), 3);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_unreachable_feed_is_fetch_error_without_writes() {
    let h = Harness::start().await;
    let url = {
        let gone = MockServer::start().await;
        format!("{}/podcast.xml", gone.uri())
    };
    h.accept_documents().await;
    h.accept_jobs().await;

    let mut feed = h.manager.put(&url).await.unwrap();
    let err = feed
        .index_and_create_tasks(&h.client, &h.index, &h.jobs, &DispatchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, FeedError::Fetch(FetchError::Transport { .. })));
    assert!(request_bodies(&h.index_server).await.is_empty());
    assert!(request_bodies(&h.job_server).await.is_empty());
}

#[tokio::test]
async fn test_empty_refresh_keeps_previous_entries() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/podcast.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(THREE_EPISODES))
        .up_to_n_times(1)
        .mount(&h.feed_server)
        .await;
    h.serve_feed(EMPTY_CHANNEL).await;

    let mut feed = h.manager.put(&h.feed_url()).await.unwrap();
    feed.pull(&h.client).await.unwrap();
    assert_eq!(feed.entries().map(<[_]>::len), Some(3));

    let err = feed.pull(&h.client).await.unwrap_err();
    assert!(matches!(err, FeedError::Fetch(FetchError::EmptyFeed { .. })));
    assert_eq!(feed.entries().map(<[_]>::len), Some(3));
    assert!(feed.keys().unwrap().contains("frn_radio"));
}

#[tokio::test]
async fn test_http_error_status_is_fetch_error() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/podcast.xml"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&h.feed_server)
        .await;

    let mut feed = h.manager.put(&h.feed_url()).await.unwrap();
    let err = feed.pull(&h.client).await.unwrap_err();
    assert!(matches!(
        err,
        FeedError::Fetch(FetchError::HttpStatus { status: 500, .. })
    ));
    assert!(feed.entries().is_none());
}

#[tokio::test]
async fn test_missing_mapping_stops_before_any_write() {
    let h = Harness::start().await;
    h.serve_feed(THREE_EPISODES).await;
    h.accept_documents().await;
    h.accept_jobs().await;

    let mut feed = h.manager.put(&h.feed_url()).await.unwrap();
    feed.set_mapping(None);
    let err = feed
        .index_and_create_tasks(&h.client, &h.index, &h.jobs, &DispatchOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, FeedError::MappingMissing { .. }));
    assert!(request_bodies(&h.index_server).await.is_empty());
    assert!(request_bodies(&h.job_server).await.is_empty());
}

#[tokio::test]
async fn test_index_failure_stops_and_reports_progress() {
    let h = Harness::start().await;
    h.serve_feed(THREE_EPISODES).await;
    Mock::given(method("POST"))
        .and(path("/audio/_doc"))
        .respond_with(SequentialIds::new("_id", "doc"))
        .up_to_n_times(1)
        .mount(&h.index_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/audio/_doc"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&h.index_server)
        .await;
    h.accept_jobs().await;

    let mut feed = h.manager.put(&h.feed_url()).await.unwrap();
    let err = feed
        .index_and_create_tasks(&h.client, &h.index, &h.jobs, &DispatchOptions::default())
        .await
        .unwrap_err();

    match &err {
        FeedError::Index {
            position, source, ..
        } => {
            assert_eq!(*position, 1);
            assert!(matches!(source, IndexError::Status { status: 503, .. }));
        }
        other => panic!("expected index failure, got {other:?}"),
    }
    assert_eq!(err.completed().len(), 1);
    assert_eq!(err.completed()[0].doc, DocumentId("doc-1".into()));
    // Records after the failing one are never sent.
    assert_eq!(request_bodies(&h.index_server).await.len(), 2);
    assert_eq!(request_bodies(&h.job_server).await.len(), 1);
}

#[tokio::test]
async fn test_enqueue_failure_reports_orphaned_document() {
    let h = Harness::start().await;
    h.serve_feed(THREE_EPISODES).await;
    h.accept_documents().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/job"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "queued"})))
        .mount(&h.job_server)
        .await;

    let mut feed = h.manager.put(&h.feed_url()).await.unwrap();
    let err = feed
        .index_and_create_tasks(&h.client, &h.index, &h.jobs, &DispatchOptions::default())
        .await
        .unwrap_err();

    match err {
        FeedError::Enqueue {
            position,
            doc,
            completed,
            source,
            ..
        } => {
            assert_eq!(position, 0);
            assert_eq!(doc, DocumentId("doc-1".into()));
            assert!(completed.is_empty());
            assert!(matches!(source, JobError::Response(_)));
        }
        other => panic!("expected enqueue failure, got {other:?}"),
    }
    assert_eq!(request_bodies(&h.index_server).await.len(), 1);
}
