//! End-to-end pipeline behavior against in-memory directory and backend
//! fakes. No network access.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use citegate::backend::{CollectionClient, SearchClient};
use citegate::collection::PermissionPolicy;
use citegate::config::ResultsConfig;
use citegate::directory::{DirectoryClient, DirectoryEntry, ScopeValue};
use citegate::error::{BackendError, DirectoryError, PipelineError};
use citegate::models::{AuthorizationScope, HitMetadata, SearchHit, SearchRequest, UserIdentity};
use citegate::pipeline::{PipelineSettings, SearchPipeline};
use citegate::results::ResultSettings;
use citegate::search::SearchSettings;

const GUID: &str = "3F2504E0-4F89-11D3-9A0C-0305E82C3301";
const GUID_BYTES: [u8; 16] = [
    0x3f, 0x25, 0x04, 0xe0, 0x4f, 0x89, 0x11, 0xd3, 0x9a, 0x0c, 0x03, 0x05, 0xe8, 0x2c, 0x33, 0x01,
];

// ─── Fakes ──────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Dir {
    One,
    Nobody,
    Twice,
    Down,
    Hang,
}

struct FakeDirectory {
    mode: Dir,
    calls: AtomicUsize,
}

impl FakeDirectory {
    fn new(mode: Dir) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectory {
    async fn lookup_scope(&self, _email: &str) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let entry = || DirectoryEntry {
            scope: Some(ScopeValue::Binary(GUID_BYTES.to_vec())),
        };
        match self.mode {
            Dir::One => Ok(vec![entry()]),
            Dir::Nobody => Ok(vec![]),
            Dir::Twice => Ok(vec![entry(), entry()]),
            Dir::Down => Err(DirectoryError::Timeout),
            Dir::Hang => {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(vec![entry()])
            }
        }
    }
}

enum Search {
    Hits(Vec<SearchHit>),
    Fail,
}

struct FakeBackend {
    collection: Result<Option<String>, ()>,
    search: Search,
    scopes: Mutex<Vec<String>>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl FakeBackend {
    fn new(collection: Result<Option<&str>, ()>, search: Search) -> Arc<Self> {
        Arc::new(Self {
            collection: collection.map(|c| c.map(String::from)),
            search,
            scopes: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn collection_calls(&self) -> usize {
        self.scopes.lock().unwrap().len()
    }

    fn search_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CollectionClient for FakeBackend {
    async fn lookup_collection(
        &self,
        scope: &AuthorizationScope,
    ) -> Result<Option<String>, BackendError> {
        self.scopes.lock().unwrap().push(scope.guid().to_string());
        self.collection
            .clone()
            .map_err(|_| BackendError::status(500, "collection service exploded"))
    }
}

#[async_trait]
impl SearchClient for FakeBackend {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.search {
            Search::Hits(hits) => Ok(hits.clone()),
            Search::Fail => Err(BackendError::status(502, "bad gateway")),
        }
    }
}

fn hit(title: &str, filename: &str, score: f64, text: &str) -> SearchHit {
    SearchHit {
        text: text.to_string(),
        score,
        metadata: HitMetadata {
            title: Some(title.to_string()),
            filename: Some(filename.to_string()),
            ..Default::default()
        },
    }
}

fn two_hits() -> Search {
    Search::Hits(vec![
        hit(
            "Strategy Playbook",
            "files__default:8060008",
            0.91,
            "Porter's five forces and the BCG matrix are covered in section 2.",
        ),
        hit(
            "Board Minutes 2024",
            "files_42",
            0.62,
            "The board discussed Blue Ocean as an alternative framework.",
        ),
    ])
}

fn settings(min_relevance_score: f64) -> PipelineSettings {
    let results = ResultsConfig {
        min_relevance_score,
        ..ResultsConfig::default()
    };
    PipelineSettings {
        min_query_chars: 3,
        directory_timeout: Duration::from_millis(100),
        collection_timeout: Duration::from_millis(100),
        search: SearchSettings {
            use_hybrid: true,
            limit: 10,
            min_relevance: min_relevance_score,
            timeout: Duration::from_millis(500),
        },
        results: ResultSettings::new(&results, "https://cloud.example.com/"),
        include_metadata: true,
    }
}

fn build(
    directory: &Arc<FakeDirectory>,
    backend: &Arc<FakeBackend>,
    policy: PermissionPolicy,
    settings: PipelineSettings,
) -> SearchPipeline {
    SearchPipeline::new(
        directory.clone(),
        backend.clone(),
        backend.clone(),
        policy,
        settings,
    )
}

fn alice() -> UserIdentity {
    UserIdentity::new("alice@corp.example")
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_authorized_search_with_instructions() {
    let directory = FakeDirectory::new(Dir::One);
    let backend = FakeBackend::new(Ok(Some("col-alice")), two_hits());
    let pipeline = build(&directory, &backend, PermissionPolicy::Enforced, settings(0.0));

    let context = pipeline
        .run("strategy frameworks | Present as a table", &alice())
        .await
        .unwrap();

    assert_eq!(directory.calls(), 1);
    assert_eq!(*backend.scopes.lock().unwrap(), [GUID]);

    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].query, "strategy frameworks");
    assert_eq!(requests[0].filter.collection_id.as_deref(), Some("col-alice"));

    assert!(context.text.contains("[Strategy Playbook]"));
    assert!(context.text.contains("https://cloud.example.com/f/8060008"));
    assert!(context.text.contains("[Board Minutes 2024]"));
    assert!(context.text.contains("https://cloud.example.com/f/42"));
    assert!(context.text.trim_end().ends_with("Present as a table"));

    let ids: Vec<&str> = context
        .sources
        .iter()
        .map(|c| c.citation_id.as_str())
        .collect();
    assert_eq!(ids, ["Strategy Playbook", "Board Minutes 2024"]);
}

#[tokio::test]
async fn test_low_scoring_hit_is_dropped() {
    let directory = FakeDirectory::new(Dir::One);
    let backend = FakeBackend::new(
        Ok(Some("col-alice")),
        Search::Hits(vec![
            hit("Doc A", "files__default:8060008", 0.9, "frameworks overview"),
            hit("Doc B", "files__default:8060009", 0.1, "unrelated memo"),
        ]),
    );
    let pipeline = build(&directory, &backend, PermissionPolicy::Enforced, settings(0.3));

    let context = pipeline
        .run("strategy frameworks | Present as a table", &alice())
        .await
        .unwrap();

    assert!(context.text.contains("[Doc A]"));
    assert!(context.text.contains("Present as a table"));
    assert!(!context.text.contains("Doc B"));
    assert_eq!(context.sources.len(), 1);
    assert_eq!(
        context.sources[0].link.as_deref(),
        Some("https://cloud.example.com/f/8060008")
    );
}

#[tokio::test]
async fn test_directory_timeout_denies_without_search() {
    let directory = FakeDirectory::new(Dir::Hang);
    let backend = FakeBackend::new(Ok(Some("col-alice")), two_hits());
    let pipeline = build(&directory, &backend, PermissionPolicy::Enforced, settings(0.0));

    let err = pipeline.run("budget", &alice()).await.unwrap_err();
    assert!(matches!(err, PipelineError::AccessDenied));
    assert!(!err.is_retryable());
    assert_eq!(backend.collection_calls(), 0);
    assert_eq!(backend.search_calls(), 0);
}

#[tokio::test]
async fn test_unresolved_identity_denies_without_search() {
    for mode in [Dir::Nobody, Dir::Twice, Dir::Down] {
        let directory = FakeDirectory::new(mode);
        let backend = FakeBackend::new(Ok(Some("col-alice")), two_hits());
        let pipeline = build(&directory, &backend, PermissionPolicy::Enforced, settings(0.0));

        let err = pipeline.run("budget", &alice()).await.unwrap_err();
        assert!(matches!(err, PipelineError::AccessDenied));
        assert_eq!(directory.calls(), 1);
        assert_eq!(backend.collection_calls(), 0);
        assert_eq!(backend.search_calls(), 0);
    }
}

#[tokio::test]
async fn test_missing_or_failed_collection_denies() {
    for collection in [Ok(None), Err(())] {
        let directory = FakeDirectory::new(Dir::One);
        let backend = FakeBackend::new(collection, two_hits());
        let pipeline = build(&directory, &backend, PermissionPolicy::Enforced, settings(0.0));

        let err = pipeline.run("budget", &alice()).await.unwrap_err();
        assert!(matches!(err, PipelineError::AccessDenied));
        assert_eq!(backend.collection_calls(), 1);
        assert_eq!(backend.search_calls(), 0);
    }
}

#[tokio::test]
async fn test_bypass_uses_default_collection() {
    let directory = FakeDirectory::new(Dir::Down);
    let backend = FakeBackend::new(Err(()), two_hits());
    let policy = PermissionPolicy::Bypass {
        default_collection_id: Some("shared".to_string()),
    };
    let pipeline = build(&directory, &backend, policy, settings(0.0));

    pipeline
        .run("budget", &UserIdentity::new("anyone"))
        .await
        .unwrap();

    assert_eq!(directory.calls(), 0);
    assert_eq!(backend.collection_calls(), 0);
    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests[0].filter.collection_id.as_deref(), Some("shared"));
}

#[tokio::test]
async fn test_bypass_without_default_is_unfiltered() {
    let directory = FakeDirectory::new(Dir::One);
    let backend = FakeBackend::new(Ok(None), two_hits());
    let policy = PermissionPolicy::Bypass {
        default_collection_id: None,
    };
    let pipeline = build(&directory, &backend, policy, settings(0.0));

    pipeline.run("budget", &alice()).await.unwrap();

    let requests = backend.requests.lock().unwrap();
    assert!(requests[0].filter.granted);
    assert_eq!(requests[0].filter.collection_id, None);
}

#[tokio::test]
async fn test_no_hits_above_threshold_is_not_an_error() {
    let directory = FakeDirectory::new(Dir::One);
    let backend = FakeBackend::new(
        Ok(Some("col-alice")),
        Search::Hits(vec![hit("Weak", "files_1", 0.1, "barely related")]),
    );
    let pipeline = build(&directory, &backend, PermissionPolicy::Enforced, settings(0.5));

    let context = pipeline.run("budget", &alice()).await.unwrap();
    assert!(context.sources.is_empty());
    assert!(context.text.contains("No authorized documents matched"));
    assert_ne!(
        context.text,
        PipelineError::AccessDenied.user_message(),
        "no-match context must not read like a denial"
    );
}

#[tokio::test]
async fn test_search_failure_is_distinct_from_empty() {
    let directory = FakeDirectory::new(Dir::One);
    let backend = FakeBackend::new(Ok(Some("col-alice")), Search::Fail);
    let pipeline = build(&directory, &backend, PermissionPolicy::Enforced, settings(0.0));

    let err = pipeline.run("budget", &alice()).await.unwrap_err();
    assert!(matches!(err, PipelineError::SearchUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(err.code(), "search_unavailable");
    assert_ne!(err.user_message(), PipelineError::AccessDenied.user_message());
}

#[tokio::test]
async fn test_runs_share_no_state() {
    let directory = FakeDirectory::new(Dir::One);
    let backend = FakeBackend::new(Ok(Some("col-alice")), two_hits());
    let pipeline = build(&directory, &backend, PermissionPolicy::Enforced, settings(0.0));

    let first = pipeline.run("strategy", &alice()).await.unwrap();
    let second = pipeline.run("strategy", &alice()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(directory.calls(), 2);
    assert_eq!(backend.collection_calls(), 2);
    assert_eq!(backend.search_calls(), 2);
}

#[tokio::test]
async fn test_resolve_filter_reports_grant() {
    let directory = FakeDirectory::new(Dir::One);
    let backend = FakeBackend::new(Ok(Some("col-alice")), two_hits());
    let pipeline = build(&directory, &backend, PermissionPolicy::Enforced, settings(0.0));

    let filter = pipeline.resolve_filter(&alice()).await;
    assert!(filter.granted);
    assert_eq!(filter.collection_id.as_deref(), Some("col-alice"));
    assert_eq!(backend.search_calls(), 0);
}
